//! WebSocket event channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use super::events::{AnalysisEvent, ClientCommand};
use super::hub::EventHub;
use crate::error::AppError;

/// Room membership on the backend's event channel. Events only flow for
/// sessions that have been joined.
#[async_trait]
pub trait EventChannel: Send + Sync + 'static {
    async fn join(&self, session_id: &str) -> Result<(), AppError>;
    async fn leave(&self, session_id: &str) -> Result<(), AppError>;
}

/// A connected WebSocket. Inbound frames are published to an [`EventHub`];
/// outbound commands go through a writer task. The hub is closed once the
/// socket stops delivering frames.
pub struct WebSocketChannel {
    commands: mpsc::Sender<ClientCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketChannel {
    #[instrument(skip(hub))]
    pub async fn connect(url: &str, hub: EventHub) -> Result<Self, AppError> {
        let (stream, _response) = connect_async(url).await?;
        info!("Event channel connected to {}", url);

        let (mut sink, mut source) = stream.split();
        let (commands, mut command_rx) = mpsc::channel::<ClientCommand>(32);

        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let frame = match serde_json::to_string(&command) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode {:?}: {}", command, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    error!("Event channel write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Event channel writer stopped");
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => dispatch(&hub, text.as_str()),
                    Ok(Message::Close(_)) => {
                        info!("Event channel closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Event channel read failed: {}", e);
                        break;
                    }
                }
            }
            hub.close();
            debug!("Event channel reader stopped");
        });

        Ok(Self {
            commands,
            reader,
            writer,
        })
    }

    async fn send(&self, command: ClientCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Transport {
                status: None,
                retryable: false,
                message: "The event channel is closed.".to_string(),
            })
    }

    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl EventChannel for WebSocketChannel {
    async fn join(&self, session_id: &str) -> Result<(), AppError> {
        debug!(session_id, "Joining analysis session");
        self.send(ClientCommand::Join {
            session_id: session_id.to_string(),
        })
        .await
    }

    async fn leave(&self, session_id: &str) -> Result<(), AppError> {
        debug!(session_id, "Leaving analysis session");
        self.send(ClientCommand::Leave {
            session_id: session_id.to_string(),
        })
        .await
    }
}

/// Decodes one text frame and hands it to the hub. Unknown or malformed
/// frames are logged and skipped.
fn dispatch(hub: &EventHub, text: &str) {
    match serde_json::from_str::<AnalysisEvent>(text) {
        Ok(event) => {
            let delivered = hub.publish(event);
            debug!(delivered, "Dispatched analysis event");
        }
        Err(e) => debug!("Ignoring event frame ({}): {}", e, text),
    }
}
