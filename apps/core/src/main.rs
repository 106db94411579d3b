// Persona Core CLI
// Local classification/assessment and remote analysis from the terminal.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use persona_core::classifier::{ClassifierRules, ClassifyOptions, LexicalClassifier};
use persona_core::config::ClientConfig;
use persona_core::parser::{parse_conversation_text, speakers};
use persona_core::risk::{AssessmentContext, RiskAssessor, RiskRules};
use persona_core::session::{
    self, AnalysisOutcome, AnalysisPhase, AnalysisStart, AnalyzeRequest, HttpApiClient,
    LiveOrchestrator,
};
use serde::Serialize;
use std::io::Read;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "persona-core", version, about = "Persona assessment client core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score text against the lexical classifier tables.
    Classify {
        /// Text to classify, or `-` to read stdin.
        text: String,
        #[arg(long, default_value_t = 2)]
        max_secondary: usize,
    },
    /// Run the risk assessor over text.
    Assess {
        /// Text to assess, or `-` to read stdin.
        text: String,
        #[arg(long)]
        session: Option<String>,
    },
    /// Split a transcript into speaker turns.
    Parse {
        /// Transcript, or `-` to read stdin.
        text: String,
    },
    /// Submit text to the analysis backend and follow it to the end.
    Analyze {
        /// Text or transcript, or `-` to read stdin.
        text: String,
        #[arg(long, default_value = "comprehensive")]
        analysis_type: String,
        #[arg(long)]
        model: Option<String>,
        /// Restrict the analysis to these speakers.
        #[arg(long = "speaker")]
        speakers: Vec<String>,
        #[arg(long)]
        relationship: Option<String>,
    },
    /// Check that the backend is reachable.
    Health,
    /// List the models the backend offers.
    Models,
    /// Show the backend configuration, or replace it with `--set <json>`.
    Config {
        #[arg(long)]
        set: Option<String>,
    },
    /// Ask the backend whether an API key is accepted by its provider.
    ValidateKey { key: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PERSONA_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr so stdout stays pure JSON output.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_text(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    Ok(text)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("Invalid configuration")?;
    let rules_dir = config.rules_dir.as_deref();

    match cli.command {
        Command::Classify {
            text,
            max_secondary,
        } => {
            let rules = ClassifierRules::load_or_default(rules_dir)?;
            let classifier = LexicalClassifier::with_rules(&rules)?;
            let options = ClassifyOptions {
                max_secondary,
                ..ClassifyOptions::default()
            };
            let result = classifier.classify(&read_text(&text)?, &options);
            print_json(result.as_ref())
        }
        Command::Assess { text, session } => {
            let rules = RiskRules::load_or_default(rules_dir)?;
            let assessor = RiskAssessor::with_rules(&rules)?;
            let context = AssessmentContext {
                session_id: session,
                source: Some("cli".to_string()),
                speaker: None,
            };
            let assessment = assessor
                .assess(&read_text(&text)?, &context)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_json(&assessment)
        }
        Command::Parse { text } => {
            let conversations = parse_conversation_text(&read_text(&text)?);
            print_json(&serde_json::json!({
                "speakers": speakers(&conversations),
                "conversations": conversations,
            }))
        }
        Command::Analyze {
            text,
            analysis_type,
            model,
            speakers,
            relationship,
        } => {
            let mut request =
                AnalyzeRequest::from_text(read_text(&text)?).with_analysis_type(analysis_type);
            request.model = model;
            request.selected_speakers = (!speakers.is_empty()).then_some(speakers);
            request.relationship_description = relationship;

            let orchestrator = session::connect(&config).await?;
            match orchestrator.start_analysis(request).await? {
                AnalysisStart::Completed { results } => print_json(&results),
                AnalysisStart::Cancelled => bail!("Analysis cancelled"),
                AnalysisStart::Started { session_id } => {
                    info!("Following analysis {}", session_id);
                    let outcome = follow(&orchestrator).await?;
                    print_json(&outcome)?;
                    match outcome {
                        AnalysisOutcome::Completed { .. } => Ok(()),
                        _ => bail!("Analysis did not complete"),
                    }
                }
            }
        }
        Command::Health => {
            let client = HttpApiClient::new(&config)?;
            info!("Checking backend at {}", client.base_url());
            let health = client.health().await?;
            print_json(&health)?;
            if !health.is_ok() {
                bail!("Backend reported status {}", health.status);
            }
            Ok(())
        }
        Command::Models => {
            let models = HttpApiClient::new(&config)?.models().await?;
            if let Some(error) = &models.error {
                warn!("Backend could not list every model: {}", error);
            }
            print_json(&models)
        }
        Command::Config { set } => {
            let client = HttpApiClient::new(&config)?;
            match set {
                Some(raw) => {
                    let update: serde_json::Value =
                        serde_json::from_str(&raw).context("--set expects a JSON object")?;
                    print_json(&client.update_config(&update).await?)
                }
                None => print_json(&client.get_config().await?),
            }
        }
        Command::ValidateKey { key } => {
            let validation = HttpApiClient::new(&config)?.validate_key(&key).await?;
            print_json(&validation)?;
            if !validation.valid {
                bail!(
                    "{}",
                    validation.message.as_deref().unwrap_or("API key rejected")
                );
            }
            Ok(())
        }
    }
}

/// Logs progress until the analysis ends, prompting on stdin for intervention answers.
async fn follow(orchestrator: &LiveOrchestrator) -> Result<AnalysisOutcome> {
    let mut state_rx = orchestrator.watch_state();
    let mut answers = BufReader::new(tokio::io::stdin()).lines();
    let mut last_progress = -1.0;

    loop {
        let state = state_rx.borrow_and_update().clone();
        if let Some(outcome) = state.outcome() {
            return Ok(outcome);
        }

        if state.progress != last_progress {
            last_progress = state.progress;
            info!(
                "{:>3.0}% {}",
                state.progress,
                state.status.as_deref().unwrap_or("")
            );
        }

        if state.phase == AnalysisPhase::InterventionRequired {
            if let Some(message) = &state.intervention_message {
                warn!("{}", message);
            }
            eprintln!(
                "Intervention required: {}",
                state.intervention.clone().unwrap_or_default()
            );
            tokio::select! {
                line = answers.next_line() => match line? {
                    Some(answer) => {
                        if let Err(e) = orchestrator.resolve_intervention(&answer).await {
                            warn!("Answer rejected: {}", e.user_message());
                        }
                    }
                    None => {
                        orchestrator.cancel();
                    }
                },
                changed = state_rx.changed() => changed.context("Analysis state closed")?,
            }
            continue;
        }

        state_rx
            .changed()
            .await
            .context("Analysis state closed")?;
    }
}
