//! Splits pasted chat transcripts into speaker-attributed turns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use validator::Validate;

/// Speaker used for lines without a `Name:` prefix.
pub const DEFAULT_SPEAKER: &str = "User";
/// Platform tag for text typed or pasted into the client.
pub const WEB_INPUT_PLATFORM: &str = "web_input";

/// `[optional timestamp] Speaker: message`, the message possibly empty.
static SPEAKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[([^\]]+)\]\s*)?([\p{L}\p{N}][\p{L}\p{N} _.'-]{0,39}?)\s*:\s*(.*)$")
        .expect("Invalid speaker line regex")
});

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Conversation {
    #[validate(length(min = 1))]
    pub user: String,
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    WEB_INPUT_PLATFORM.to_string()
}

impl Conversation {
    pub fn new(user: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            content: content.into(),
            timestamp: None,
            platform: default_platform(),
        }
    }
}

/// Parses raw transcript text.
///
/// Each non-empty line is handled on its own: `Speaker: message` becomes a turn
/// for that speaker, any other line a `User` turn. Lines whose message is empty
/// are skipped. If that leaves no turns, the whole text is one `User` turn.
pub fn parse_conversation_text(raw: &str) -> Vec<Conversation> {
    let text = raw.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let turns: Vec<Conversation> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_line)
        .collect();

    if turns.is_empty() {
        return vec![Conversation::new(DEFAULT_SPEAKER, text)];
    }
    turns
}

fn parse_line(line: &str) -> Option<Conversation> {
    let turn = match SPEAKER_LINE.captures(line) {
        // A URL scheme such as `https://` is not a speaker prefix.
        Some(caps) if !caps[3].starts_with("//") => Conversation {
            user: caps[2].trim().to_string(),
            content: caps[3].trim().to_string(),
            timestamp: caps.get(1).map(|t| t.as_str().trim().to_string()),
            platform: default_platform(),
        },
        _ => Conversation::new(DEFAULT_SPEAKER, line),
    };
    (!turn.content.is_empty()).then_some(turn)
}

/// Sorted, de-duplicated speaker names.
pub fn speakers(conversations: &[Conversation]) -> Vec<String> {
    conversations
        .iter()
        .map(|c| c.user.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Concatenated turn contents, the text the risk assessor sees for a transcript.
pub fn joined_content(conversations: &[Conversation]) -> String {
    conversations
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_lines() {
        let parsed = parse_conversation_text("Alice: hi there\nBob: hey!\n\nAlice: how are you?");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].user, "Alice");
        assert_eq!(parsed[0].content, "hi there");
        assert_eq!(parsed[1].user, "Bob");
        assert_eq!(parsed[2].platform, WEB_INPUT_PLATFORM);
        assert_eq!(speakers(&parsed), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_timestamps_and_unprefixed_lines() {
        let parsed = parse_conversation_text("[10:42] Sam: on my way\nsome stray note");
        assert_eq!(parsed[0].user, "Sam");
        assert_eq!(parsed[0].timestamp.as_deref(), Some("10:42"));
        assert_eq!(parsed[1].user, DEFAULT_SPEAKER);
        assert_eq!(parsed[1].content, "some stray note");
    }

    #[test]
    fn test_plain_lines_are_separate_user_turns() {
        let parsed = parse_conversation_text("  first line\n\nsecond line  ");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|c| c.user == DEFAULT_SPEAKER));
        assert_eq!(parsed[0].content, "first line");
        assert_eq!(parsed[1].content, "second line");
    }

    #[test]
    fn test_no_space_after_colon() {
        let parsed = parse_conversation_text("Alice:hi\nBob:hello");
        assert_eq!(parsed.len(), 2);
        assert_eq!((parsed[0].user.as_str(), parsed[0].content.as_str()), ("Alice", "hi"));
        assert_eq!((parsed[1].user.as_str(), parsed[1].content.as_str()), ("Bob", "hello"));
    }

    #[test]
    fn test_empty_messages_are_skipped() {
        let parsed = parse_conversation_text("Alice:\nBob: hey");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].user, "Bob");
        assert_eq!(parsed[0].content, "hey");
    }

    #[test]
    fn test_whole_text_when_every_message_is_empty() {
        let parsed = parse_conversation_text(" Alice:\nBob:  ");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].user, DEFAULT_SPEAKER);
        assert_eq!(parsed[0].content, "Alice:\nBob:");
    }

    #[test]
    fn test_urls_are_not_speakers() {
        let parsed = parse_conversation_text("see https://example.com/page");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].user, DEFAULT_SPEAKER);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_conversation_text("   \n  ").is_empty());
        assert!(speakers(&[]).is_empty());
    }

    #[test]
    fn test_joined_content() {
        let parsed = parse_conversation_text("A: one\nB: two");
        assert_eq!(joined_content(&parsed), "one two");
    }
}
