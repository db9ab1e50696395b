//! Channel history filtering.
//!
//! Turns raw channel messages into a bounded, sanitized transcript of
//! role-tagged turns. Messages that carry earlier failures are dropped so
//! error text never re-enters the model context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synth_relay_ai::Turn;

/// Prefix of the notice posted to the channel when a turn fails.
pub const ERROR_MARKER: &str = "*Error:";

/// A message as read from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Platform message id. Numeric ids break timestamp ties.
    pub id: String,
    /// Display name of the author.
    pub author: String,
    /// Whether the relay's own account wrote this message.
    pub is_self: bool,
    /// Whether another bot account wrote this message.
    pub is_other_bot: bool,
    /// Message text.
    pub content: String,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
}

/// Configuration for history filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum characters kept from each message.
    pub max_content_chars: usize,
    /// Messages starting with this marker are dropped.
    pub error_marker: String,
    /// Messages containing any of these phrases are dropped.
    pub poisoned_phrases: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 500,
            error_marker: ERROR_MARKER.to_string(),
            poisoned_phrases: vec![
                "Connection error".to_string(),
                "Request timed out".to_string(),
                "LLM request failed".to_string(),
                "LLM request timed out".to_string(),
            ],
        }
    }
}

/// Builds model input turns from channel history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    config: HistoryConfig,
}

impl HistoryFilter {
    /// Creates a filter with the given configuration.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }

    /// Filters `messages` into at most `max_turns` turns, oldest first.
    ///
    /// Input may arrive in either order; it is sorted by timestamp first,
    /// then by numeric id for messages posted within the same instant.
    /// The cap applies after dropping, so the result holds the most recent
    /// eligible messages.
    #[must_use]
    pub fn filter(&self, messages: &[RawMessage], max_turns: usize) -> Vec<Turn> {
        let mut ordered: Vec<&RawMessage> = messages.iter().collect();
        ordered.sort_by_key(|m| (m.timestamp, m.id.parse::<u64>().ok()));

        let turns: Vec<Turn> = ordered
            .into_iter()
            .filter_map(|message| {
                let content = truncate_chars(&message.content, self.config.max_content_chars);
                if self.is_poisoned(&content) {
                    return None;
                }
                Some(if message.is_self {
                    Turn::assistant(content)
                } else {
                    Turn::user(format!("[{}]: {content}", message.author))
                })
            })
            .collect();

        let skip = turns.len().saturating_sub(max_turns);
        turns.into_iter().skip(skip).collect()
    }

    fn is_poisoned(&self, content: &str) -> bool {
        content.trim_start().starts_with(&self.config.error_marker)
            || self
                .config
                .poisoned_phrases
                .iter()
                .any(|phrase| content.contains(phrase.as_str()))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
