//! Local one-shot turns.
//!
//! `ask` continues one conversation across runs: every earlier exchange in
//! the `cli` transcript is replayed ahead of the new message.

use crate::error::RelayError;
use rootcause::Report;
use synth_relay_ai::{LlmBackend, Turn};
use synth_relay_conversation::{ConversationEngine, TranscriptEntry, TranscriptLog, TurnOutcome};
use tracing::{info, instrument, warn};

/// Transcript prefix for local turns.
pub const LOCAL_PREFIX: &str = "cli";

/// Runs one turn after the logged conversation so far and records it.
///
/// # Errors
///
/// Returns an error if the earlier transcript cannot be read or the turn
/// fails. A failure to record the new exchange is only logged.
#[instrument(skip_all)]
pub async fn ask<B: LlmBackend>(
    engine: &ConversationEngine<B>,
    log: &TranscriptLog,
    message: &str,
) -> Result<TurnOutcome, Report<RelayError>> {
    let mut history = log.replay().await.map_err(|report| RelayError::Startup {
        reason: report.current_context().to_string(),
    })?;
    let history_length = history.len();
    info!(prior_turns = history_length, "continuing conversation");
    history.push(Turn::user(message));

    let outcome = engine
        .run_turn(history)
        .await
        .map_err(|report| RelayError::Turn {
            reason: report.current_context().to_string(),
        })?;

    let entry = TranscriptEntry::from_outcome(message, &outcome)
        .with_metadata("history_length", history_length);
    if let Err(report) = log.append(&entry).await {
        warn!(error = %report, "failed to append transcript");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use synth_relay_ai::{LlmError, LlmRequest, LlmResponse, TurnRole};
    use synth_relay_conversation::ToolRegistry;

    struct EchoBackend {
        requests: Arc<Mutex<Vec<LlmRequest>>>,
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
            self.requests.lock().unwrap().push(request.clone());
            let last = request.messages.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(LlmResponse::text(format!("you said {last}")))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn engine() -> (ConversationEngine<EchoBackend>, Arc<Mutex<Vec<LlmRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let backend = EchoBackend {
            requests: Arc::clone(&requests),
        };
        (
            ConversationEngine::new(backend, "prompt", ToolRegistry::new()),
            requests,
        )
    }

    #[tokio::test]
    async fn second_ask_sees_the_first_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let log = TranscriptLog::new(dir.path(), LOCAL_PREFIX);
        let (engine, requests) = engine();

        ask(&engine, &log, "hi").await.unwrap();
        let outcome = ask(&engine, &log, "again").await.unwrap();
        assert_eq!(outcome.content.as_deref(), Some("you said again"));

        let second = requests.lock().unwrap()[1].clone();
        let sent: Vec<(TurnRole, &str)> = second
            .messages
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect();
        assert_eq!(
            sent,
            [
                (TurnRole::System, "prompt"),
                (TurnRole::User, "hi"),
                (TurnRole::Assistant, "you said hi"),
                (TurnRole::User, "again"),
            ]
        );

        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();
        let text = std::fs::read_to_string(file).unwrap();
        let lengths: Vec<u64> = text
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .map(|record| record["history_length"].as_u64().unwrap())
            .collect();
        assert_eq!(lengths, [0, 2]);
    }

    #[tokio::test]
    async fn first_ask_starts_from_an_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = TranscriptLog::new(dir.path().join("conversations"), LOCAL_PREFIX);
        let (engine, requests) = engine();

        ask(&engine, &log, "hello").await.unwrap();

        let first = requests.lock().unwrap()[0].clone();
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[1].content, "hello");
    }
}
