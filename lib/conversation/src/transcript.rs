//! Append-only JSONL transcript, one file per UTC day.

use crate::engine::TurnOutcome;
use crate::error::TranscriptError;
use crate::tool::ToolResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use synth_relay_ai::{TokenUsage, Turn};
use synth_relay_core::{Result, TurnId};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// The model's reply as logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedResponse {
    pub reasoning: Option<String>,
    pub content: Option<String>,
}

/// One transcript record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub turn_id: TurnId,
    pub model: String,
    pub user_message: String,
    pub response: LoggedResponse,
    pub elapsed_seconds: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Caller-supplied fields, written at the top level of the record.
    #[serde(flatten)]
    pub metadata: Map<String, JsonValue>,
}

impl TranscriptEntry {
    /// Builds a record for a completed turn triggered by `user_message`.
    #[must_use]
    pub fn from_outcome(user_message: impl Into<String>, outcome: &TurnOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            turn_id: outcome.turn_id,
            model: outcome.model.clone(),
            user_message: user_message.into(),
            response: LoggedResponse {
                reasoning: outcome.reasoning.clone(),
                content: outcome.content.clone(),
            },
            elapsed_seconds: outcome.elapsed_seconds,
            tool_calls: outcome.tool_calls_made.clone(),
            usage: outcome.usage.clone(),
            metadata: Map::new(),
        }
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Writes transcript records to `<dir>/<prefix>-<YYYY-MM-DD>.jsonl`.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    dir: PathBuf,
    prefix: String,
}

impl TranscriptLog {
    /// Creates a log in `dir` whose files start with `prefix`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Returns the file that holds records for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}-{}.jsonl", self.prefix, date.format("%Y-%m-%d")))
    }

    /// Replays every earlier record as conversation turns, oldest first.
    ///
    /// Each record yields its user message, followed by the reply when the
    /// model produced one. Files are read in date order; lines that do not
    /// parse are skipped. A missing directory replays as nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a log file cannot be read.
    #[instrument(skip(self), fields(dir = %self.dir.display(), prefix = %self.prefix))]
    pub async fn replay(&self) -> Result<Vec<Turn>, TranscriptError> {
        let read_failed = |path: &Path, e: std::io::Error| TranscriptError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_failed(&self.dir, e).into()),
        };

        let file_prefix = format!("{}-", self.prefix);
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| read_failed(&self.dir, e))?
        {
            let path = entry.path();
            let is_log = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&file_prefix) && name.ends_with(".jsonl"));
            if is_log {
                paths.push(path);
            }
        }
        paths.sort();

        let mut turns = Vec::new();
        for path in paths {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| read_failed(&path, e))?;
            for (index, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TranscriptEntry>(line) {
                    Ok(entry) => {
                        turns.push(Turn::user(entry.user_message));
                        if let Some(content) = entry.response.content.filter(|c| !c.is_empty()) {
                            turns.push(Turn::assistant(content));
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), line = index + 1, error = %e, "skipping unreadable transcript line");
                    }
                }
            }
        }

        debug!(turns = turns.len(), "transcript replayed");
        Ok(turns)
    }

    /// Appends one record to the file for its date.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    #[instrument(skip_all, fields(turn_id = %entry.turn_id))]
    pub async fn append(&self, entry: &TranscriptEntry) -> Result<PathBuf, TranscriptError> {
        let mut line = serde_json::to_string(entry).map_err(|e| TranscriptError::EncodeFailed {
            reason: e.to_string(),
        })?;
        line.push('\n');

        let path = self.path_for(entry.timestamp.date_naive());
        let write_failed = |path: &Path, e: std::io::Error| TranscriptError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_failed(&self.dir, e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| write_failed(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| write_failed(&path, e))?;
        file.flush().await.map_err(|e| write_failed(&path, e))?;

        debug!(path = %path.display(), "transcript appended");
        Ok(path)
    }
}
