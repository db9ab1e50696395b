//! Error types for the conversation crate.
//!
//! None of these escape a conversation turn. Tool errors become text the
//! model reads on its next round, memory errors skip a snippet, and
//! transcript errors are logged by the caller. Only backend failures
//! (`LlmError`) abort a turn.

use std::fmt;
use std::path::PathBuf;

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// A required argument was missing or unusable.
    InvalidInput { name: String, reason: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Errors from the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The store directory could not be listed.
    ListFailed { dir: PathBuf, reason: String },
    /// A snippet file could not be read.
    ReadFailed { path: PathBuf, reason: String },
    /// A snippet file is not a valid memory block.
    ParseFailed { path: PathBuf, reason: String },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListFailed { dir, reason } => {
                write!(f, "failed to list memory store {}: {reason}", dir.display())
            }
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read memory block {}: {reason}", path.display())
            }
            Self::ParseFailed { path, reason } => {
                write!(f, "invalid memory block {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for MemoryError {}

/// Errors from loading the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// The prompt file does not exist.
    NotFound { path: PathBuf },
    /// The prompt file could not be read.
    ReadFailed { path: PathBuf, reason: String },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "system prompt not found: {}", path.display())
            }
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read system prompt {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for PromptError {}

/// Errors from the transcript log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    /// The entry could not be encoded.
    EncodeFailed { reason: String },
    /// The log file could not be written.
    WriteFailed { path: PathBuf, reason: String },
    /// An earlier log file could not be read.
    ReadFailed { path: PathBuf, reason: String },
}

impl fmt::Display for TranscriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeFailed { reason } => {
                write!(f, "failed to encode transcript entry: {reason}")
            }
            Self::WriteFailed { path, reason } => {
                write!(f, "failed to append to {}: {reason}", path.display())
            }
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for TranscriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidInput {
            name: "take_note".to_string(),
            reason: "missing 'note'".to_string(),
        };
        assert!(err.to_string().contains("take_note"));
        assert!(err.to_string().contains("missing 'note'"));
    }

    #[test]
    fn memory_error_display() {
        let err = MemoryError::ParseFailed {
            path: PathBuf::from("state/memory/persona.yaml"),
            reason: "missing field `value`".to_string(),
        };
        assert!(err.to_string().contains("persona.yaml"));
    }

    #[test]
    fn prompt_error_display() {
        let err = PromptError::NotFound {
            path: PathBuf::from("scaffolding/system-prompt.md"),
        };
        assert!(err.to_string().contains("system-prompt.md"));
    }
}
