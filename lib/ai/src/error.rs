//! Error types for the AI crate.
//!
//! Backend failures are reported as `Report<LlmError>` and are never retried
//! inside this workspace; the caller decides what to do with them.

use std::fmt;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// The request could not be sent or the backend rejected it.
    RequestFailed { reason: String },
    /// The backend answered with something that is not a chat completion.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_display() {
        let err = LlmError::RequestFailed {
            reason: "502 Bad Gateway".to_string(),
        };
        assert!(err.to_string().contains("502 Bad Gateway"));
    }

    #[test]
    fn rate_limited_display() {
        let with_hint = LlmError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(with_hint.to_string().contains("30s"));

        let without_hint = LlmError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(without_hint.to_string(), "rate limited");
    }

    #[test]
    fn timeout_display() {
        assert_eq!(LlmError::Timeout.to_string(), "LLM request timed out");
    }
}
