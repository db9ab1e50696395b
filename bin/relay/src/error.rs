//! Error types for the relay binary.

use std::fmt;

/// Errors from the Discord REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscordError {
    /// The request could not be sent.
    RequestFailed { endpoint: String, reason: String },
    /// Discord answered with a non-success status.
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The response body was not what we expected.
    Decode { endpoint: String, reason: String },
}

impl fmt::Display for DiscordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { endpoint, reason } => {
                write!(f, "discord request to {endpoint} failed: {reason}")
            }
            Self::Status {
                endpoint,
                status,
                body,
            } => write!(f, "discord returned {status} for {endpoint}: {body}"),
            Self::Decode { endpoint, reason } => {
                write!(f, "unexpected discord response from {endpoint}: {reason}")
            }
        }
    }
}

impl std::error::Error for DiscordError {}

/// Top-level errors for a CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// A setting required by this command is missing.
    MissingSetting { key: &'static str },
    /// `post` was configured with the relay's own token.
    PostAsRelay,
    /// Startup failed.
    Startup { reason: String },
    /// The model turn failed.
    Turn { reason: String },
    /// Talking to Discord failed.
    Discord { reason: String },
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::MissingSetting { key } => write!(f, "missing required setting '{key}'"),
            Self::PostAsRelay => write!(
                f,
                "post.token must belong to a different account than discord.token"
            ),
            Self::Startup { reason } => write!(f, "startup failed: {reason}"),
            Self::Turn { reason } => write!(f, "turn failed: {reason}"),
            Self::Discord { reason } => write!(f, "discord error: {reason}"),
        }
    }
}

impl std::error::Error for RelayError {}
