//! Model backend primitives for synth-relay.
//!
//! This crate provides:
//!
//! - **Turns**: the role-tagged message units exchanged with a model
//! - **Backend**: the `LlmBackend` trait and an OpenAI-compatible HTTP client
//! - **Tool call extraction**: normalizes structured and embedded-markup tool
//!   calls into one canonical list

pub mod backend;
pub mod error;
pub mod openai;
pub mod tool_call;

pub use backend::{
    LlmBackend, LlmBackendConfig, LlmRequest, LlmResponse, TokenUsage, ToolCall, ToolSpec, Turn,
    TurnRole,
};
pub use error::LlmError;
pub use openai::OpenAiCompatibleBackend;
pub use tool_call::{ExtractedCalls, extract_tool_calls};
