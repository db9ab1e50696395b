//! Conversation turn orchestration for synth-relay.
//!
//! This crate provides:
//!
//! - **History Filter**: channel history to sanitized, bounded turns
//! - **Memory Store**: persisted context snippets injected into each turn
//! - **Tool Registry**: builtin tools and their executor
//! - **Conversation Engine**: the multi-round model/tool loop
//! - **Turn Gate**: at most one turn in flight per relay
//! - **Transcript Log**: one JSONL record per completed turn

pub mod builtin;
pub mod engine;
pub mod error;
pub mod gate;
pub mod history;
pub mod memory;
pub mod prompt;
pub mod tool;
pub mod transcript;

pub use builtin::{CheckTime, ListFiles, ReadFile, TakeNote, builtin_registry};
pub use engine::{ConversationEngine, EngineConfig, TurnOutcome};
pub use error::{MemoryError, PromptError, ToolError, TranscriptError};
pub use gate::{TurnGate, TurnPermit};
pub use history::{ERROR_MARKER, HistoryConfig, HistoryFilter, RawMessage};
pub use memory::{MemoryBlock, MemoryStore};
pub use prompt::{extract_prompt, load_system_prompt};
pub use tool::{Tool, ToolArguments, ToolRegistry, ToolResult};
pub use transcript::{LoggedResponse, TranscriptEntry, TranscriptLog};
