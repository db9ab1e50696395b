//! Discord relay for a tool-augmented language model.
//!
//! The binary wires the conversation engine to one Discord channel and
//! exposes a small CLI for one-shot turns and manual posts.

pub mod config;
pub mod discord;
pub mod error;
pub mod local;
pub mod relay;
