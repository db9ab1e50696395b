//! Core types and utilities for the synth-relay workspace.
//!
//! This crate provides the identifiers and the shared error-handling alias
//! used by the model, conversation and relay crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{InvocationId, TurnId};
