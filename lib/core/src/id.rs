//! Strongly-typed identifiers.
//!
//! Identifiers wrap a ULID so transcript records and log lines sort by the
//! time the turn or model round-trip started.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Identifies one admitted conversation turn, from gate admission to the
    /// final answer.
    TurnId,
    "turn"
);

define_id!(
    /// Identifies a single round-trip to the model backend within a turn.
    InvocationId,
    "llm"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_id_display_format() {
        let id = TurnId::new();
        assert!(id.to_string().starts_with("turn_"));
    }

    #[test]
    fn invocation_id_display_format() {
        let id = InvocationId::new();
        assert!(id.to_string().starts_with("llm_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(TurnId::new(), TurnId::new());
    }

    #[test]
    fn id_serializes_as_bare_ulid() {
        let id = TurnId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let bare = id.to_string();
        let bare = bare.trim_start_matches("turn_");
        assert_eq!(json, format!("\"{bare}\""));
        assert_eq!(bare.len(), 26);

        let parsed: TurnId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
