//! Error handling foundation for synth-relay.
//!
//! Only the `Result` alias lives here. Each crate defines its own
//! domain-specific error enums and reports them through rootcause, mapping
//! lower-level failures into its own variants at the crate boundary.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
