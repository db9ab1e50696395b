//! Tool call extraction.
//!
//! Backends express tool use in one of two ways. Well-behaved servers attach
//! a structured `tool_calls` list to the response message. Others ignore the
//! structured contract and write ad-hoc markup into the reasoning channel:
//!
//! ```text
//! <tool_call>take_note<arg_key>note</arg_key><arg_value>remember this</arg_value></tool_call>
//! ```
//!
//! Both are normalized into the same [`ToolCall`] shape so execution never
//! needs to know which encoding the model used. The markup grammar assumes
//! flat, well-formed tags; anything else is handled best-effort.

use crate::backend::{LlmResponse, ToolCall};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;
use tracing::warn;

static TOOL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("valid regex"));
static ARG_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<arg_key>(.*?)</arg_key>").expect("valid regex"));
static ARG_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<arg_value>(.*?)</arg_value>").expect("valid regex"));

const ARG_KEY_OPEN: &str = "<arg_key>";

/// Tool calls found in a response, tagged with the encoding they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedCalls {
    /// The backend's native tool-call list, used verbatim.
    Structured(Vec<ToolCall>),
    /// Calls recovered from markup in the reasoning channel.
    EmbeddedMarkup(Vec<ToolCall>),
}

impl ExtractedCalls {
    /// Returns the canonical calls regardless of encoding.
    #[must_use]
    pub fn calls(&self) -> &[ToolCall] {
        match self {
            Self::Structured(calls) | Self::EmbeddedMarkup(calls) => calls,
        }
    }

    /// Consumes the extraction, returning the canonical calls.
    #[must_use]
    pub fn into_calls(self) -> Vec<ToolCall> {
        match self {
            Self::Structured(calls) | Self::EmbeddedMarkup(calls) => calls,
        }
    }

    /// Short name of the encoding, for logs.
    #[must_use]
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::EmbeddedMarkup(_) => "embedded_markup",
        }
    }
}

/// Determines whether a response requested tool invocations.
///
/// The structured list wins when it is non-empty. Otherwise the reasoning
/// text is scanned for markup. Returns `None` when neither yields a call, in
/// which case the response is final.
#[must_use]
pub fn extract_tool_calls(response: &LlmResponse) -> Option<ExtractedCalls> {
    if !response.tool_calls.is_empty() {
        return Some(ExtractedCalls::Structured(response.tool_calls.clone()));
    }

    let calls = parse_embedded_calls(response.reasoning.as_deref()?);
    if calls.is_empty() {
        None
    } else {
        Some(ExtractedCalls::EmbeddedMarkup(calls))
    }
}

/// Parses every `<tool_call>` block in `text`, in document order.
///
/// Ids are `call_0`, `call_1`, ... scoped to this text. Argument keys and
/// values pair positionally; surplus entries on either side are dropped.
#[must_use]
pub fn parse_embedded_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();

    for capture in TOOL_CALL_RE.captures_iter(text) {
        let body = &capture[1];
        let name = match body.find(ARG_KEY_OPEN) {
            Some(offset) => body[..offset].trim(),
            None => body.trim(),
        };
        if name.is_empty() {
            warn!("embedded tool call without a function name, skipping");
            continue;
        }

        let keys: Vec<&str> = ARG_KEY_RE
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .collect();
        let values: Vec<&str> = ARG_VALUE_RE
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();

        if keys.len() != values.len() {
            warn!(
                tool = name,
                keys = keys.len(),
                values = values.len(),
                "embedded tool call has mismatched argument keys and values, unpaired entries dropped"
            );
        }

        let arguments: Map<String, JsonValue> = keys
            .iter()
            .zip(values.iter())
            .map(|(key, value)| ((*key).to_string(), JsonValue::String((*value).to_string())))
            .collect();

        let id = format!("call_{}", calls.len());
        calls.push(ToolCall::new(
            id,
            name,
            JsonValue::Object(arguments).to_string(),
        ));
    }

    calls
}
