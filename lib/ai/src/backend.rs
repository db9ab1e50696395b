//! LLM backend abstraction.
//!
//! Defines the turn sequence sent to a model, the response it returns, and
//! the trait every backend implements.

use crate::error::LlmError;
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Fixed instructions for the model.
    System,
    /// Anyone speaking to the model.
    User,
    /// The model itself.
    Assistant,
    /// Result of a tool invocation.
    Tool,
}

/// A canonical tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier, echoed back on the matching tool turn.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// Arguments as JSON object text.
    pub arguments: String,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One role-tagged message unit in the model context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who authored this turn.
    pub role: TurnRole,
    /// Turn text. May be empty for assistant turns that only call tools.
    pub content: String,
    /// For tool turns, the id of the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For assistant turns, the tool calls the model requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Turn {
    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Creates a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Creates a tool result turn answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::new(TurnRole::Tool, content);
        turn.tool_call_id = Some(tool_call_id.into());
        turn
    }

    /// Attaches the tool calls the model requested in this turn.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Returns true if this turn carries tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: JsonValue,
}

impl ToolSpec {
    /// Creates a tool spec that takes no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// Base URL including the version segment, e.g. `http://host:8080/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Bearer key, if the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl LlmBackendConfig {
    /// Creates a configuration for an endpoint that needs no key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Sets the bearer key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A request to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The full working context, oldest first.
    pub messages: Vec<Turn>,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Creates a request over the given context.
    #[must_use]
    pub fn new(messages: Vec<Turn>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Sets the tool catalog.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A response from an LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The answer text, if any.
    pub content: Option<String>,
    /// Secondary free-text reasoning channel, if the backend emits one.
    pub reasoning: Option<String>,
    /// Natively structured tool calls.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped, as reported by the backend.
    pub finish_reason: Option<String>,
    /// Token usage statistics.
    pub usage: Option<TokenUsage>,
    /// Model that generated the response.
    pub model: String,
}

impl LlmResponse {
    /// Creates a plain text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Sets the reasoning text.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Sets the structured tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u32,
    /// Number of output tokens.
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Adds another round's usage to this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Trait for LLM backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Sends the request and returns the model's response.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response cannot be decoded.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>>;

    /// Returns the model name.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_request_builder() {
        let request = LlmRequest::new(vec![Turn::system("Be kind."), Turn::user("hi")])
            .with_tools(vec![ToolSpec::new("check_time", "Get the time")])
            .with_max_tokens(2000)
            .with_temperature(0.7);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.max_tokens, Some(2000));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn tool_turn_echoes_call_id() {
        let turn = Turn::tool("call_0", "2026-01-01T00:00:00Z");
        assert_eq!(turn.role, TurnRole::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_0"));
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn assistant_turn_carries_tool_calls() {
        let turn = Turn::assistant("")
            .with_tool_calls(vec![ToolCall::new("call_0", "list_files", "{}")]);
        assert!(turn.has_tool_calls());
        assert_eq!(turn.tool_calls[0].name, "list_files");
    }

    #[test]
    fn parameterless_spec_is_an_empty_object_schema() {
        let spec = ToolSpec::new("check_time", "Get the current time and date");
        assert_eq!(spec.parameters["type"], "object");
        assert!(spec.parameters["properties"].as_object().unwrap().is_empty());
    }

    #[test]
    fn token_usage_accepts_openai_field_names() {
        let usage: TokenUsage =
            serde_json::from_str(r#"{"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}"#)
                .expect("deserialize");
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn token_usage_saturates_instead_of_overflowing() {
        let mut usage = TokenUsage {
            input_tokens: u32::MAX - 5,
            output_tokens: 10,
        };
        usage.accumulate(&TokenUsage {
            input_tokens: 100,
            output_tokens: 1,
        });

        assert_eq!(usage.input_tokens, u32::MAX);
        assert_eq!(usage.output_tokens, 11);
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn backend_config_defaults_timeout() {
        let config: LlmBackendConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:8080/v1", "model": "glm"}"#)
                .expect("deserialize");
        assert_eq!(config.timeout_secs, 300);
        assert!(config.api_key.is_none());
    }
}
