//! OpenAI-compatible chat completions backend.
//!
//! Speaks `POST {base_url}/chat/completions`, which is what local model
//! servers (MLX, llama.cpp, vLLM, Ollama's compatibility layer) expose.

use crate::backend::{
    LlmBackend, LlmBackendConfig, LlmRequest, LlmResponse, TokenUsage, ToolCall, Turn, TurnRole,
};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use synth_relay_core::Result;
use tracing::{debug, instrument};

/// Longest slice of an error response body kept in [`LlmError::RequestFailed`].
const MAX_ERROR_DETAIL_CHARS: usize = 300;

/// A backend that talks to any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    config: LlmBackendConfig,
    client: Client,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = ChatRequest::build(&self.config.model, request);

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs }.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                reason: format!("{status}: {}", error_detail(&body)),
            }
            .into());
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ResponseParseFailed {
                reason: e.to_string(),
            })?;

        let response = parsed.into_response(&self.config.model)?;
        debug!(
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            tool_calls = response.tool_calls.len(),
            "chat completion received"
        );
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> ChatRequest<'a> {
    fn build(model: &'a str, request: &'a LlmRequest) -> Self {
        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from_turn).collect(),
            tools: request
                .tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: WireFunctionSpec {
                        name: &spec.name,
                        description: &spec.description,
                        parameters: &spec.parameters,
                    },
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: TurnRole,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
}

impl<'a> WireMessage<'a> {
    fn from_turn(turn: &'a Turn) -> Self {
        // Tool-calling assistant turns with no text go out as `content: null`.
        let content = if turn.has_tool_calls() && turn.content.is_empty() {
            None
        } else {
            Some(turn.content.as_str())
        };

        Self {
            role: turn.role,
            content,
            tool_call_id: turn.tool_call_id.as_deref(),
            tool_calls: turn
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonValue,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    /// Some servers name the reasoning channel `reasoning_content`.
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    /// Usually a JSON string, but some servers inline the object.
    #[serde(default)]
    arguments: JsonValue,
}

impl ChatResponse {
    fn into_response(self, requested_model: &str) -> Result<LlmResponse, LlmError> {
        let choice =
            self.choices
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::ResponseParseFailed {
                    reason: "response contained no choices".to_string(),
                })?;

        let message = choice.message;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, call)| {
                let arguments = match call.function.arguments {
                    JsonValue::String(text) => text,
                    JsonValue::Null => "{}".to_string(),
                    other => other.to_string(),
                };
                ToolCall::new(
                    call.id.unwrap_or_else(|| format!("call_{index}")),
                    call.function.name,
                    arguments,
                )
            })
            .collect();

        Ok(LlmResponse {
            content: message.content,
            reasoning: message.reasoning.or(message.reasoning_content),
            tool_calls,
            finish_reason: choice.finish_reason,
            usage: self.usage,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
        })
    }
}

/// Collapses whitespace in an error body and cuts it to a readable length.
///
/// Tunnels and proxies answer failures with full HTML pages.
fn error_detail(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_ERROR_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}…", &collapsed[..cut]),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ToolSpec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(LlmBackendConfig::new(
            format!("{}/v1", server.uri()),
            "glm-test",
        ))
        .expect("client builds")
    }

    fn parse(body: &str) -> LlmResponse {
        let parsed: ChatResponse = serde_json::from_str(body).expect("valid json");
        parsed.into_response("fallback-model").expect("has a choice")
    }

    #[test]
    fn assistant_tool_turn_serializes_null_content() {
        let turn = Turn::assistant("").with_tool_calls(vec![ToolCall::new(
            "call_0",
            "check_time",
            "{}",
        )]);
        let json = serde_json::to_value(WireMessage::from_turn(&turn)).expect("serialize");

        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "check_time");
    }

    #[test]
    fn tool_turn_serializes_call_id() {
        let turn = Turn::tool("call_7", "done");
        let json = serde_json::to_value(WireMessage::from_turn(&turn)).expect("serialize");

        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_7");
        assert_eq!(json["content"], "done");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn empty_user_content_stays_a_string() {
        let turn = Turn::user("");
        let json = serde_json::to_value(WireMessage::from_turn(&turn)).expect("serialize");
        assert_eq!(json["content"], "");
    }

    #[test]
    fn response_reads_structured_tool_calls() {
        let response = parse(
            r#"{"choices":[{"message":{"content":null,"tool_calls":[
                {"id":"abc","type":"function","function":{"name":"take_note","arguments":"{\"note\":\"hi\"}"}}
            ]},"finish_reason":"tool_calls"}]}"#,
        );

        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "abc");
        assert_eq!(response.tool_calls[0].arguments, r#"{"note":"hi"}"#);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(response.model, "fallback-model");
    }

    #[test]
    fn response_accepts_inline_argument_objects_and_missing_ids() {
        let response = parse(
            r#"{"choices":[{"message":{"tool_calls":[
                {"function":{"name":"read_file","arguments":{"filename":"a.md"}}}
            ]}}]}"#,
        );

        assert_eq!(response.tool_calls[0].id, "call_0");
        let args: JsonValue =
            serde_json::from_str(&response.tool_calls[0].arguments).expect("json args");
        assert_eq!(args["filename"], "a.md");
    }

    #[test]
    fn response_reads_reasoning_content_alias() {
        let response = parse(
            r#"{"choices":[{"message":{"content":"hey","reasoning_content":"thinking"}}],"model":"glm"}"#,
        );
        assert_eq!(response.reasoning.as_deref(), Some("thinking"));
        assert_eq!(response.model, "glm");
    }

    #[test]
    fn response_without_choices_is_a_parse_failure() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("json");
        let err = parsed.into_response("m").unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn complete_posts_context_and_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "glm-test",
                "max_tokens": 2000,
                "messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "check_time"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello", "reasoning": "greet back"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = LlmRequest::new(vec![Turn::system("be brief"), Turn::user("hi")])
            .with_tools(vec![ToolSpec::new("check_time", "Get the time")])
            .with_max_tokens(2000);
        let response = backend_for(&server)
            .complete(&request)
            .await
            .expect("completion succeeds");

        assert_eq!(response.content.as_deref(), Some("hello"));
        assert_eq!(response.reasoning.as_deref(), Some("greet back"));
        assert_eq!(response.usage.map(|u| u.total()), Some(12));
    }

    #[tokio::test]
    async fn complete_sends_bearer_key_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(
            LlmBackendConfig::new(format!("{}/v1", server.uri()), "m").with_api_key("sk-test"),
        )
        .expect("client builds");
        let response = backend
            .complete(&LlmRequest::new(vec![Turn::user("x")]))
            .await
            .expect("completion succeeds");
        assert_eq!(response.content.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn complete_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("tunnel down"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&LlmRequest::new(vec![Turn::user("x")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tunnel down"));
    }

    #[tokio::test]
    async fn complete_cuts_long_error_pages() {
        let page = format!("<html>\n<body>{}</body>\n</html>", "Bad gateway. ".repeat(400));
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string(page))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&LlmRequest::new(vec![Turn::user("x")]))
            .await
            .unwrap_err();

        let LlmError::RequestFailed { reason } = err.current_context() else {
            panic!("expected RequestFailed, got {err}");
        };
        assert!(reason.starts_with("502 Bad Gateway: <html> <body>Bad gateway."));
        assert!(reason.ends_with('…'));
        assert!(reason.chars().count() < MAX_ERROR_DETAIL_CHARS + 40);
    }

    #[test]
    fn short_error_bodies_are_kept_whole() {
        assert_eq!(error_detail("  tunnel\n down "), "tunnel down");
    }

    #[tokio::test]
    async fn complete_maps_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&LlmRequest::new(vec![Turn::user("x")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("retry after 12s"));
    }

    #[tokio::test]
    async fn complete_rejects_non_json_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>cloudflare</html>"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&LlmRequest::new(vec![Turn::user("x")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse LLM response"));
    }
}
