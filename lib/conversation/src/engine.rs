//! The conversation turn loop.
//!
//! One call to [`ConversationEngine::run_turn`] assembles the working
//! context (system prompt, memory, history), then alternates model calls and
//! tool executions until the model answers without requesting a tool.

use crate::memory::MemoryStore;
use crate::tool::{ToolRegistry, ToolResult};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use synth_relay_ai::{
    LlmBackend, LlmError, LlmRequest, TokenUsage, Turn, TurnRole, extract_tool_calls,
};
use synth_relay_core::{InvocationId, TurnId};
use tracing::{debug, info, instrument};

/// Sampling parameters for every round of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tokens the model may generate per round.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature; backend default when unset.
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Identifier for this turn.
    pub turn_id: TurnId,
    /// Final answer text, passed through unmodified.
    pub content: Option<String>,
    /// Free-text reasoning from the final round.
    pub reasoning: Option<String>,
    /// Wall-clock time across all rounds.
    pub elapsed_seconds: f64,
    /// Every tool call executed during the turn, in order.
    pub tool_calls_made: Vec<ToolResult>,
    /// Number of model round-trips.
    pub rounds: u32,
    /// Token usage summed across rounds.
    pub usage: Option<TokenUsage>,
    /// Model that produced the final answer.
    pub model: String,
}

/// Drives the model/tool loop for one turn at a time.
pub struct ConversationEngine<B> {
    backend: B,
    system_prompt: String,
    tools: ToolRegistry,
    memory: Option<MemoryStore>,
    config: EngineConfig,
}

impl<B> std::fmt::Debug for ConversationEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: LlmBackend> ConversationEngine<B> {
    /// Creates an engine with no memory store.
    #[must_use]
    pub fn new(backend: B, system_prompt: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            tools,
            memory: None,
            config: EngineConfig::default(),
        }
    }

    /// Injects rendered memory blocks into every turn.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryStore) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Sets the sampling parameters.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the backend's model name.
    #[must_use]
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Runs one turn over `history` (oldest first).
    ///
    /// # Errors
    ///
    /// Returns the first backend failure. Tool failures never abort a turn.
    #[instrument(skip_all, fields(turn_id = tracing::field::Empty, history = history.len()))]
    pub async fn run_turn(&self, history: Vec<Turn>) -> Result<TurnOutcome, Report<LlmError>> {
        let turn_id = TurnId::new();
        tracing::Span::current().record("turn_id", tracing::field::display(turn_id));
        let started = Instant::now();

        let memory = match &self.memory {
            Some(store) => store.render().await,
            None => String::new(),
        };
        let mut context = Vec::with_capacity(history.len() + 2);
        context.push(Turn::system(self.system_prompt.clone()));
        context.extend(inject_memory(history, &memory));

        let tools = self.tools.specs();
        let mut tool_calls_made = Vec::new();
        let mut usage: Option<TokenUsage> = None;
        let mut rounds = 0u32;

        loop {
            rounds += 1;
            let invocation_id = InvocationId::new();
            let mut request = LlmRequest::new(context.clone())
                .with_tools(tools.clone())
                .with_max_tokens(self.config.max_tokens);
            if let Some(temperature) = self.config.temperature {
                request = request.with_temperature(temperature);
            }

            debug!(%invocation_id, round = rounds, turns = context.len(), "calling model");
            let response = self.backend.complete(&request).await?;
            info!(
                %invocation_id,
                round = rounds,
                finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
                "model responded"
            );

            if let Some(round_usage) = &response.usage {
                usage.get_or_insert_with(TokenUsage::default).accumulate(round_usage);
            }

            let Some(extracted) = extract_tool_calls(&response) else {
                let elapsed_seconds = started.elapsed().as_secs_f64();
                info!(
                    rounds,
                    tool_calls = tool_calls_made.len(),
                    elapsed_seconds,
                    "turn complete"
                );
                let model = if response.model.is_empty() {
                    self.backend.model().to_string()
                } else {
                    response.model
                };
                return Ok(TurnOutcome {
                    turn_id,
                    content: response.content,
                    reasoning: response.reasoning,
                    elapsed_seconds,
                    tool_calls_made,
                    rounds,
                    usage,
                    model,
                });
            };

            info!(
                round = rounds,
                encoding = extracted.encoding(),
                calls = ?extracted.calls().iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "model requested tools"
            );
            let calls = extracted.into_calls();
            context.push(
                Turn::assistant(response.content.unwrap_or_default()).with_tool_calls(calls.clone()),
            );
            for call in &calls {
                let result = self.tools.execute_call(call).await;
                context.push(Turn::tool(call.id.clone(), result.result.clone()));
                tool_calls_made.push(result);
            }
        }
    }
}

/// Prefixes `memory` onto the first user turn, or appends it as a trailing
/// user turn when the history has none.
fn inject_memory(mut history: Vec<Turn>, memory: &str) -> Vec<Turn> {
    if memory.is_empty() {
        return history;
    }

    match history.iter_mut().find(|turn| turn.role == TurnRole::User) {
        Some(first_user) => first_user.content.insert_str(0, memory),
        None => history.push(Turn::user(memory)),
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::CheckTime;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use synth_relay_ai::{LlmResponse, ToolCall};

    type Requests = Arc<Mutex<Vec<LlmRequest>>>;

    /// Replays canned responses and records every request.
    struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
        requests: Requests,
    }

    fn scripted(responses: Vec<Result<LlmResponse, LlmError>>) -> (ScriptedBackend, Requests) {
        let requests = Requests::default();
        let backend = ScriptedBackend {
            responses: Mutex::new(responses.into()),
            requests: Arc::clone(&requests),
        };
        (backend, requests)
    }

    fn recorded(requests: &Requests) -> Vec<LlmRequest> {
        requests.lock().unwrap().clone()
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            next.map_err(Report::from)
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn usage(input: u32, output: u32) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[tokio::test]
    async fn plain_answer_finishes_in_one_round() {
        let (backend, requests) = scripted(vec![Ok(LlmResponse::text("hello"))]);
        let engine = ConversationEngine::new(backend, "You are Synth.", ToolRegistry::new());

        let outcome = engine.run_turn(vec![Turn::user("hi")]).await.unwrap();

        assert_eq!(outcome.content.as_deref(), Some("hello"));
        assert!(outcome.tool_calls_made.is_empty());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.model, "scripted");

        let requests = recorded(&requests);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, TurnRole::System);
        assert_eq!(requests[0].messages[0].content, "You are Synth.");
        assert_eq!(requests[0].messages[1].content, "hi");
        assert_eq!(requests[0].max_tokens, Some(2000));
    }

    #[tokio::test]
    async fn embedded_tool_call_runs_a_second_round() {
        let (backend, requests) = scripted(vec![
            Ok(LlmResponse::default().with_reasoning("let me look <tool_call>check_time</tool_call>")),
            Ok(LlmResponse::text("It is late.")),
        ]);
        let engine = ConversationEngine::new(
            backend,
            "prompt",
            ToolRegistry::new().with_tool(CheckTime),
        );

        let outcome = engine.run_turn(vec![Turn::user("what time is it?")]).await.unwrap();

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.content.as_deref(), Some("It is late."));
        assert_eq!(outcome.tool_calls_made.len(), 1);
        assert_eq!(outcome.tool_calls_made[0].name, "check_time");
        assert!(outcome.tool_calls_made[0].arguments.is_empty());

        let second = &recorded(&requests)[1].messages;
        let assistant = &second[second.len() - 2];
        assert_eq!(assistant.role, TurnRole::Assistant);
        assert_eq!(assistant.tool_calls[0].name, "check_time");
        let tool = &second[second.len() - 1];
        assert_eq!(tool.role, TurnRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some(assistant.tool_calls[0].id.as_str()));
        assert_eq!(tool.content, outcome.tool_calls_made[0].result);
    }

    #[tokio::test]
    async fn structured_calls_echo_their_ids() {
        let call = ToolCall::new("srv_7", "nonexistent", "{}");
        let (backend, requests) = scripted(vec![
            Ok(LlmResponse::default().with_tool_calls(vec![call])),
            Ok(LlmResponse::text("")),
        ]);
        let engine = ConversationEngine::new(backend, "prompt", ToolRegistry::new());

        let outcome = engine.run_turn(vec![Turn::user("go")]).await.unwrap();

        assert_eq!(outcome.tool_calls_made[0].result, "Unknown tool: nonexistent");
        assert_eq!(outcome.content.as_deref(), Some(""));
        let last = recorded(&requests)[1].messages.last().cloned().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("srv_7"));
    }

    #[tokio::test]
    async fn memory_is_prefixed_onto_first_user_turn_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("persona.yaml"), "value: I am Synth.\n").unwrap();
        let (backend, requests) = scripted(vec![Ok(LlmResponse::text("ok"))]);
        let engine = ConversationEngine::new(backend, "prompt", ToolRegistry::new())
            .with_memory(MemoryStore::new(dir.path()));

        engine
            .run_turn(vec![
                Turn::assistant("earlier reply"),
                Turn::user("[tim]: first"),
                Turn::user("[tim]: second"),
            ])
            .await
            .unwrap();

        let messages = &recorded(&requests)[0].messages;
        assert_eq!(messages[1].content, "earlier reply");
        assert!(messages[2].content.contains("[persona]\nI am Synth."));
        assert!(messages[2].content.ends_with("[tim]: first"));
        assert_eq!(messages[3].content, "[tim]: second");
    }

    #[tokio::test]
    async fn memory_without_user_turns_becomes_trailing_turn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("persona.yaml"), "value: I am Synth.\n").unwrap();
        let (backend, requests) = scripted(vec![Ok(LlmResponse::text("ok"))]);
        let engine = ConversationEngine::new(backend, "prompt", ToolRegistry::new())
            .with_memory(MemoryStore::new(dir.path()));

        engine.run_turn(vec![Turn::assistant("hello?")]).await.unwrap();

        let messages = &recorded(&requests)[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, TurnRole::User);
        assert!(messages[2].content.contains("[persona]"));
    }

    #[tokio::test]
    async fn backend_failure_aborts_the_turn() {
        let (backend, requests) = scripted(vec![
            Ok(LlmResponse::default().with_reasoning("<tool_call>check_time</tool_call>")),
            Err(LlmError::Timeout),
        ]);
        let engine = ConversationEngine::new(
            backend,
            "prompt",
            ToolRegistry::new().with_tool(CheckTime),
        );

        let report = engine.run_turn(vec![Turn::user("hi")]).await.unwrap_err();

        assert!(report.to_string().contains("timed out"));
        assert_eq!(recorded(&requests).len(), 2);
    }

    #[tokio::test]
    async fn usage_is_summed_across_rounds() {
        let mut first =
            LlmResponse::default().with_tool_calls(vec![ToolCall::new("a", "check_time", "")]);
        first.usage = Some(usage(10, 5));
        let mut second = LlmResponse::text("done");
        second.usage = Some(usage(20, 7));

        let (backend, requests) = scripted(vec![Ok(first), Ok(second)]);
        let engine = ConversationEngine::new(
            backend,
            "prompt",
            ToolRegistry::new().with_tool(CheckTime),
        );

        let outcome = engine.run_turn(vec![Turn::user("hi")]).await.unwrap();
        assert_eq!(outcome.usage, Some(usage(30, 12)));
    }

    #[test]
    fn empty_memory_leaves_history_untouched() {
        let history = vec![Turn::user("hi")];
        assert_eq!(inject_memory(history.clone(), ""), history);
    }
}
