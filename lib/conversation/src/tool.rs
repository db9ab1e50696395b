//! Tool registry and execution.
//!
//! The registry is the boundary between the model and side effects. It never
//! fails: unknown tools, malformed arguments, tool errors and timeouts all
//! come back as text the model can react to on its next round.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use synth_relay_ai::{ToolCall, ToolSpec};
use tracing::{info, warn};

/// Decoded tool arguments.
pub type ToolArguments = BTreeMap<String, String>;

/// A side-effecting operation the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in calls.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema for the parameters.
    fn parameters_schema(&self) -> JsonValue;

    /// Runs the tool.
    async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError>;

    /// Returns the catalog entry for this tool.
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description()).with_parameters(self.parameters_schema())
    }
}

/// Record of one executed tool call, kept for the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that was invoked.
    pub name: String,
    /// Arguments it received.
    pub arguments: ToolArguments,
    /// Text it returned.
    pub result: String,
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Creates a new empty registry with a 30 second per-call timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    /// Registers a tool, builder style.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Returns true if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the tool catalog, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Executes a tool by name and returns its text result.
    pub async fn execute(&self, name: &str, arguments: &ToolArguments) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            return format!("Unknown tool: {name}");
        };

        info!(
            tool = name,
            arguments = ?arguments.keys().collect::<Vec<_>>(),
            "executing tool"
        );
        match tokio::time::timeout(self.timeout, tool.execute(arguments)).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                warn!(tool = name, %error, "tool failed");
                format!("Error: {error}")
            }
            Err(_) => {
                warn!(tool = name, timeout = ?self.timeout, "tool timed out");
                format!("Error: tool '{name}' timed out after {}s", self.timeout.as_secs())
            }
        }
    }

    /// Decodes a canonical call's arguments and executes it.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let arguments = parse_arguments(&call.name, &call.arguments);
        let result = self.execute(&call.name, &arguments).await;
        ToolResult {
            name: call.name.clone(),
            arguments,
            result,
        }
    }
}

/// Decodes JSON object text into string arguments.
///
/// Anything that is not a JSON object decodes to empty arguments, and the
/// tool is still attempted. Non-string values keep their JSON text.
#[must_use]
pub fn parse_arguments(tool: &str, raw: &str) -> ToolArguments {
    if raw.trim().is_empty() {
        return ToolArguments::new();
    }

    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => map
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    JsonValue::String(text) => text,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect(),
        Ok(_) | Err(_) => {
            warn!(tool, raw, "failed to parse tool arguments, using none");
            ToolArguments::new()
        }
    }
}
