//! Relay configuration.
//!
//! Loaded via the `config` crate from an optional `synth-relay.toml` in the
//! working directory, then from environment variables such as
//! `SYNTH_DISCORD__TOKEN` or `SYNTH_LLM__BASE_URL`.

use crate::error::RelayError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use synth_relay_ai::LlmBackendConfig;
use synth_relay_conversation::EngineConfig;

/// Relay configuration composed from its sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub post: PostConfig,
}

/// Discord connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token of the relay's own account. Required for `run`.
    pub token: Option<String>,
    /// Channel the relay listens and replies in. Required for `run` and `post`.
    pub channel_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Messages fetched and filtered for each turn.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// Whether messages from other bot accounts trigger turns.
    #[serde(default = "default_ignore_bots")]
    pub ignore_bots: bool,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_history_limit() -> u32 {
    30
}

fn default_ignore_bots() -> bool {
    true
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            api_base: default_api_base(),
            poll_interval_ms: default_poll_interval_ms(),
            history_limit: default_history_limit(),
            ignore_bots: default_ignore_bots(),
        }
    }
}

impl DiscordConfig {
    /// Returns the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Model endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_model() -> String {
    "mlx-community/GLM-4.7-Flash-4bit".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_llm_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Builds the backend configuration.
    #[must_use]
    pub fn backend(&self) -> LlmBackendConfig {
        let config = LlmBackendConfig::new(&self.base_url, &self.model)
            .with_timeout_secs(self.timeout_secs);
        match &self.api_key {
            Some(key) if !key.is_empty() => config.with_api_key(key),
            _ => config,
        }
    }

    /// Builds the per-round sampling configuration.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_tokens: self.max_tokens,
            ..EngineConfig::default()
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: PathBuf,
    /// Directory exposed to `read_file` and `list_files`.
    #[serde(default = "default_scaffolding_dir")]
    pub scaffolding_dir: PathBuf,
    #[serde(default = "default_notes_file")]
    pub notes_file: PathBuf,
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    #[serde(default = "default_conversations_dir")]
    pub conversations_dir: PathBuf,
}

fn default_system_prompt() -> PathBuf {
    PathBuf::from("scaffolding/system-prompt.md")
}

fn default_scaffolding_dir() -> PathBuf {
    PathBuf::from("scaffolding")
}

fn default_notes_file() -> PathBuf {
    PathBuf::from("scaffolding/notes.md")
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from("state/memory")
}

fn default_conversations_dir() -> PathBuf {
    PathBuf::from("conversations")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            scaffolding_dir: default_scaffolding_dir(),
            notes_file: default_notes_file(),
            memory_dir: default_memory_dir(),
            conversations_dir: default_conversations_dir(),
        }
    }
}

/// Settings for the `post` command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostConfig {
    /// Token of the account that `post` speaks as.
    pub token: Option<String>,
}

/// Tool execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    /// Returns the per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RelayConfig {
    /// Loads configuration from `synth-relay.toml` (if present) and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("synth-relay").required(false)),
        )
    }

    /// Returns the token `post` sends with.
    ///
    /// Posting with the relay's own token would make the text read as the
    /// relay's earlier replies, so the two tokens must differ.
    ///
    /// # Errors
    ///
    /// Returns an error if `post.token` is unset or equals `discord.token`.
    pub fn post_token(&self) -> Result<&str, RelayError> {
        let token = self
            .post
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RelayError::MissingSetting { key: "post.token" })?;
        if self.discord.token.as_deref() == Some(token) {
            return Err(RelayError::PostAsRelay);
        }
        Ok(token)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder
            .add_source(
                config::Environment::with_prefix("SYNTH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
