//! Minimal Discord REST client.
//!
//! The relay polls a single channel instead of holding a gateway session, so
//! everything here is plain request/response over the v10 REST API.

use crate::error::DiscordError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use synth_relay_conversation::RawMessage;
use synth_relay_core::Result;
use tracing::{debug, instrument};

/// Longest reply chunk we post; Discord rejects messages over 2000 characters.
pub const MAX_CHUNK_CHARS: usize = 1900;

/// A Discord user as embedded in message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl DiscordUser {
    /// Name shown in the channel.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// A channel message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl DiscordMessage {
    /// Converts to the platform-neutral form used by history filtering.
    #[must_use]
    pub fn to_raw(&self, self_id: &str) -> RawMessage {
        let is_self = self.author.id == self_id;
        RawMessage {
            id: self.id.clone(),
            author: self.author.display_name().to_string(),
            is_self,
            is_other_bot: self.author.bot && !is_self,
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Snowflake as a number, for ordering.
    #[must_use]
    pub fn snowflake(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}

/// Client bound to one bot token and one channel.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: Client,
    api_base: String,
    token: String,
    channel_id: String,
}

impl DiscordClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, DiscordError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DiscordError::RequestFailed {
                endpoint: "client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel_id: channel_id.into(),
        })
    }

    /// Returns the channel this client talks to.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Fetches the bot's own user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn current_user(&self) -> Result<DiscordUser, DiscordError> {
        let request = self.client.get(format!("{}/users/@me", self.api_base));
        self.send_json("/users/@me", request).await
    }

    /// Fetches up to `limit` recent channel messages, newest first.
    ///
    /// With `after`, only messages newer than that id are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn fetch_messages(
        &self,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<DiscordMessage>, DiscordError> {
        let endpoint = format!("/channels/{}/messages", self.channel_id);
        let mut query = vec![("limit", limit.clamp(1, 100).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        let request = self
            .client
            .get(format!("{}{endpoint}", self.api_base))
            .query(&query);
        let messages: Vec<DiscordMessage> = self.send_json(&endpoint, request).await?;
        debug!(count = messages.len(), "fetched messages");
        Ok(messages)
    }

    /// Posts one message.
    ///
    /// # Errors
    ///
    /// Returns an error if Discord rejects the message.
    pub async fn send_message(&self, content: &str) -> Result<DiscordMessage, DiscordError> {
        let endpoint = format!("/channels/{}/messages", self.channel_id);
        let request = self
            .client
            .post(format!("{}{endpoint}", self.api_base))
            .json(&serde_json::json!({ "content": content }));
        self.send_json(&endpoint, request).await
    }

    /// Posts `content` split into chunks Discord will accept.
    ///
    /// # Errors
    ///
    /// Returns the first chunk failure; earlier chunks stay posted.
    #[instrument(skip_all, fields(chars = content.chars().count()))]
    pub async fn send_chunked(&self, content: &str) -> Result<usize, DiscordError> {
        let chunks = chunk_message(content, MAX_CHUNK_CHARS);
        for chunk in &chunks {
            self.send_message(chunk).await?;
        }
        Ok(chunks.len())
    }

    /// Shows the typing indicator for a few seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn trigger_typing(&self) -> Result<(), DiscordError> {
        let endpoint = format!("/channels/{}/typing", self.channel_id);
        let request = self.client.post(format!("{}{endpoint}", self.api_base));
        self.send(&endpoint, request).await.map(|_| ())
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DiscordError> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| DiscordError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DiscordError> {
        let response = self.send(endpoint, request).await?;
        let value = response
            .json::<T>()
            .await
            .map_err(|e| DiscordError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(value)
    }
}

/// Splits `content` into pieces of at most `max_chars` characters.
///
/// Prefers breaking after a newline in the back half of a piece; otherwise
/// breaks on a character boundary. Empty input yields no chunks.
#[must_use]
pub fn chunk_message(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest.to_string());
            break;
        };
        let window = &rest[..limit];
        let split = window
            .rfind('\n')
            .filter(|&at| at >= limit / 2)
            .map_or(limit, |at| at + 1);
        chunks.push(rest[..split].to_string());
        rest = &rest[split..];
    }

    chunks
}
