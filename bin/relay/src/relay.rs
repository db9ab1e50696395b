//! Channel event handling.
//!
//! Each new channel message is offered to [`Relay::handle`]. Admission goes
//! through the turn gate; a message arriving while a turn is in flight is
//! dropped, not queued.

use crate::discord::{DiscordClient, DiscordMessage, MAX_CHUNK_CHARS};
use crate::error::DiscordError;
use rootcause::Report;
use std::sync::Arc;
use std::time::Duration;
use synth_relay_ai::LlmBackend;
use synth_relay_conversation::{
    ConversationEngine, ERROR_MARKER, HistoryFilter, TranscriptEntry, TranscriptLog, TurnGate,
    TurnOutcome,
};
use tracing::{debug, error, info, instrument, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Our own message.
    OwnMessage,
    /// Another bot's message while bots are ignored.
    BotMessage,
    /// A turn was already in flight.
    Busy,
    /// The turn completed and any reply was delivered.
    Replied { chunks: usize },
    /// The turn failed and an error notice was posted.
    Failed,
}

/// Admission and per-message handling for one channel.
pub struct Relay<B> {
    discord: DiscordClient,
    engine: ConversationEngine<B>,
    history: HistoryFilter,
    transcripts: TranscriptLog,
    gate: TurnGate,
    self_id: String,
    ignore_bots: bool,
    history_limit: u32,
}

impl<B: LlmBackend + 'static> Relay<B> {
    /// Creates a relay that replies as the user `self_id`.
    #[must_use]
    pub fn new(
        discord: DiscordClient,
        engine: ConversationEngine<B>,
        transcripts: TranscriptLog,
        self_id: impl Into<String>,
    ) -> Self {
        Self {
            discord,
            engine,
            history: HistoryFilter::default(),
            transcripts,
            gate: TurnGate::new(),
            self_id: self_id.into(),
            ignore_bots: true,
            history_limit: 30,
        }
    }

    /// Sets whether other bots' messages are ignored.
    #[must_use]
    pub fn with_ignore_bots(mut self, ignore_bots: bool) -> Self {
        self.ignore_bots = ignore_bots;
        self
    }

    /// Sets how many messages are fetched for each turn.
    #[must_use]
    pub fn with_history_limit(mut self, history_limit: u32) -> Self {
        self.history_limit = history_limit;
        self
    }

    /// Sets the history filter.
    #[must_use]
    pub fn with_history_filter(mut self, history: HistoryFilter) -> Self {
        self.history = history;
        self
    }

    /// Returns the turn gate.
    #[must_use]
    pub fn gate(&self) -> &TurnGate {
        &self.gate
    }

    /// Handles one inbound message.
    #[instrument(skip_all, fields(message_id = %message.id, author = %message.author.display_name()))]
    pub async fn handle(&self, message: &DiscordMessage) -> Handled {
        if message.author.id == self.self_id {
            return Handled::OwnMessage;
        }
        if self.ignore_bots && message.author.bot {
            debug!("ignoring bot message");
            return Handled::BotMessage;
        }
        let Some(_permit) = self.gate.try_acquire() else {
            info!("turn in flight, dropping message");
            return Handled::Busy;
        };

        match self.respond(message).await {
            Ok(chunks) => Handled::Replied { chunks },
            Err(reason) => {
                error!(%reason, "turn failed");
                let notice = error_notice(&reason);
                if let Err(report) = self.discord.send_message(&notice).await {
                    warn!(error = %report, "failed to post error notice");
                }
                Handled::Failed
            }
        }
    }

    async fn respond(&self, message: &DiscordMessage) -> Result<usize, String> {
        if let Err(report) = self.discord.trigger_typing().await {
            warn!(error = %report, "failed to send typing indicator");
        }

        let recent = self
            .discord
            .fetch_messages(self.history_limit, None)
            .await
            .map_err(|report| report.current_context().to_string())?;
        let raw: Vec<_> = recent.iter().map(|m| m.to_raw(&self.self_id)).collect();
        let history = self.history.filter(&raw, self.history_limit as usize);
        let history_length = history.len();

        let outcome = self
            .engine
            .run_turn(history)
            .await
            .map_err(|report| report.current_context().to_string())?;

        let chunks = self.deliver(&outcome).await?;

        let user_message = format!("[{}]: {}", message.author.display_name(), message.content);
        let entry = TranscriptEntry::from_outcome(user_message, &outcome)
            .with_metadata("discord_message_id", message.id.clone())
            .with_metadata("discord_author", message.author.display_name())
            .with_metadata("history_length", history_length);
        if let Err(report) = self.transcripts.append(&entry).await {
            warn!(error = %report, "failed to append transcript");
        }

        Ok(chunks)
    }

    async fn deliver(&self, outcome: &TurnOutcome) -> Result<usize, String> {
        match outcome.content.as_deref() {
            Some(content) if !content.trim().is_empty() => self
                .discord
                .send_chunked(content)
                .await
                .map_err(|report| report.current_context().to_string()),
            _ => {
                info!(turn_id = %outcome.turn_id, "model returned no content, nothing to post");
                Ok(0)
            }
        }
    }

    /// Polls the channel until `shutdown` resolves.
    ///
    /// Messages already in the channel at startup are skipped. Each new
    /// message is handled on its own task so polling (and shedding) continues
    /// while a turn runs.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial cursor cannot be read.
    pub async fn run(
        self: Arc<Self>,
        poll_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Report<DiscordError>> {
        let mut last_seen = self
            .discord
            .fetch_messages(1, None)
            .await?
            .first()
            .map(|m| m.id.clone());
        info!(channel = self.discord.channel_id(), "relay listening");

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            let mut fresh = match self.discord.fetch_messages(50, last_seen.as_deref()).await {
                Ok(messages) => messages,
                Err(report) => {
                    warn!(error = %report, "poll failed");
                    continue;
                }
            };
            fresh.sort_by_key(DiscordMessage::snowflake);

            for message in fresh {
                last_seen = Some(message.id.clone());
                let relay = Arc::clone(&self);
                tokio::spawn(async move {
                    relay.handle(&message).await;
                });
            }
        }
    }
}

/// Formats a failure for the channel as a single message.
///
/// The reason is cut so the notice fits one chunk; the marker prefix stays
/// intact so history filtering still drops it.
fn error_notice(reason: &str) -> String {
    let budget = MAX_CHUNK_CHARS - ERROR_MARKER.chars().count() - 2;
    let reason = match reason.char_indices().nth(budget) {
        Some((cut, _)) => &reason[..cut],
        None => reason,
    };
    format!("{ERROR_MARKER} {reason}*")
}
