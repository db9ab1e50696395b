use clap::{Parser, Subcommand};
use rootcause::Report;
use std::process::ExitCode;
use std::sync::Arc;
use synth_relay::config::RelayConfig;
use synth_relay::discord::DiscordClient;
use synth_relay::error::RelayError;
use synth_relay::local;
use synth_relay::relay::Relay;
use synth_relay_ai::OpenAiCompatibleBackend;
use synth_relay_conversation::{
    ConversationEngine, MemoryStore, TranscriptLog, builtin_registry, load_system_prompt,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "synth-relay", version, about = "Relay a Discord channel to a language model")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen on the configured channel and reply (default).
    Run,
    /// Continue the local conversation with one turn and print the reply.
    Ask {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Post a plain message to the configured channel as the `post.token` account.
    Post {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match RelayConfig::load() {
        Ok(config) => match cli.command.unwrap_or(Command::Run) {
            Command::Run => run(config).await,
            Command::Ask { message } => ask(config, &message.join(" ")).await,
            Command::Post { message } => post(config, &message.join(" ")).await,
        },
        Err(e) => Err(RelayError::Config {
            reason: e.to_string(),
        }
        .into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!(error = %report, "exiting");
            ExitCode::FAILURE
        }
    }
}

async fn engine(
    config: &RelayConfig,
) -> Result<ConversationEngine<OpenAiCompatibleBackend>, Report<RelayError>> {
    let system_prompt = load_system_prompt(&config.paths.system_prompt)
        .await
        .map_err(|report| RelayError::Startup {
            reason: report.current_context().to_string(),
        })?;
    let backend =
        OpenAiCompatibleBackend::new(config.llm.backend()).map_err(|report| RelayError::Startup {
            reason: report.current_context().to_string(),
        })?;
    let tools = builtin_registry(&config.paths.scaffolding_dir, &config.paths.notes_file)
        .with_timeout(config.tools.timeout());

    Ok(ConversationEngine::new(backend, system_prompt, tools)
        .with_memory(MemoryStore::new(&config.paths.memory_dir))
        .with_config(config.llm.engine()))
}

fn discord(config: &RelayConfig, token: &str) -> Result<DiscordClient, Report<RelayError>> {
    let channel_id = config
        .discord
        .channel_id
        .as_deref()
        .ok_or(RelayError::MissingSetting {
            key: "discord.channel_id",
        })?;
    DiscordClient::new(&config.discord.api_base, token, channel_id).map_err(|report| {
        RelayError::Discord {
            reason: report.current_context().to_string(),
        }
        .into()
    })
}

async fn run(config: RelayConfig) -> Result<(), Report<RelayError>> {
    let token = config
        .discord
        .token
        .as_deref()
        .ok_or(RelayError::MissingSetting {
            key: "discord.token",
        })?;
    let discord = discord(&config, token)?;
    let me = discord
        .current_user()
        .await
        .map_err(|report| RelayError::Discord {
            reason: report.current_context().to_string(),
        })?;
    tracing::info!(user = %me.username, id = %me.id, model = %config.llm.model, "connected");

    let relay = Relay::new(
        discord,
        engine(&config).await?,
        TranscriptLog::new(&config.paths.conversations_dir, "discord"),
        me.id,
    )
    .with_ignore_bots(config.discord.ignore_bots)
    .with_history_limit(config.discord.history_limit);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    Arc::new(relay)
        .run(config.discord.poll_interval(), shutdown)
        .await
        .map_err(|report| {
            RelayError::Discord {
                reason: report.current_context().to_string(),
            }
            .into()
        })
}

async fn ask(config: RelayConfig, message: &str) -> Result<(), Report<RelayError>> {
    let engine = engine(&config).await?;
    let log = TranscriptLog::new(&config.paths.conversations_dir, local::LOCAL_PREFIX);
    let outcome = local::ask(&engine, &log, message).await?;

    if let Some(reasoning) = outcome.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
        println!("--- reasoning ---\n{reasoning}\n");
    }
    for call in &outcome.tool_calls_made {
        println!("[tool] {} -> {}", call.name, call.result);
    }
    println!("{}", outcome.content.as_deref().unwrap_or(""));
    Ok(())
}

async fn post(config: RelayConfig, message: &str) -> Result<(), Report<RelayError>> {
    let sent = discord(&config, config.post_token()?)?
        .send_chunked(message)
        .await
        .map_err(|report| RelayError::Discord {
            reason: report.current_context().to_string(),
        })?;
    tracing::info!(chunks = sent, "posted");
    Ok(())
}
