mod config;
mod console;
mod error;
mod message;
mod poller;
mod reconcile;
mod relay;
mod render;
mod scheduler;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::console::ConsoleExit;
use crate::poller::{Poller, PollerSettings};
use crate::scheduler::Scheduler;
use crate::telegram::{HttpUpdateSource, UpdateSource};

#[derive(Parser)]
#[command(name = "telegram-daylog", about = "Live view of today's messages in one Telegram chat")]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the chat and render today's messages (default)
    Watch {
        #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
        bot_token: Option<String>,
        #[arg(long, env = "TELEGRAM_CHAT_ID")]
        chat_id: Option<String>,
        /// Poll through a relay at this URL instead of the Bot API
        #[arg(long)]
        relay_url: Option<String>,
    },
    /// Serve the getUpdates relay
    Relay {
        /// Address to listen on, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegram_daylog=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from: {}", cli.config.display());
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Watch {
        bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
        chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        relay_url: None,
    }) {
        Command::Relay { bind } => {
            if let Some(bind) = bind {
                config.relay.bind = bind;
            }
            relay::serve(&config.relay).await
        }
        Command::Watch {
            bot_token,
            chat_id,
            relay_url,
        } => {
            config.override_credentials(bot_token, chat_id);
            if relay_url.is_some() {
                config.poller.relay_url = relay_url;
            }
            watch(config).await
        }
    }
}

async fn watch(config: Config) -> Result<()> {
    let source: Arc<dyn UpdateSource> = match config.poller.relay_url.as_deref() {
        Some(url) => Arc::new(HttpUpdateSource::relay(url)),
        None => Arc::new(HttpUpdateSource::direct(&config.telegram.api_base_url)),
    };

    info!("Configuration loaded successfully");
    info!("  Source: {}", source.name());
    info!("  Chat: {}", config.telegram.chat_id);
    info!("  Interval: {}ms", config.poller.interval().as_millis());
    info!("  Interactive settings: {}", config.poller.interactive_settings);

    let poller = Poller::new(
        source,
        &config.telegram.bot_token,
        &config.telegram.chat_id,
        PollerSettings::from(&config.poller),
        message::today(),
    );

    tokio::spawn(render::run(poller.subscribe()));

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(&scheduler, poller.clone()).await?;
    scheduler.start().await?;

    match config.credentials() {
        Ok(_) => {
            poller.start().await?;
        }
        Err(e) => {
            warn!("Not polling yet: {}", e);
            println!("Set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID, edit config.toml, or use /token and /chat, then /start.");
        }
    }
    println!("{}", console::HELP_TEXT);

    let export_dir = config.poller.export_dir.clone();
    tokio::select! {
        exit = console::run(poller.clone(), &export_dir) => {
            if exit == ConsoleExit::Eof {
                info!("Console closed, press Ctrl-C to exit");
                tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
        }
    }

    poller.stop().await;
    scheduler.shutdown().await?;
    info!("Goodbye");
    Ok(())
}
