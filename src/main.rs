//! Keyword Relay - Main Entry Point
//!
//! A Telegram userbot that relays keyword alerts from incoming messages and
//! rotates the newest saved message through a folder of groups.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Input, Password};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keyword_relay::config::{AgentSettings, Destination, PeerTarget, TelegramConfig};
use keyword_relay::monitor::{AlertFormatter, DedupStore, InboundHandler, KeywordMatcher};
use keyword_relay::scheduler::{BroadcastScheduler, BroadcastTiming, SchedulerMessage};
use keyword_relay::telegram::{MessagingGateway, TelegramBot, TelegramError};

/// Telegram userbot relaying keyword alerts and rotating broadcasts.
#[derive(Parser, Debug)]
#[command(name = "keyword_relay")]
#[command(about = "Relay keyword alerts and rotate saved-message broadcasts")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Do not run the broadcast rotation.
    #[arg(long)]
    no_broadcast: bool,

    /// Do not watch incoming messages for keywords.
    #[arg(long)]
    no_monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let settings = AgentSettings::from_env().context("Failed to load agent settings")?;

    info!(
        "Loaded {} keywords, target folder: {:?}",
        settings.keywords.len(),
        settings.target_folder_id
    );

    // Connect to Telegram
    let bot = TelegramBot::connect(&tg_config, settings.min_send_interval())
        .await
        .context("Failed to connect to Telegram")?;

    // Handle authentication if needed
    if !bot.is_authorized().await.context("Failed to check authorization")? {
        authenticate(&bot, &tg_config).await?;
        info!("Session saved to {}", tg_config.session_path.display());
    }

    let bot = Arc::new(bot);
    let gateway: Arc<dyn MessagingGateway> = Arc::clone(&bot) as Arc<dyn MessagingGateway>;

    let target = match &settings.target_group {
        Some(target) => Some(resolve_destination(gateway.as_ref(), target, "TARGET_GROUP_NAME").await),
        None => None,
    };
    let log = match &settings.log_group {
        Some(target) => Some(resolve_destination(gateway.as_ref(), target, "LOG_GROUP_TITLE").await),
        None => None,
    };

    // Keyword monitor
    let inbound = bot.start_updates().context("Failed to start update stream")?;
    let monitor_handle = match target {
        Some(target) if !args.no_monitor && !settings.keywords.is_empty() => {
            let handler = Arc::new(InboundHandler::new(
                Arc::clone(&gateway),
                KeywordMatcher::new(settings.keywords.clone(), settings.max_trigger_length),
                DedupStore::new(settings.dedup_ttl()),
                AlertFormatter::new(settings.include_chat_link),
                target,
            ));
            tokio::spawn(handler.run(inbound))
        }
        _ => {
            if !args.no_monitor {
                warn!("Keyword monitor disabled: set TARGET_GROUP_NAME and KEYWORDS to enable it");
            }
            tokio::spawn(drain(inbound))
        }
    };

    // Broadcast rotation
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(8);
    let scheduler_handle = match settings.target_folder_id {
        Some(folder_id) if !args.no_broadcast => {
            let mut scheduler = BroadcastScheduler::new(
                Arc::clone(&gateway),
                folder_id,
                log,
                BroadcastTiming::from_settings(&settings),
            );
            Some(tokio::spawn(async move {
                scheduler.run(scheduler_rx).await;
            }))
        }
        _ => {
            if !args.no_broadcast {
                warn!("Broadcast rotation disabled: set TARGET_FOLDER_ID to enable it");
            }
            None
        }
    };

    info!("Relay is running. Use Ctrl+C to stop.");

    // Wait for Ctrl+C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    // Cleanup
    info!("Shutting down...");
    let _ = scheduler_tx.send(SchedulerMessage::Shutdown).await;
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            warn!("Broadcast scheduler did not stop cleanly: {}", e);
        }
    }
    monitor_handle.abort();
    bot.disconnect();

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves a configured group once at startup.
///
/// An unresolved target is kept as configured so sends can still try it.
async fn resolve_destination(
    gateway: &dyn MessagingGateway,
    target: &PeerTarget,
    var: &str,
) -> Destination {
    let resolved = match gateway.resolve(target).await {
        Ok(Some(id)) => {
            info!("🔎 {} resolved to id {}", var, id);
            Some(id)
        }
        Ok(None) => {
            warn!(
                "⚠ {} {} not found by title/username. A numeric id can be used instead.",
                var, target
            );
            None
        }
        Err(e) => {
            warn!("⚠ Failed to resolve {} {}: {}", var, target, e);
            None
        }
    };
    Destination::new(target.clone()).with_resolved(resolved)
}

/// Discards inbound messages when the monitor is off.
async fn drain<T>(mut rx: mpsc::Receiver<T>) {
    while rx.recv().await.is_some() {}
}

/// Handles Telegram authentication.
async fn authenticate(bot: &TelegramBot, config: &TelegramConfig) -> Result<()> {
    info!("Authentication required");

    let phone: String = Input::new()
        .with_prompt("Enter your phone number (with country code)")
        .interact_text()?;

    let token = bot
        .request_login_code(&phone, &config.api_hash)
        .await
        .context("Failed to request login code")?;

    info!("Login code sent to your Telegram app");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()?;

    match bot.sign_in(&token, &code).await {
        Ok(()) => {
            info!("Successfully signed in!");
            Ok(())
        }
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()?;

            bot.check_password(password_token, &password)
                .await
                .context("2FA authentication failed")?;

            info!("Successfully signed in with 2FA!");
            Ok(())
        }
        Err(e) => Err(e).context("Authentication failed"),
    }
}
