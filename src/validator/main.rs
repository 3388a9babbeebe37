//! Standalone checker for the relay's environment configuration.
//!
//! Loads the same variables the agent reads at startup, reports what would
//! be enabled and exits non-zero if the configuration cannot be used.

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use keyword_relay::config::{AgentSettings, TelegramConfig};
use keyword_relay::monitor::within_length;

/// Relay configuration checker.
#[derive(Parser, Debug)]
#[command(name = "check_config")]
#[command(about = "Checks the environment configuration of the keyword relay")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Print the effective settings as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        eprintln!("Note: could not load {} ({e}), using process environment", args.env_file);
    }

    let telegram = match TelegramConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Telegram configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match AgentSettings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("✗ Agent settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        let report = json!({
            "telegram": telegram,
            "settings": settings,
        });
        return match serde_json::to_string_pretty(&report) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("✗ Failed to render settings: {e}");
                ExitCode::FAILURE
            }
        };
    }

    print_report(&telegram, &settings);
    ExitCode::SUCCESS
}

fn print_report(telegram: &TelegramConfig, settings: &AgentSettings) {
    println!("✓ API ID: {}", telegram.api_id);
    println!("✓ Session file: {}", telegram.session_path.display());
    println!();

    match &settings.target_group {
        Some(target) if !settings.keywords.is_empty() => {
            println!("Keyword monitor: enabled, alerts to {target}");
            println!(
                "  Triggers: messages up to {} chars containing any of:",
                settings.max_trigger_length
            );
            for keyword in &settings.keywords {
                let note = if within_length(keyword, settings.max_trigger_length) {
                    ""
                } else {
                    " (longer than the trigger cap, can never match)"
                };
                println!("    - {keyword}{note}");
            }
            println!("  Repeats suppressed for {}s", settings.dedup_ttl_secs);
        }
        Some(_) => println!("Keyword monitor: disabled (KEYWORDS is empty)"),
        None => println!("Keyword monitor: disabled (TARGET_GROUP_NAME not set)"),
    }
    println!();

    match settings.target_folder_id {
        Some(folder) => {
            println!("Broadcast rotation: enabled, folder {folder}");
            println!(
                "  Every {}s, deleted after {}s",
                settings.broadcast_interval_secs, settings.delete_after_secs
            );
            match &settings.log_group {
                Some(log) => println!("  Confirmations to {log}"),
                None => println!("  No log group (LOG_GROUP_TITLE not set)"),
            }
        }
        None => println!("Broadcast rotation: disabled (TARGET_FOLDER_ID not set)"),
    }
}
