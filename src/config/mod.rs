//! Configuration module for the relay agent.
//!
//! Handles loading and validation of Telegram credentials, alert routing,
//! keyword lists and broadcast timing from the environment.

mod peer;
mod settings;

pub use peer::{Destination, PeerTarget};
pub use settings::{AgentSettings, ConfigError, TelegramConfig};

/// Messages longer than this many characters never trigger an alert.
pub const DEFAULT_MAX_TRIGGER_LENGTH: usize = 15;

/// How long a (sender, text) pair stays suppressed after an alert.
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 180;

/// Pause between two broadcast cycles.
pub const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 180;

/// Delay before a forwarded broadcast is deleted again.
pub const DEFAULT_DELETE_AFTER_SECS: u64 = 60;

/// Backoff when the folder has no groups or there is no saved message.
pub const DEFAULT_EMPTY_BACKOFF_SECS: u64 = 60;

/// Cooldown after an unexpected failure inside a broadcast cycle.
pub const DEFAULT_ERROR_COOLDOWN_SECS: u64 = 20;
