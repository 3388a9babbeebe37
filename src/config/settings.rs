//! Application settings and Telegram configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    DEFAULT_BROADCAST_INTERVAL_SECS, DEFAULT_DEDUP_TTL_SECS, DEFAULT_DELETE_AFTER_SECS,
    DEFAULT_EMPTY_BACKOFF_SECS, DEFAULT_ERROR_COOLDOWN_SECS, DEFAULT_MAX_TRIGGER_LENGTH,
    PeerTarget,
};

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    #[serde(skip_serializing)]
    pub api_hash: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.db")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String) -> Self {
        Self {
            api_id,
            api_hash,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `API_ID` and `API_HASH` to be set; `SESSION_PATH` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_id: i32 = lookup("API_ID")
            .ok_or(ConfigError::MissingEnvVar("API_ID"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;
        if api_id <= 0 {
            return Err(ConfigError::InvalidApiId);
        }

        let api_hash = lookup("API_HASH")
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("API_HASH"))?;

        let session_path =
            lookup("SESSION_PATH").map_or_else(default_session_path, PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            session_path,
        })
    }
}

/// Agent behaviour: where alerts go, what triggers them, how broadcasts rotate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Group receiving keyword alerts.
    pub target_group: Option<PeerTarget>,

    /// Group receiving broadcast confirmations.
    pub log_group: Option<PeerTarget>,

    /// Lowercase trigger substrings.
    pub keywords: Vec<String>,

    /// Dialog folder whose groups take part in the broadcast rotation.
    pub target_folder_id: Option<i32>,

    /// Longest message (in characters) that may trigger an alert.
    #[serde(default = "default_max_trigger_length")]
    pub max_trigger_length: usize,

    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,

    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_secs: u64,

    #[serde(default = "default_delete_after")]
    pub delete_after_secs: u64,

    #[serde(default = "default_empty_backoff")]
    pub empty_backoff_secs: u64,

    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,

    /// Minimum spacing between outbound API calls in milliseconds.
    #[serde(default = "default_min_send_interval")]
    pub min_send_interval_ms: u64,

    /// Whether alerts carry the chat link line.
    #[serde(default = "default_include_chat_link")]
    pub include_chat_link: bool,
}

const fn default_max_trigger_length() -> usize {
    DEFAULT_MAX_TRIGGER_LENGTH
}

const fn default_dedup_ttl() -> u64 {
    DEFAULT_DEDUP_TTL_SECS
}

const fn default_broadcast_interval() -> u64 {
    DEFAULT_BROADCAST_INTERVAL_SECS
}

const fn default_delete_after() -> u64 {
    DEFAULT_DELETE_AFTER_SECS
}

const fn default_empty_backoff() -> u64 {
    DEFAULT_EMPTY_BACKOFF_SECS
}

const fn default_error_cooldown() -> u64 {
    DEFAULT_ERROR_COOLDOWN_SECS
}

const fn default_min_send_interval() -> u64 {
    500
}

const fn default_include_chat_link() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            target_group: None,
            log_group: None,
            keywords: Vec::new(),
            target_folder_id: None,
            max_trigger_length: default_max_trigger_length(),
            dedup_ttl_secs: default_dedup_ttl(),
            broadcast_interval_secs: default_broadcast_interval(),
            delete_after_secs: default_delete_after(),
            empty_backoff_secs: default_empty_backoff(),
            error_cooldown_secs: default_error_cooldown(),
            min_send_interval_ms: default_min_send_interval(),
            include_chat_link: default_include_chat_link(),
        }
    }
}

impl AgentSettings {
    /// Creates agent settings from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `TARGET_FOLDER_ID` is set but not an integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let target_folder_id = match lookup("TARGET_FOLDER_ID") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidFolderId(raw.clone()))?,
            ),
            _ => None,
        };

        let number = |key: &'static str, default: u64| -> u64 {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!("Ignoring invalid {key}={raw:?}, using {default}");
                    default
                }),
                None => default,
            }
        };

        let max_trigger_length = usize::try_from(number(
            "MAX_TRIGGER_LENGTH",
            DEFAULT_MAX_TRIGGER_LENGTH as u64,
        ))
        .unwrap_or(DEFAULT_MAX_TRIGGER_LENGTH);

        let include_chat_link = lookup("ALERT_INCLUDE_CHAT_LINK").map_or_else(
            default_include_chat_link,
            |raw| !matches!(raw.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        );

        Ok(Self {
            target_group: lookup("TARGET_GROUP_NAME").and_then(|raw| PeerTarget::parse(&raw)),
            log_group: lookup("LOG_GROUP_TITLE").and_then(|raw| PeerTarget::parse(&raw)),
            keywords: lookup("KEYWORDS")
                .map(|raw| parse_keywords(&raw))
                .unwrap_or_default(),
            target_folder_id,
            max_trigger_length,
            dedup_ttl_secs: number("DEDUP_TTL_SECS", DEFAULT_DEDUP_TTL_SECS),
            broadcast_interval_secs: number(
                "BROADCAST_INTERVAL_SECS",
                DEFAULT_BROADCAST_INTERVAL_SECS,
            ),
            delete_after_secs: number("DELETE_AFTER_SECS", DEFAULT_DELETE_AFTER_SECS),
            empty_backoff_secs: number("EMPTY_BACKOFF_SECS", DEFAULT_EMPTY_BACKOFF_SECS),
            error_cooldown_secs: number("ERROR_COOLDOWN_SECS", DEFAULT_ERROR_COOLDOWN_SECS),
            min_send_interval_ms: number("MIN_SEND_INTERVAL_MS", default_min_send_interval()),
            include_chat_link,
        })
    }

    #[must_use]
    pub const fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    #[must_use]
    pub const fn delete_after(&self) -> Duration {
        Duration::from_secs(self.delete_after_secs)
    }

    #[must_use]
    pub const fn empty_backoff(&self) -> Duration {
        Duration::from_secs(self.empty_backoff_secs)
    }

    #[must_use]
    pub const fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    #[must_use]
    pub const fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

/// Splits a comma-separated keyword list into trimmed lowercase entries.
///
/// Empty entries are dropped: an empty substring would match every message.
#[must_use]
fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid TARGET_FOLDER_ID: {0:?} (must be an integer)")]
    InvalidFolderId(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = AgentSettings::default();
        assert_eq!(settings.max_trigger_length, 15);
        assert_eq!(settings.dedup_ttl(), Duration::from_secs(180));
        assert_eq!(settings.broadcast_interval(), Duration::from_secs(180));
        assert_eq!(settings.delete_after(), Duration::from_secs(60));
        assert_eq!(settings.empty_backoff(), Duration::from_secs(60));
        assert_eq!(settings.error_cooldown(), Duration::from_secs(20));
        assert!(settings.keywords.is_empty());
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("session.db"));
    }

    #[test]
    fn test_telegram_config_requires_credentials() {
        let err = TelegramConfig::from_lookup(lookup(&[("API_HASH", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("API_ID")));

        let err = TelegramConfig::from_lookup(lookup(&[("API_ID", "abc"), ("API_HASH", "x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidApiId));

        let err = TelegramConfig::from_lookup(lookup(&[("API_ID", "42")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("API_HASH")));

        let config = TelegramConfig::from_lookup(lookup(&[
            ("API_ID", "42"),
            ("API_HASH", "hash"),
            ("SESSION_PATH", "/tmp/relay.db"),
        ]))
        .unwrap();
        assert_eq!(config.api_id, 42);
        assert_eq!(config.session_path, PathBuf::from("/tmp/relay.db"));
    }

    #[test]
    fn test_agent_settings_from_lookup() {
        let settings = AgentSettings::from_lookup(lookup(&[
            ("TARGET_GROUP_NAME", "ORDERS"),
            ("LOG_GROUP_TITLE", "-100200"),
            ("KEYWORDS", "Cena, цена,,"),
            ("TARGET_FOLDER_ID", "1"),
            ("DELETE_AFTER_SECS", "soon"),
            ("ALERT_INCLUDE_CHAT_LINK", "off"),
        ]))
        .unwrap();

        assert_eq!(
            settings.target_group,
            Some(PeerTarget::ByTitle("ORDERS".to_owned()))
        );
        assert_eq!(settings.log_group, Some(PeerTarget::ById(-100_200)));
        assert_eq!(settings.keywords, vec!["cena", "цена"]);
        assert_eq!(settings.target_folder_id, Some(1));
        assert_eq!(settings.delete_after_secs, DEFAULT_DELETE_AFTER_SECS);
        assert!(!settings.include_chat_link);
    }

    #[test]
    fn test_invalid_folder_is_fatal() {
        let err = AgentSettings::from_lookup(lookup(&[("TARGET_FOLDER_ID", "rozyob")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFolderId(_)));
    }

    #[test]
    fn test_parse_keywords_drops_blanks() {
        assert_eq!(parse_keywords(" A ,b,, "), vec!["a", "b"]);
        assert!(parse_keywords("").is_empty());
    }
}
