//! Peer identifiers as they appear in configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A messaging target named in configuration.
///
/// Operators may write a numeric id, a username or a dialog title; the value
/// is classified once here and resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerTarget {
    /// Numeric peer id (bot-API style, may be negative).
    ById(i64),

    /// Public username without the leading `@`.
    ByUsername(String),

    /// Exact dialog title.
    ByTitle(String),

    /// The account's own "Saved Messages" chat.
    SavedMessages,
}

impl PeerTarget {
    /// Classifies a raw identifier.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::ById(id));
        }

        if raw.eq_ignore_ascii_case("me") || raw.eq_ignore_ascii_case("self") {
            return Some(Self::SavedMessages);
        }

        if let Some(name) = raw.strip_prefix('@') {
            return Some(Self::ByUsername(name.to_owned()));
        }

        for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
            if let Some(name) = raw.strip_prefix(prefix) {
                let name = name.trim_end_matches('/');
                if !name.is_empty() && !name.contains('/') {
                    return Some(Self::ByUsername(name.to_owned()));
                }
            }
        }

        Some(Self::ByTitle(raw.to_owned()))
    }

    /// Checks whether a dialog with the given identity is this target.
    ///
    /// Titles and usernames are both tried for `ByTitle`, since operators
    /// frequently paste a username without the `@`.
    #[must_use]
    pub fn matches(&self, id: i64, username: Option<&str>, title: &str) -> bool {
        match self {
            Self::ById(wanted) => *wanted == id,
            Self::ByUsername(wanted) => username.is_some_and(|u| u == wanted),
            Self::ByTitle(wanted) => title == wanted || username.is_some_and(|u| u == wanted),
            Self::SavedMessages => false,
        }
    }
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "{id}"),
            Self::ByUsername(name) => write!(f, "@{name}"),
            Self::ByTitle(title) => write!(f, "\"{title}\""),
            Self::SavedMessages => f.write_str("Saved Messages"),
        }
    }
}

/// A configured target together with what it resolved to at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// The target as written in configuration.
    pub configured: PeerTarget,

    /// Peer id found during startup resolution, if any.
    pub resolved: Option<i64>,
}

impl Destination {
    /// Creates an unresolved destination.
    #[must_use]
    pub const fn new(configured: PeerTarget) -> Self {
        Self {
            configured,
            resolved: None,
        }
    }

    /// Records the id the target resolved to.
    #[must_use]
    pub const fn with_resolved(mut self, id: Option<i64>) -> Self {
        self.resolved = id;
        self
    }

    /// The peer to address: the resolved id, or the raw configured target.
    #[must_use]
    pub fn peer(&self) -> PeerTarget {
        self.resolved
            .map_or_else(|| self.configured.clone(), PeerTarget::ById)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved {
            Some(id) => write!(f, "{} (id {id})", self.configured),
            None => write!(f, "{}", self.configured),
        }
    }
}
