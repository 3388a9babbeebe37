//! Alert text construction.

use crate::telegram::{EntityInfo, InboundMessage};

/// Sender name used when nothing at all is known about the sender.
pub const UNKNOWN_SENDER: &str = "[UNKNOWN]";

/// Picks the best human-readable name for a sender.
///
/// Priority: `@username`, then "First Last", then `[ID:<id>]`, then
/// [`UNKNOWN_SENDER`].
#[must_use]
pub fn display_name(entity: Option<&EntityInfo>, fallback_id: Option<i64>) -> String {
    if let Some(entity) = entity {
        if let Some(username) = entity.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{username}");
        }
        if let Some(first) = entity.first_name.as_deref().filter(|f| !f.is_empty()) {
            return match entity.last_name.as_deref().filter(|l| !l.is_empty()) {
                Some(last) => format!("{first} {last}"),
                None => first.to_owned(),
            };
        }
        return id_tag(entity.id);
    }

    fallback_id.map_or_else(|| UNKNOWN_SENDER.to_owned(), id_tag)
}

fn id_tag(id: i64) -> String {
    format!("[ID:{id}]")
}

/// Public link to a message, or a bracketed id pair for private chats.
#[must_use]
pub fn message_link(chat_username: Option<&str>, chat_id: i64, message_id: i32) -> String {
    match chat_username {
        Some(username) => format!("https://t.me/{username}/{message_id}"),
        None => format!("[ID:{chat_id}, msgId:{message_id}]"),
    }
}

/// Public link to a chat, or its bracketed id.
#[must_use]
pub fn chat_link(chat_username: Option<&str>, chat_id: i64) -> String {
    match chat_username {
        Some(username) => format!("https://t.me/{username}"),
        None => id_tag(chat_id),
    }
}

/// Builds alert messages from inbound message snapshots.
#[derive(Debug, Clone, Copy)]
pub struct AlertFormatter {
    include_chat_link: bool,
}

impl Default for AlertFormatter {
    fn default() -> Self {
        Self {
            include_chat_link: true,
        }
    }
}

impl AlertFormatter {
    #[must_use]
    pub const fn new(include_chat_link: bool) -> Self {
        Self { include_chat_link }
    }

    /// Renders the alert for `msg`, attributed to `sender_name`.
    ///
    /// ```text
    /// [⚡] @bob | Market
    /// "цена?"
    /// 🔗 https://t.me/market/42
    /// 🌐 https://t.me/market
    /// ```
    #[must_use]
    pub fn format(&self, msg: &InboundMessage, sender_name: &str) -> String {
        let chat = msg.chat.as_ref();
        let username = chat
            .and_then(|c| c.username.as_deref())
            .filter(|u| !u.is_empty());
        let title = chat
            .and_then(|c| c.title.as_deref())
            .filter(|t| !t.is_empty())
            .map_or_else(|| id_tag(msg.chat_id), str::to_owned);
        let text = msg.text.as_deref().unwrap_or_default();

        let mut alert = format!(
            "[⚡] {sender_name} | {title}\n\"{text}\"\n🔗 {}",
            message_link(username, msg.chat_id, msg.id)
        );
        if self.include_chat_link {
            alert.push_str("\n🌐 ");
            alert.push_str(&chat_link(username, msg.chat_id));
        }
        alert
    }
}
