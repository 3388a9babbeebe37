//! The messaging capability the agent is built on.
//!
//! Everything the monitor and the broadcaster need from Telegram goes through
//! [`MessagingGateway`], so both can run against the real client or a fake.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::PeerTarget;

/// Errors reported by a gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Peer not found: {0}")]
    NotFound(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("API invocation error: {0}")]
    Invocation(String),
}

/// One entry of the account's dialog list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogInfo {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub is_group: bool,
    pub is_channel: bool,
    /// Folder the dialog is filed under; `None` for the main list.
    pub folder_id: Option<i32>,
}

impl DialogInfo {
    /// Whether this dialog is a group or channel filed under `folder_id`.
    ///
    /// Dialogs without a folder count as folder `0`, the main list.
    #[must_use]
    pub fn is_broadcast_target(&self, folder_id: i32) -> bool {
        (self.is_group || self.is_channel) && self.folder_id.unwrap_or(0) == folder_id
    }
}

/// Identity details of a user, group or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityInfo {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Set for groups and channels.
    pub title: Option<String>,
}

/// A message read back from a chat's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i32,
    /// Plain-text body; empty for pure media or stickers.
    pub text: String,
    pub sender_id: Option<i64>,
}

impl StoredMessage {
    /// The plain-text body, if there is one.
    #[must_use]
    pub fn plain_text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(self.text.as_str())
    }
}

/// Snapshot of one incoming message event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: i32,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    /// Text as sent; `None` for media without a caption.
    pub text: Option<String>,
    /// Chat details delivered with the event, if the update carried them.
    pub chat: Option<EntityInfo>,
    /// Sender details delivered with the event, if the update carried them.
    pub sender: Option<EntityInfo>,
}

/// Dialogs, history, sending, forwarding and deletion.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Lists every dialog visible to the account.
    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, GatewayError>;

    /// Looks up the identity behind a peer.
    async fn get_entity(&self, peer: &PeerTarget) -> Result<EntityInfo, GatewayError>;

    /// Reads the newest `limit` messages of a chat, newest first.
    async fn get_messages(
        &self,
        peer: &PeerTarget,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, GatewayError>;

    /// Sends a plain-text message.
    async fn send_message(&self, peer: &PeerTarget, text: &str) -> Result<(), GatewayError>;

    /// Forwards messages by reference and returns the ids of the copies
    /// that were created in `destination`.
    async fn forward_messages(
        &self,
        destination: &PeerTarget,
        message_ids: &[i32],
        source: &PeerTarget,
    ) -> Result<Vec<i32>, GatewayError>;

    /// Deletes messages from a chat.
    async fn delete_messages(
        &self,
        peer: &PeerTarget,
        message_ids: &[i32],
    ) -> Result<(), GatewayError>;

    /// Maps a configured target to a peer id.
    ///
    /// Numeric ids are taken as-is. Titles and usernames are looked up in the
    /// dialog list, and usernames that are not among the dialogs are tried
    /// through [`Self::get_entity`]. Returns `Ok(None)` when nothing matched.
    async fn resolve(&self, target: &PeerTarget) -> Result<Option<i64>, GatewayError> {
        match target {
            PeerTarget::ById(id) => Ok(Some(*id)),
            PeerTarget::SavedMessages => Ok(None),
            PeerTarget::ByUsername(_) | PeerTarget::ByTitle(_) => {
                let dialogs = self.list_dialogs().await?;
                if let Some(found) = dialogs
                    .iter()
                    .find(|d| target.matches(d.id, d.username.as_deref(), &d.title))
                {
                    return Ok(Some(found.id));
                }

                if let PeerTarget::ByUsername(_) = target {
                    match self.get_entity(target).await {
                        Ok(entity) => return Ok(Some(entity.id)),
                        Err(e) => debug!("Username lookup for {} failed: {}", target, e),
                    }
                }

                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::testing::FakeGateway;

    #[test]
    fn test_broadcast_target_filter() {
        let mut dialog = DialogInfo {
            id: 1,
            title: "G1".to_owned(),
            username: None,
            is_group: true,
            is_channel: false,
            folder_id: Some(2),
        };
        assert!(dialog.is_broadcast_target(2));
        assert!(!dialog.is_broadcast_target(0));

        dialog.folder_id = None;
        assert!(dialog.is_broadcast_target(0));

        dialog.is_group = false;
        assert!(!dialog.is_broadcast_target(0));
    }

    #[test]
    fn test_plain_text() {
        let sticker = StoredMessage {
            id: 1,
            text: String::new(),
            sender_id: None,
        };
        assert_eq!(sticker.plain_text(), None);

        let promo = StoredMessage {
            id: 2,
            text: "Sale!".to_owned(),
            sender_id: None,
        };
        assert_eq!(promo.plain_text(), Some("Sale!"));
    }

    #[tokio::test]
    async fn test_resolve_by_title_and_username() {
        let gateway = FakeGateway::new();
        gateway.add_group(-100_1, "ORDERS", Some("orders_chat"), None);

        let by_title = PeerTarget::ByTitle("ORDERS".to_owned());
        assert_eq!(gateway.resolve(&by_title).await.unwrap(), Some(-100_1));

        let by_name = PeerTarget::ByUsername("orders_chat".to_owned());
        assert_eq!(gateway.resolve(&by_name).await.unwrap(), Some(-100_1));

        let missing = PeerTarget::ByTitle("Nope".to_owned());
        assert_eq!(gateway.resolve(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_username_outside_dialogs() {
        let gateway = FakeGateway::new();
        gateway.add_user(77, Some("bob"), Some("Bob"), None);

        let by_name = PeerTarget::ByUsername("bob".to_owned());
        assert_eq!(gateway.resolve(&by_name).await.unwrap(), Some(77));
    }
}
