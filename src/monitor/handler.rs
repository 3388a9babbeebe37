//! Inbound message handling: match, deduplicate, format, relay.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::dedup::{DedupKey, DedupStore};
use super::format::{AlertFormatter, display_name};
use super::matcher::{KeywordMatcher, within_length};
use crate::config::{Destination, PeerTarget};
use crate::telegram::{InboundMessage, MessagingGateway};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No text, or text longer than the trigger cap.
    Ignored,
    /// No keyword in the text.
    NoMatch,
    /// Same sender and text alerted recently.
    Duplicate,
    /// Alert delivered.
    Sent,
    /// Alert built but the send failed.
    SendFailed,
}

/// Turns keyword hits in incoming messages into alerts.
///
/// Each message is handled on its own; the dedup store is the only state
/// shared between invocations.
pub struct InboundHandler {
    gateway: Arc<dyn MessagingGateway>,
    matcher: KeywordMatcher,
    dedup: DedupStore,
    formatter: AlertFormatter,
    target: Destination,
}

impl InboundHandler {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        matcher: KeywordMatcher,
        dedup: DedupStore,
        formatter: AlertFormatter,
        target: Destination,
    ) -> Self {
        Self {
            gateway,
            matcher,
            dedup,
            formatter,
            target,
        }
    }

    /// Consumes inbound messages until the channel closes.
    ///
    /// Every message is processed in its own task so a slow or failing
    /// alert never holds up the next one.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundMessage>) {
        info!(
            "Keyword monitor started ({} keywords, alerts to {})",
            self.matcher.keywords().len(),
            self.target
        );

        while let Some(msg) = events.recv().await {
            let handler = Arc::clone(&self);
            tokio::spawn(async move {
                handler.handle(msg).await;
            });
        }

        info!("Keyword monitor stopped");
    }

    /// Processes one inbound message.
    pub async fn handle(&self, mut msg: InboundMessage) -> Outcome {
        let Some(text) = msg.text.as_deref() else {
            return Outcome::Ignored;
        };
        if !within_length(text, self.matcher.max_length()) {
            return Outcome::Ignored;
        }

        let lowered = text.to_lowercase();
        if !self.matcher.matches(&lowered) {
            return Outcome::NoMatch;
        }

        debug!("Keyword hit in chat {} (message {})", msg.chat_id, msg.id);

        if msg.chat.is_none() {
            match self.gateway.get_entity(&PeerTarget::ById(msg.chat_id)).await {
                Ok(chat) => msg.chat = Some(chat),
                Err(e) => debug!("Could not look up chat {}: {}", msg.chat_id, e),
            }
        }

        let (sender_name, sender_id) = self.resolve_sender(&msg).await;

        if !self.dedup.admit(DedupKey::new(sender_id, &lowered)).await {
            return Outcome::Duplicate;
        }

        let alert = self.formatter.format(&msg, &sender_name);
        let peer = self.target.peer();

        match self.gateway.send_message(&peer, &alert).await {
            Ok(()) => {
                info!("Alert from {} relayed to {}", sender_name, peer);
                Outcome::Sent
            }
            Err(e) => {
                error!("Failed to send alert to {}: {}", peer, e);
                Outcome::SendFailed
            }
        }
    }

    /// Works out the sender's display name and id.
    ///
    /// A username delivered with the event wins outright. Otherwise the full
    /// profile is fetched; if that fails the name degrades to the bare id.
    async fn resolve_sender(&self, msg: &InboundMessage) -> (String, Option<i64>) {
        let known_id = msg.sender.as_ref().map(|s| s.id).or(msg.sender_id);

        if let Some(sender) = &msg.sender
            && sender.username.as_deref().is_some_and(|u| !u.is_empty())
        {
            return (display_name(Some(sender), None), Some(sender.id));
        }

        let Some(id) = known_id else {
            return (display_name(msg.sender.as_ref(), None), None);
        };

        match self.gateway.get_entity(&PeerTarget::ById(id)).await {
            Ok(full) => (display_name(Some(&full), None), Some(full.id)),
            Err(e) => {
                warn!("Could not look up sender {}: {}", id, e);
                (display_name(None, known_id), known_id)
            }
        }
    }
}

impl std::fmt::Debug for InboundHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundHandler")
            .field("matcher", &self.matcher)
            .field("dedup", &self.dedup)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
