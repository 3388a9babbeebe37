//! Broadcast scheduler runner.
//!
//! Every cycle walks the same steps:
//! 1. List dialogs and keep the groups and channels in the target folder
//! 2. Read the newest message in Saved Messages
//! 3. Pick the group under the rotation cursor
//! 4. Forward the message there (plain-text resend if forwarding fails)
//! 5. Report the forward to the log group
//! 6. Schedule deletion of the forwarded copy
//! 7. Advance the cursor and sleep until the next cycle
//!
//! An empty folder or empty Saved Messages backs off without touching the
//! cursor. Any gateway failure ends the cycle early and is followed by a
//! short cooldown; the loop itself never stops on an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::cleanup::DeletionQueue;
use super::{CycleOutcome, ForwardRecord, RotationCursor};
use crate::config::{AgentSettings, Destination, PeerTarget};
use crate::telegram::{DialogInfo, GatewayError, MessagingGateway};

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Cut the current sleep short and run the next cycle now.
    RunNow,
    /// Stop the scheduler.
    Shutdown,
}

/// Sleeps between and inside broadcast cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastTiming {
    /// Pause after a cycle that used a group.
    pub interval: Duration,
    /// Lifetime of a forwarded copy before it is deleted.
    pub delete_after: Duration,
    /// Pause when there is nothing to broadcast or nowhere to send it.
    pub empty_backoff: Duration,
    /// Pause after a failed cycle.
    pub error_cooldown: Duration,
}

impl Default for BroadcastTiming {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

impl BroadcastTiming {
    #[must_use]
    pub const fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            interval: settings.broadcast_interval(),
            delete_after: settings.delete_after(),
            empty_backoff: settings.empty_backoff(),
            error_cooldown: settings.error_cooldown(),
        }
    }

    /// How long to wait after a cycle ended with `outcome`.
    #[must_use]
    pub const fn pause_after(&self, outcome: &CycleOutcome) -> Duration {
        if outcome.used_group() {
            self.interval
        } else {
            self.empty_backoff
        }
    }
}

/// Rebroadcasts the newest saved message to one folder group per cycle.
pub struct BroadcastScheduler {
    gateway: Arc<dyn MessagingGateway>,

    /// Folder whose groups take part in the rotation.
    folder_id: i32,

    /// Where forward confirmations go.
    log: Option<Destination>,

    timing: BroadcastTiming,
    cursor: RotationCursor,
    deletions: DeletionQueue,
}

impl BroadcastScheduler {
    /// Creates a new broadcast scheduler.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        folder_id: i32,
        log: Option<Destination>,
        timing: BroadcastTiming,
    ) -> Self {
        Self {
            deletions: DeletionQueue::new(Arc::clone(&gateway)),
            gateway,
            folder_id,
            log,
            timing,
            cursor: RotationCursor::new(),
        }
    }

    /// Starts the rotation at a given position.
    #[must_use]
    pub const fn with_cursor(mut self, cursor: RotationCursor) -> Self {
        self.cursor = cursor;
        self
    }

    #[must_use]
    pub const fn cursor(&self) -> RotationCursor {
        self.cursor
    }

    /// Number of forwarded copies still waiting for deletion.
    #[must_use]
    pub fn pending_deletions(&self) -> usize {
        self.deletions.pending()
    }

    /// Runs the scheduler loop until shut down.
    ///
    /// On shutdown, pending deletions are carried out before returning.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        info!("Broadcast scheduler started (folder {})", self.folder_id);

        loop {
            let pause = match self.run_cycle().await {
                Ok(outcome) => {
                    debug!("Broadcast cycle finished: {:?}", outcome);
                    if outcome.used_group() {
                        info!("⏱ Next group in {:?}", self.timing.interval);
                    }
                    self.timing.pause_after(&outcome)
                }
                Err(e) => {
                    error!("Broadcast cycle failed: {}", e);
                    self.timing.error_cooldown
                }
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::RunNow) => {
                            debug!("Received run-now message");
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }

        let pending = self.deletions.pending();
        if pending > 0 {
            info!("Deleting {} forwarded message(s) before exit", pending);
        }
        self.deletions.flush().await;
    }

    /// Runs one broadcast cycle.
    ///
    /// The cursor advances whenever a group was picked, whether or not the
    /// delivery itself succeeded.
    ///
    /// # Errors
    ///
    /// Returns the gateway error that cut the cycle short.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, GatewayError> {
        let groups = self.fetch_groups().await?;
        if groups.is_empty() {
            warn!("⚠ No groups in folder {}", self.folder_id);
            return Ok(CycleOutcome::NoGroups);
        }

        let saved = self
            .gateway
            .get_messages(&PeerTarget::SavedMessages, 1)
            .await?;
        let Some(message) = saved.into_iter().next() else {
            warn!("⚠ No messages in Saved Messages");
            return Ok(CycleOutcome::NoSavedMessage);
        };

        let Some(group) = self.cursor.select(&groups).cloned() else {
            return Ok(CycleOutcome::NoGroups);
        };
        let peer = PeerTarget::ById(group.id);

        let outcome = match self
            .gateway
            .forward_messages(&peer, &[message.id], &PeerTarget::SavedMessages)
            .await
        {
            Ok(copies) => {
                let copy_id = copies.first().copied();
                self.report(&group, message.id).await;

                if let Some(copy_id) = copy_id {
                    self.deletions.schedule(
                        ForwardRecord {
                            group_id: group.id,
                            group_title: group.title.clone(),
                            message_id: copy_id,
                        },
                        self.timing.delete_after,
                    );
                }

                CycleOutcome::Forwarded {
                    group_title: group.title,
                    message_id: message.id,
                    copy_id,
                }
            }
            Err(e) => {
                error!("Failed to forward to \"{}\": {}", group.title, e);

                match message.plain_text() {
                    Some(text) => {
                        self.gateway.send_message(&peer, text).await?;
                        info!("Sent plain-text copy to \"{}\"", group.title);
                        CycleOutcome::FallbackSent {
                            group_title: group.title,
                        }
                    }
                    None => {
                        warn!(
                            "Message {} has no text to fall back to, skipping \"{}\"",
                            message.id, group.title
                        );
                        CycleOutcome::Skipped {
                            group_title: group.title,
                        }
                    }
                }
            }
        };

        self.cursor.advance();
        Ok(outcome)
    }

    /// Lists the groups and channels filed under the target folder.
    async fn fetch_groups(&self) -> Result<Vec<DialogInfo>, GatewayError> {
        let dialogs = self.gateway.list_dialogs().await?;
        Ok(dialogs
            .into_iter()
            .filter(|d| d.is_broadcast_target(self.folder_id))
            .collect())
    }

    /// Sends the forward confirmation to the log group. Failures are logged
    /// and otherwise ignored.
    async fn report(&self, group: &DialogInfo, message_id: i32) {
        let Some(log) = &self.log else {
            debug!("No log group configured, skipping confirmation");
            return;
        };

        let text = format!(
            "✅ Forwarded message to \"{}\"\nMessage ID: {message_id}",
            group.title
        );
        let peer = log.peer();
        if let Err(e) = self.gateway.send_message(&peer, &text).await {
            error!("Failed to send confirmation to {}: {}", peer, e);
        }
    }
}

impl std::fmt::Debug for BroadcastScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastScheduler")
            .field("folder_id", &self.folder_id)
            .field("log", &self.log)
            .field("timing", &self.timing)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
