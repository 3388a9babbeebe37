//! Delayed deletion of forwarded broadcasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ForwardRecord;
use crate::config::PeerTarget;
use crate::telegram::MessagingGateway;

/// One-shot deletion timers.
///
/// Each scheduled deletion runs on its own task. [`Self::flush`] makes every
/// pending deletion fire immediately and waits for all of them, so nothing is
/// left dangling at shutdown.
pub struct DeletionQueue {
    gateway: Arc<dyn MessagingGateway>,
    tasks: JoinSet<()>,
    flush: CancellationToken,
}

impl DeletionQueue {
    #[must_use]
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            gateway,
            tasks: JoinSet::new(),
            flush: CancellationToken::new(),
        }
    }

    /// Deletes `record` from its group after `delay`.
    pub fn schedule(&mut self, record: ForwardRecord, delay: Duration) {
        while self.tasks.try_join_next().is_some() {}

        debug!(
            "Deleting message {} from \"{}\" in {:?}",
            record.message_id, record.group_title, delay
        );

        let gateway = Arc::clone(&self.gateway);
        let flush = self.flush.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = flush.cancelled() => {}
            }
            delete(gateway.as_ref(), &record).await;
        });
    }

    /// Number of deletions not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Runs every pending deletion now and waits for them to finish.
    pub async fn flush(&mut self) {
        let token = std::mem::replace(&mut self.flush, CancellationToken::new());
        token.cancel();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Deletion task ended abnormally: {}", e);
            }
        }
    }
}

async fn delete(gateway: &dyn MessagingGateway, record: &ForwardRecord) {
    match gateway
        .delete_messages(&PeerTarget::ById(record.group_id), &[record.message_id])
        .await
    {
        Ok(()) => info!("🗑 Message deleted from \"{}\"", record.group_title),
        Err(e) => error!(
            "Failed to delete message {} from \"{}\": {}",
            record.message_id, record.group_title, e
        ),
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::telegram::testing::FakeGateway;

    fn record(message_id: i32) -> ForwardRecord {
        ForwardRecord {
            group_id: -100_1,
            group_title: "G1".to_owned(),
            message_id,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_after_delay() {
        let gateway = Arc::new(FakeGateway::new());
        let mut queue = DeletionQueue::new(Arc::clone(&gateway) as Arc<dyn MessagingGateway>);

        queue.schedule(record(5), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(gateway.deleted().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.deleted(), vec![(PeerTarget::ById(-100_1), vec![5])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_pending_deletions_now() {
        let gateway = Arc::new(FakeGateway::new());
        let mut queue = DeletionQueue::new(Arc::clone(&gateway) as Arc<dyn MessagingGateway>);

        queue.schedule(record(5), Duration::from_secs(3600));
        queue.schedule(record(6), Duration::from_secs(3600));
        assert_eq!(queue.pending(), 2);

        queue.flush().await;
        assert_eq!(queue.pending(), 0);
        assert_eq!(gateway.deleted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deletion_is_swallowed() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.fail_delete.store(true, Ordering::SeqCst);
        let mut queue = DeletionQueue::new(Arc::clone(&gateway) as Arc<dyn MessagingGateway>);

        queue.schedule(record(5), Duration::from_secs(1));
        queue.flush().await;
        assert!(gateway.deleted().is_empty());
    }
}
