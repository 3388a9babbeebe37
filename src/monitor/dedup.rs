//! Suppression of repeated alerts.
//!
//! A (sender, text) pair that triggered an alert is remembered for a fixed
//! time-to-live. Entries expire on their own; nothing has to evict them.

use std::fmt;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

/// Upper bound on remembered pairs.
const MAX_ENTRIES: u64 = 10_000;

/// Identifies "the same complaint": one sender repeating one text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    sender_id: Option<i64>,
    text: String,
}

impl DedupKey {
    /// Builds a key; the text is lowercased here.
    #[must_use]
    pub fn new(sender_id: Option<i64>, text: &str) -> Self {
        Self {
            sender_id,
            text: text.to_lowercase(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sender_id {
            Some(id) => write!(f, "{id}_{}", self.text),
            None => write!(f, "?_{}", self.text),
        }
    }
}

/// Gives every entry the lifetime stored as its value. Reads and
/// re-insertions never extend it.
struct EntryTtl;

impl Expiry<DedupKey, Duration> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &DedupKey,
        ttl: &Duration,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(*ttl)
    }
}

/// Time-windowed set of recently alerted keys.
#[derive(Clone)]
pub struct DedupStore {
    cache: Cache<DedupKey, Duration>,
    default_ttl: Duration,
}

impl DedupStore {
    /// Creates a store whose entries live for `default_ttl` unless a
    /// different TTL is given when remembering them.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(EntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns `true` while `key` is inside its suppression window.
    pub async fn should_suppress(&self, key: &DedupKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Remembers `key` for `ttl`.
    ///
    /// A key that is still live keeps its original expiry.
    pub async fn remember(&self, key: DedupKey, ttl: Duration) {
        self.cache.entry(key).or_insert(ttl).await;
    }

    /// Atomically checks and remembers `key` with the default TTL.
    ///
    /// Returns `true` if the key was new (the caller should alert) and
    /// `false` if it was already live (the caller should stay silent).
    pub async fn admit(&self, key: DedupKey) -> bool {
        let entry = self.cache.entry(key).or_insert(self.default_ttl).await;
        let fresh = entry.is_fresh();
        if !fresh {
            debug!("Suppressing duplicate alert for {}", entry.key());
        }
        fresh
    }

    /// Number of live entries (approximate until pending tasks run).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_DEDUP_TTL_SECS))
    }
}

impl fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupStore")
            .field("default_ttl", &self.default_ttl)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_occurrence_not_suppressed() {
        let store = DedupStore::new(Duration::from_secs(60));
        let key = DedupKey::new(Some(1), "цена?");

        assert!(!store.should_suppress(&key).await);
        store.remember(key.clone(), Duration::from_secs(60)).await;
        assert!(store.should_suppress(&key).await);
    }

    #[tokio::test]
    async fn test_key_ignores_case() {
        assert_eq!(DedupKey::new(Some(1), "ЦЕНА"), DedupKey::new(Some(1), "цена"));
        assert_ne!(DedupKey::new(Some(1), "цена"), DedupKey::new(Some(2), "цена"));
    }

    #[tokio::test]
    async fn test_admit_is_check_and_set() {
        let store = DedupStore::new(Duration::from_secs(60));

        assert!(store.admit(DedupKey::new(Some(1), "cena")).await);
        assert!(!store.admit(DedupKey::new(Some(1), "cena")).await);

        // Different senders are independent
        assert!(store.admit(DedupKey::new(Some(2), "cena")).await);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let store = DedupStore::new(Duration::from_millis(50));
        let key = DedupKey::new(Some(1), "cena");

        assert!(store.admit(key.clone()).await);
        assert!(store.should_suppress(&key).await);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!store.should_suppress(&key).await);
        assert!(store.admit(key).await);
    }

    #[tokio::test]
    async fn test_remember_does_not_extend_expiry() {
        let store = DedupStore::new(Duration::from_millis(100));
        let key = DedupKey::new(Some(1), "cena");

        store.remember(key.clone(), Duration::from_millis(100)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Re-registering with a long TTL must keep the original deadline.
        store.remember(key.clone(), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!store.should_suppress(&key).await);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let store = DedupStore::new(Duration::from_secs(60));
        let short = DedupKey::new(Some(1), "a");
        let long = DedupKey::new(Some(1), "b");

        store.remember(short.clone(), Duration::from_millis(30)).await;
        store.remember(long.clone(), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!store.should_suppress(&short).await);
        assert!(store.should_suppress(&long).await);
    }

    #[tokio::test]
    async fn test_entry_count() {
        let store = DedupStore::default();
        store.admit(DedupKey::new(Some(1), "a")).await;
        store.admit(DedupKey::new(Some(2), "a")).await;

        store.cache.run_pending_tasks().await;
        assert_eq!(store.len(), 2);
    }
}
