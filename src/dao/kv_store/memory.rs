//! Process-local key-value backend.

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::{
    dao::{kv_store::KeyValueStore, storage::StorageResult},
    state::clock::{Clock, SystemClock},
};

/// Minimum clock time between two sweeps of expired entries.
const SWEEP_INTERVAL_SECS: i64 = 60;

struct Entry {
    value: String,
    expires_at: Option<OffsetDateTime>,
}

/// In-memory store honoring TTLs against an injectable [`Clock`].
///
/// Expired entries are dropped on the read that notices them, and writes sweep the whole
/// map at most once per [`SWEEP_INTERVAL_SECS`] so keys that are never read again do not
/// accumulate.
#[derive(Clone)]
pub struct MemoryKeyValueStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    /// Unix timestamp of the last sweep.
    last_sweep: Arc<AtomicI64>,
}

impl MemoryKeyValueStore {
    /// Empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Build a store whose expiry decisions follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let started = clock.now().unix_timestamp();
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            last_sweep: Arc::new(AtomicI64::new(started)),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            match entry.expires_at {
                Some(deadline) if deadline <= now => {}
                _ => return Some(entry.value.clone()),
            }
        }
        // Guard must be released before removal or the shard lock deadlocks.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at.is_some_and(|d| d <= now));
        None
    }

    fn write(&self, key: String, value: String, ttl: Option<Duration>) {
        let now = self.clock.now();
        self.sweep_if_due(now);
        let expires_at = ttl.map(|ttl| now + ttl);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop every expired entry if the last sweep is old enough. Only one caller wins a
    /// given interval.
    fn sweep_if_due(&self, now: OffsetDateTime) {
        let now_secs = now.unix_timestamp();
        let last = self.last_sweep.load(Ordering::Acquire);
        if now_secs - last < SWEEP_INTERVAL_SECS {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_secs, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.entries
            .retain(|_, entry| entry.expires_at.is_none_or(|deadline| deadline > now));
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let value = self.read(&key);
        Box::pin(async move { Ok(value) })
    }

    fn set(
        &self,
        key: String,
        value: String,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.write(key, value, ttl);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::ManualClock;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("1x1".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn value_without_ttl_never_expires() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKeyValueStore::with_clock(clock.clone());

        store.set("1x1".into(), "#FFFFFF".into(), None).await.unwrap();
        clock.advance(Duration::from_secs(60 * 60 * 24 * 365));

        assert_eq!(
            store.get("1x1".into()).await.unwrap().as_deref(),
            Some("#FFFFFF")
        );
    }

    #[tokio::test]
    async fn value_with_ttl_expires_once_window_elapses() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKeyValueStore::with_clock(clock.clone());

        store
            .set("k".into(), "v".into(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(4_999));
        assert!(store.get("k".into()).await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(store.get("k".into()).await.unwrap().is_none());
        assert!(store.entries.is_empty());
    }

    #[tokio::test]
    async fn writes_reclaim_expired_entries_nobody_reads() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKeyValueStore::with_clock(clock.clone());

        for n in 0..10_000 {
            store
                .set(
                    format!("set_timeout:10.0.{}.{}", n / 256, n % 256),
                    "stamp".into(),
                    Some(Duration::from_secs(20)),
                )
                .await
                .unwrap();
        }
        store.set("0x0".into(), "#000000".into(), None).await.unwrap();
        assert_eq!(store.entries.len(), 10_001);

        clock.advance(Duration::from_secs(60 * 60));
        store.set("1x1".into(), "#FFFFFF".into(), None).await.unwrap();

        assert_eq!(store.entries.len(), 2);
        assert_eq!(store.get("0x0".into()).await.unwrap().as_deref(), Some("#000000"));
    }

    #[tokio::test]
    async fn live_entries_survive_a_sweep() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKeyValueStore::with_clock(clock.clone());

        store
            .set("short".into(), "v".into(), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        store
            .set("long".into(), "v".into(), Some(Duration::from_secs(600)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(90));
        store.set("cell".into(), "v".into(), None).await.unwrap();

        assert_eq!(store.entries.len(), 2);
        assert!(store.get("long".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKeyValueStore::with_clock(clock.clone());

        store
            .set("k".into(), "old".into(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set("k".into(), "new".into(), None).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.get("k".into()).await.unwrap().as_deref(), Some("new"));
    }
}
