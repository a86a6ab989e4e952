//! Per-identity cooldowns stored as TTL records in the key-value store.
//!
//! A record's presence is the whole state: the store's TTL expires it once the cooldown
//! elapses, so there is no cleanup task. The record value is the RFC 3339 timestamp of the
//! accepted action and only serves to compute the remaining wait.

use std::{sync::Arc, time::Duration};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{
        kv_store::KeyValueStore,
        models::{PLACEMENT_RECORD_PREFIX, SNAPSHOT_RECORD_PREFIX, record_key},
        storage::{StorageError, StorageResult},
    },
    state::{canvas::ClientIdentity, clock::Clock, stripes::LockStripes},
};

const IDENTITY_LOCK_STRIPES: usize = 64;

/// Operation classes with independent cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Writing a pixel over the WebSocket.
    Placement,
    /// Reading a grid over HTTP.
    Snapshot,
}

impl OperationKind {
    fn record_prefix(self) -> &'static str {
        match self {
            OperationKind::Placement => PLACEMENT_RECORD_PREFIX,
            OperationKind::Snapshot => SNAPSHOT_RECORD_PREFIX,
        }
    }
}

/// Answer of [`RateLimiter::approve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approval {
    /// Whether the operation may run now.
    pub approved: bool,
    /// Zero when approved.
    pub time_remaining: Duration,
}

impl Approval {
    fn granted() -> Self {
        Self {
            approved: true,
            time_remaining: Duration::ZERO,
        }
    }
}

/// Cooldown bookkeeping for both operation kinds, shared by every connection.
pub struct RateLimiter {
    placement_cooldown: Duration,
    snapshot_cooldown: Duration,
    clock: Arc<dyn Clock>,
    identity_locks: LockStripes,
}

impl RateLimiter {
    /// Cooldowns come from `config`; record timestamps from `clock`.
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            placement_cooldown: config.placement_cooldown,
            snapshot_cooldown: config.snapshot_cooldown,
            clock,
            identity_locks: LockStripes::new(IDENTITY_LOCK_STRIPES),
        }
    }

    /// Configured window for `kind`.
    pub fn cooldown(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Placement => self.placement_cooldown,
            OperationKind::Snapshot => self.snapshot_cooldown,
        }
    }

    /// Check whether `identity` may perform `kind` now.
    pub async fn approve(
        &self,
        store: &dyn KeyValueStore,
        identity: &ClientIdentity,
        kind: OperationKind,
    ) -> StorageResult<Approval> {
        let key = record_key(kind.record_prefix(), identity.as_str());
        let Some(value) = store.get(key.clone()).await? else {
            return Ok(Approval::granted());
        };

        let cooldown = self.cooldown(kind);
        let time_remaining = match OffsetDateTime::parse(&value, &Rfc3339) {
            Ok(since) => {
                let elapsed = Duration::try_from(self.clock.now() - since).unwrap_or_default();
                cooldown.saturating_sub(elapsed)
            }
            Err(err) => {
                warn!(
                    key = %key,
                    error = %err,
                    "unparseable rate-limit record; assuming a full cooldown"
                );
                cooldown
            }
        };

        Ok(Approval {
            approved: false,
            time_remaining,
        })
    }

    /// Start a fresh cooldown for `identity`.
    pub async fn record(
        &self,
        store: &dyn KeyValueStore,
        identity: &ClientIdentity,
        kind: OperationKind,
    ) -> StorageResult<()> {
        let key = record_key(kind.record_prefix(), identity.as_str());
        let stamp = self
            .clock
            .now()
            .format(&Rfc3339)
            .map_err(|err| StorageError::corrupt_value(key.clone(), err.to_string()))?;
        store.set(key, stamp, Some(self.cooldown(kind))).await
    }

    /// Approve and, when approved, record in one step.
    ///
    /// Calls for the same identity are serialized so two concurrent requests cannot both
    /// slip through the same window.
    pub async fn try_acquire(
        &self,
        store: &dyn KeyValueStore,
        identity: &ClientIdentity,
        kind: OperationKind,
    ) -> StorageResult<Approval> {
        let _guard = self.identity_locks.lock(identity).await;
        let approval = self.approve(store, identity, kind).await?;
        if approval.approved {
            self.record(store, identity, kind).await?;
        }
        Ok(approval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::kv_store::MemoryKeyValueStore, state::clock::ManualClock};

    fn limiter_with_clock() -> (RateLimiter, MemoryKeyValueStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = AppConfig {
            placement_cooldown: Duration::from_secs(20),
            snapshot_cooldown: Duration::from_secs(5),
            ..AppConfig::default()
        };
        let limiter = RateLimiter::new(&config, clock.clone());
        let store = MemoryKeyValueStore::with_clock(clock.clone());
        (limiter, store, clock)
    }

    #[tokio::test]
    async fn absent_record_is_approved_with_no_wait() {
        let (limiter, store, _clock) = limiter_with_clock();
        let approval = limiter
            .approve(&store, &ClientIdentity::new("1.2.3.4"), OperationKind::Placement)
            .await
            .unwrap();
        assert_eq!(approval, Approval::granted());
    }

    #[tokio::test]
    async fn placement_window_accepts_denies_then_accepts_again() {
        let (limiter, store, clock) = limiter_with_clock();
        let ip = ClientIdentity::new("1.2.3.4");

        let first = limiter
            .try_acquire(&store, &ip, OperationKind::Placement)
            .await
            .unwrap();
        assert!(first.approved);

        clock.advance(Duration::from_secs(5));
        let second = limiter
            .try_acquire(&store, &ip, OperationKind::Placement)
            .await
            .unwrap();
        assert!(!second.approved);
        assert_eq!(second.time_remaining, Duration::from_secs(15));

        clock.advance(Duration::from_secs(16));
        let third = limiter
            .try_acquire(&store, &ip, OperationKind::Placement)
            .await
            .unwrap();
        assert!(third.approved);
    }

    #[tokio::test]
    async fn kinds_and_identities_are_independent() {
        let (limiter, store, _clock) = limiter_with_clock();
        let a = ClientIdentity::new("10.0.0.1");
        let b = ClientIdentity::new("10.0.0.2");

        limiter
            .record(&store, &a, OperationKind::Snapshot)
            .await
            .unwrap();

        assert!(
            !limiter
                .approve(&store, &a, OperationKind::Snapshot)
                .await
                .unwrap()
                .approved
        );
        assert!(
            limiter
                .approve(&store, &a, OperationKind::Placement)
                .await
                .unwrap()
                .approved
        );
        assert!(
            limiter
                .approve(&store, &b, OperationKind::Snapshot)
                .await
                .unwrap()
                .approved
        );
    }

    #[tokio::test]
    async fn snapshot_record_uses_the_short_cooldown() {
        let (limiter, store, clock) = limiter_with_clock();
        let ip = ClientIdentity::new("::1");
        limiter
            .record(&store, &ip, OperationKind::Snapshot)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(2));
        let denied = limiter
            .approve(&store, &ip, OperationKind::Snapshot)
            .await
            .unwrap();
        assert_eq!(denied.time_remaining, Duration::from_secs(3));

        clock.advance(Duration::from_secs(3));
        assert!(
            limiter
                .approve(&store, &ip, OperationKind::Snapshot)
                .await
                .unwrap()
                .approved
        );
    }

    #[tokio::test]
    async fn unparseable_record_still_denies_with_full_cooldown() {
        let (limiter, store, _clock) = limiter_with_clock();
        let ip = ClientIdentity::new("5.6.7.8");
        store
            .set(
                record_key(PLACEMENT_RECORD_PREFIX, ip.as_str()),
                "yesterday".into(),
                Some(Duration::from_secs(20)),
            )
            .await
            .unwrap();

        let approval = limiter
            .approve(&store, &ip, OperationKind::Placement)
            .await
            .unwrap();
        assert!(!approval.approved);
        assert_eq!(approval.time_remaining, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn concurrent_acquires_from_one_identity_admit_exactly_one() {
        let (limiter, store, _clock) = limiter_with_clock();
        let limiter = Arc::new(limiter);
        let ip = ClientIdentity::new("9.9.9.9");

        let attempts = (0..16).map(|_| {
            let limiter = limiter.clone();
            let store = store.clone();
            let ip = ip.clone();
            tokio::spawn(async move {
                limiter
                    .try_acquire(&store, &ip, OperationKind::Placement)
                    .await
                    .unwrap()
                    .approved
            })
        });

        let mut accepted = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
