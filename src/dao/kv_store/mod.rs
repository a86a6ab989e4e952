/// Process-local backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::Duration;

use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;

pub use memory::MemoryKeyValueStore;

/// Minimal key-value contract the canvas and the rate limiter are built on.
///
/// A key whose TTL has elapsed must read back as absent; backends are free to reclaim it
/// lazily.
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, `None` when absent or expired.
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>>;
    /// Write `value` under `key`, replacing any previous value. `ttl = None` never expires.
    fn set(
        &self,
        key: String,
        value: String,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
