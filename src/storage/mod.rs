use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

pub mod message_log;
pub mod redis;

pub use message_log::MessageLog;
pub use redis::RedisLogStore;

/// A raw message received over a store-level pattern subscription.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Ordered-list and publish/subscribe primitives of the key-value store
/// backing conversation logs.
///
/// Object-safe so the same services run against [`RedisLogStore`] in
/// production and an in-memory double in tests.
#[async_trait]
pub trait LogStore: Send + Sync + std::fmt::Debug {
    /// Appends an entry to the tail of the list at `key`, creating the list
    /// if it does not exist.
    async fn append(&self, key: &str, entry: &str) -> Result<()>;

    /// Reads the whole list at `key`, oldest first. A missing key reads as
    /// an empty list.
    async fn read_range(&self, key: &str) -> Result<Vec<String>>;

    /// Overwrites the entry at `index` (zero-based from the head) in the
    /// list at `key`, but only if that entry still equals `expected`.
    /// Returns whether the write happened; a missing key, an out-of-range
    /// index, and a changed entry all read as a mismatch. The check and the
    /// write are a single atomic store operation, so an index that shifted
    /// after the caller's read never rewrites the wrong entry.
    async fn write_at_if(&self, key: &str, index: usize, expected: &str, entry: &str)
    -> Result<bool>;

    /// Drops all but the newest `max_len` entries of the list at `key`.
    async fn trim_to_latest(&self, key: &str, max_len: i64) -> Result<()>;

    /// Removes `key` and its list entirely. Removing a missing key is not
    /// an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Publishes `payload` on `channel`. Fire-and-forget: delivery only
    /// reaches subscribers connected at publish time.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;

    /// Subscribes to every channel matching `pattern`. The returned
    /// receiver is live before this returns, so no event published
    /// afterwards is missed; a subscription that cannot be established is
    /// an error, never a dead receiver.
    async fn subscribe_pattern(&self, pattern: &str) -> Result<broadcast::Receiver<StoreEvent>>;

    /// Probes store connectivity.
    async fn ping(&self) -> Result<()>;
}
