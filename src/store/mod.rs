pub mod clock;
pub mod dedup;
pub mod file;
pub mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{Counters, DedupRecord, DedupStore, PendingAction};
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Collection holding item keys that were successfully acted on.
pub const SEEN_ITEMS: &str = "seen-items";
/// Collection of per-author `DedupRecord`s.
pub const AUTHOR_RECORDS: &str = "author-records";
pub const COUNTERS: &str = "counters";
/// Items whose interaction started but whose outcome was not yet committed.
pub const PENDING_ACTIONS: &str = "pending-actions";

/// Minimal durable key-value collaborator, organised in named collections.
///
/// Implementations must tolerate the same write arriving more than once;
/// no cross-process locking is assumed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;
    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()>;
    /// Returns true if the key existed.
    async fn remove(&self, collection: &str, key: &str) -> Result<bool>;
    async fn keys(&self, collection: &str) -> Result<Vec<String>>;
}
