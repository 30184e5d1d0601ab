//! Durable dedup state: which items were acted on, when each author was last
//! engaged, named counters and pending-action markers.

use super::{Clock, KeyValueStore, AUTHOR_RECORDS, COUNTERS, PENDING_ACTIONS, SEEN_ITEMS};
use crate::engine::timing::hours_span;
use crate::error::{EngineError, EngineResult};
use crate::feed::types::CandidateItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SKIPPED_DUPLICATE: &str = "skipped-duplicate";
pub const SKIPPED_RECENT_AUTHOR: &str = "skipped-recent-author";
pub const SKIPPED_TIME_FILTER: &str = "skipped-time-filter";
pub const SKIPPED_KEYWORD: &str = "skipped-keyword";
pub const TOTAL_SUCCEEDED: &str = "total-succeeded";
pub const TOTAL_SOFT_FAILED: &str = "total-soft-failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub last_action_at: DateTime<Utc>,
    pub action_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub item_key: String,
    #[serde(default)]
    pub author_key: String,
    pub marked_at: DateTime<Utc>,
}

/// Snapshot of the named counters. Missing names read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters(BTreeMap<String, u64>);

impl Counters {
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct DedupStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

fn store_err(e: anyhow::Error) -> EngineError {
    EngineError::Store(format!("{:#}", e))
}

impl DedupStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn has_acted_on_item(&self, item_key: &str) -> EngineResult<bool> {
        let found = self.kv.get(SEEN_ITEMS, item_key).await.map_err(store_err)?;
        Ok(found.is_some())
    }

    /// Add to the seen set. The first write wins; repeats are no-ops.
    pub async fn record_item_acted(&self, item_key: &str) -> EngineResult<()> {
        if self.has_acted_on_item(item_key).await? {
            return Ok(());
        }
        let entry = json!({ "acted_at": self.clock.now() });
        self.kv
            .set(SEEN_ITEMS, item_key, entry)
            .await
            .map_err(store_err)
    }

    pub async fn author_record(&self, author_key: &str) -> EngineResult<Option<DedupRecord>> {
        let raw = self
            .kv
            .get(AUTHOR_RECORDS, author_key)
            .await
            .map_err(store_err)?;
        match raw {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// True iff the author has a record and `now - last_action_at < window_hours`.
    pub async fn has_acted_on_author_recently(
        &self,
        author_key: &str,
        window_hours: f64,
    ) -> EngineResult<bool> {
        let Some(record) = self.author_record(author_key).await? else {
            return Ok(false);
        };
        let elapsed = self.clock.now() - record.last_action_at;
        Ok(elapsed < hours_span(window_hours))
    }

    /// Create with count 1, or bump the count and refresh the timestamp.
    pub async fn record_author_action(&self, author_key: &str) -> EngineResult<DedupRecord> {
        let now = self.clock.now();
        let record = match self.author_record(author_key).await? {
            Some(existing) => DedupRecord {
                last_action_at: now,
                action_count: existing.action_count + 1,
            },
            None => DedupRecord {
                last_action_at: now,
                action_count: 1,
            },
        };
        self.kv
            .set(AUTHOR_RECORDS, author_key, serde_json::to_value(&record)?)
            .await
            .map_err(store_err)?;
        Ok(record)
    }

    /// Commit a successful action: author record, seen set, success counter.
    ///
    /// Returns false when the item was already committed, in which case nothing
    /// is written again. The author is written before the item so a partial
    /// commit can over-count an author but never lose the cool-down.
    pub async fn commit_success(&self, candidate: &CandidateItem) -> EngineResult<bool> {
        if self.has_acted_on_item(&candidate.item_key).await? {
            tracing::debug!(item = %candidate.item_key, "success already committed");
            return Ok(false);
        }
        self.record_author_action(&candidate.author_key).await?;
        self.record_item_acted(&candidate.item_key).await?;
        self.increment_counter(TOTAL_SUCCEEDED).await?;
        Ok(true)
    }

    pub async fn increment_counter(&self, name: &str) -> EngineResult<u64> {
        let current = self
            .kv
            .get(COUNTERS, name)
            .await
            .map_err(store_err)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let next = current + 1;
        self.kv
            .set(COUNTERS, name, Value::from(next))
            .await
            .map_err(store_err)?;
        Ok(next)
    }

    pub async fn get_counters(&self) -> EngineResult<Counters> {
        let mut counters = BTreeMap::new();
        for name in self.kv.keys(COUNTERS).await.map_err(store_err)? {
            let value = self
                .kv
                .get(COUNTERS, &name)
                .await
                .map_err(store_err)?
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            counters.insert(name, value);
        }
        Ok(Counters(counters))
    }

    /// Operator reset. The only way counters go down.
    pub async fn reset_counters(&self) -> EngineResult<()> {
        for name in self.kv.keys(COUNTERS).await.map_err(store_err)? {
            self.kv.remove(COUNTERS, &name).await.map_err(store_err)?;
        }
        tracing::info!("counters reset");
        Ok(())
    }

    /// Drop author records whose last action predates `retention_days`.
    /// The seen set is never swept.
    pub async fn sweep_older_than(&self, retention_days: u32) -> EngineResult<usize> {
        let horizon = self.clock.now() - chrono::Duration::days(retention_days as i64);
        let mut removed = 0;
        for author in self.kv.keys(AUTHOR_RECORDS).await.map_err(store_err)? {
            let stale = match self.author_record(&author).await {
                Ok(Some(record)) => record.last_action_at < horizon,
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(author = %author, error = %e, "dropping unreadable author record");
                    true
                }
            };
            if stale && self.kv.remove(AUTHOR_RECORDS, &author).await.map_err(store_err)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, retention_days, "swept stale author records");
        }
        Ok(removed)
    }

    pub async fn mark_pending(&self, candidate: &CandidateItem) -> EngineResult<()> {
        let marker = PendingAction {
            item_key: candidate.item_key.clone(),
            author_key: candidate.author_key.clone(),
            marked_at: self.clock.now(),
        };
        self.kv
            .set(PENDING_ACTIONS, &candidate.item_key, serde_json::to_value(&marker)?)
            .await
            .map_err(store_err)
    }

    pub async fn is_pending(&self, item_key: &str) -> EngineResult<bool> {
        let found = self
            .kv
            .get(PENDING_ACTIONS, item_key)
            .await
            .map_err(store_err)?;
        Ok(found.is_some())
    }

    /// Treat an unconfirmed action as done: refresh the author's cool-down,
    /// add the item to the seen set, then drop the marker.
    pub async fn settle_pending(&self, marker: &PendingAction) -> EngineResult<()> {
        if !self.has_acted_on_item(&marker.item_key).await? {
            if !marker.author_key.is_empty() {
                self.record_author_action(&marker.author_key).await?;
            }
            self.record_item_acted(&marker.item_key).await?;
        }
        self.clear_pending(&marker.item_key).await
    }

    pub async fn clear_pending(&self, item_key: &str) -> EngineResult<()> {
        self.kv
            .remove(PENDING_ACTIONS, item_key)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub async fn pending_items(&self) -> EngineResult<Vec<PendingAction>> {
        let mut pending = Vec::new();
        for key in self.kv.keys(PENDING_ACTIONS).await.map_err(store_err)? {
            if let Some(value) = self.kv.get(PENDING_ACTIONS, &key).await.map_err(store_err)? {
                pending.push(serde_json::from_value(value)?);
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    fn setup() -> (DedupStore, Arc<ManualClock>, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let store = DedupStore::new(kv.clone(), clock.clone());
        (store, clock, kv)
    }

    #[tokio::test]
    async fn test_record_item_is_idempotent() {
        let (store, _, _) = setup();
        assert!(!store.has_acted_on_item("urn:1").await.unwrap());

        store.record_item_acted("urn:1").await.unwrap();
        let once = store.has_acted_on_item("urn:1").await.unwrap();
        store.record_item_acted("urn:1").await.unwrap();
        let twice = store.has_acted_on_item("urn:1").await.unwrap();

        assert!(once);
        assert_eq!(once, twice);
        assert!(!store.has_acted_on_item("urn:2").await.unwrap());
    }

    #[tokio::test]
    async fn test_author_upsert_counts() {
        let (store, clock, _) = setup();
        let first = store.record_author_action("alice").await.unwrap();
        assert_eq!(first.action_count, 1);
        assert_eq!(first.last_action_at, t0());

        clock.advance(chrono::Duration::minutes(30));
        let second = store.record_author_action("alice").await.unwrap();
        assert_eq!(second.action_count, 2);
        assert_eq!(second.last_action_at, t0() + chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_author_window_boundary() {
        let (store, clock, _) = setup();
        store.record_author_action("bob").await.unwrap();

        assert!(store.has_acted_on_author_recently("bob", 6.0).await.unwrap());
        clock.set(t0() + chrono::Duration::hours(6) - chrono::Duration::milliseconds(1));
        assert!(store.has_acted_on_author_recently("bob", 6.0).await.unwrap());
        clock.set(t0() + chrono::Duration::hours(6));
        assert!(!store.has_acted_on_author_recently("bob", 6.0).await.unwrap());
        clock.set(t0() + chrono::Duration::hours(7));
        assert!(!store.has_acted_on_author_recently("bob", 6.0).await.unwrap());

        assert!(!store.has_acted_on_author_recently("nobody", 6.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_success_is_retry_safe() {
        let (store, _, _) = setup();
        let item = CandidateItem::new("urn:7", "carol", "great post");

        assert!(store.commit_success(&item).await.unwrap());
        assert!(!store.commit_success(&item).await.unwrap());

        let record = store.author_record("carol").await.unwrap().unwrap();
        assert_eq!(record.action_count, 1);
        assert!(store.has_acted_on_item("urn:7").await.unwrap());
        assert_eq!(store.get_counters().await.unwrap().get(TOTAL_SUCCEEDED), 1);
    }

    #[tokio::test]
    async fn test_counters_increment_and_reset() {
        let (store, _, _) = setup();
        assert_eq!(store.increment_counter(SKIPPED_DUPLICATE).await.unwrap(), 1);
        assert_eq!(store.increment_counter(SKIPPED_DUPLICATE).await.unwrap(), 2);
        store.increment_counter(SKIPPED_RECENT_AUTHOR).await.unwrap();

        let counters = store.get_counters().await.unwrap();
        assert_eq!(counters.get(SKIPPED_DUPLICATE), 2);
        assert_eq!(counters.get(SKIPPED_RECENT_AUTHOR), 1);
        assert_eq!(counters.get(SKIPPED_TIME_FILTER), 0);

        store.reset_counters().await.unwrap();
        assert!(store.get_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_old_authors_but_keeps_seen_items() {
        let (store, clock, _) = setup();
        store.record_author_action("old").await.unwrap();
        store.record_item_acted("urn:old").await.unwrap();

        clock.advance(chrono::Duration::days(20));
        store.record_author_action("fresh").await.unwrap();

        clock.advance(chrono::Duration::days(15));
        let removed = store.sweep_older_than(30).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.author_record("old").await.unwrap().is_none());
        assert!(store.author_record("fresh").await.unwrap().is_some());
        assert!(store.has_acted_on_item("urn:old").await.unwrap());
        assert_eq!(store.sweep_older_than(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_markers() {
        let (store, _, _) = setup();
        let item = CandidateItem::new("urn:9", "dana", "post");
        store.mark_pending(&item).await.unwrap();
        store.mark_pending(&item).await.unwrap();
        assert!(store.is_pending("urn:9").await.unwrap());

        let pending = store.pending_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].item_key, "urn:9");
        assert_eq!(pending[0].author_key, "dana");
        assert_eq!(pending[0].marked_at, t0());

        store.clear_pending("urn:9").await.unwrap();
        store.clear_pending("urn:9").await.unwrap();
        assert!(store.pending_items().await.unwrap().is_empty());
        assert!(!store.is_pending("urn:9").await.unwrap());
    }

    #[tokio::test]
    async fn test_settle_pending_refreshes_author_and_seen_set() {
        let (store, clock, _) = setup();
        let item = CandidateItem::new("urn:10", "eve", "post");
        store.mark_pending(&item).await.unwrap();
        clock.advance(chrono::Duration::hours(1));

        let marker = store.pending_items().await.unwrap().remove(0);
        store.settle_pending(&marker).await.unwrap();
        store.settle_pending(&marker).await.unwrap();

        assert!(store.has_acted_on_item("urn:10").await.unwrap());
        let record = store.author_record("eve").await.unwrap().unwrap();
        assert_eq!(record.action_count, 1);
        assert!(store.pending_items().await.unwrap().is_empty());
        assert_eq!(store.get_counters().await.unwrap().get(TOTAL_SUCCEEDED), 0);
    }

    #[test]
    fn test_marker_without_author_still_parses() {
        let marker: PendingAction = serde_json::from_value(serde_json::json!({
            "item_key": "urn:old",
            "marked_at": "2026-05-10T09:00:00Z"
        }))
        .unwrap();
        assert!(marker.author_key.is_empty());
    }

    #[tokio::test]
    async fn test_shared_backend_between_instances() {
        let (store, clock, kv) = setup();
        let other = DedupStore::new(kv, clock);
        store.record_item_acted("urn:shared").await.unwrap();
        assert!(other.has_acted_on_item("urn:shared").await.unwrap());
    }
}
