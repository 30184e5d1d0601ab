// Shared stubs for the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use feed_autopilot::config::{RunConfig, TimingConfig};
use feed_autopilot::engine::{Collaborators, Orchestrator, StatusListener};
use feed_autopilot::execution::{InteractionCapabilities, Target, TargetRole};
use feed_autopilot::feed::types::CandidateItem;
use feed_autopilot::feed::Discovery;
use feed_autopilot::generator::TemplateGenerator;
use feed_autopilot::store::{DedupStore, KeyValueStore, ManualClock, MemoryStore, AUTHOR_RECORDS};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Every call returns one brand-new candidate from a new author.
#[derive(Default)]
pub struct FreshFeed {
    pub calls: Arc<AtomicU32>,
}

#[async_trait]
impl Discovery for FreshFeed {
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![CandidateItem::new(
            format!("urn:fresh:{}", n),
            format!("author-{}", n),
            "Excited to share our quarterly results",
        )])
    }

    async fn load_more(&mut self) -> Result<bool> {
        Ok(true)
    }
}

/// Always the same page; scrolling yields nothing more.
pub struct FixedFeed(pub Vec<CandidateItem>);

#[async_trait]
impl Discovery for FixedFeed {
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>> {
        Ok(self.0.clone())
    }

    async fn load_more(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// Shows each batch in turn. `load_more` moves to the next batch and
/// returns false once the last one is showing.
pub struct BatchFeed {
    batches: VecDeque<Vec<CandidateItem>>,
}

impl BatchFeed {
    pub fn new(batches: Vec<Vec<CandidateItem>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

#[async_trait]
impl Discovery for BatchFeed {
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>> {
        Ok(self.batches.front().cloned().unwrap_or_default())
    }

    async fn load_more(&mut self) -> Result<bool> {
        if self.batches.len() <= 1 {
            return Ok(false);
        }
        self.batches.pop_front();
        Ok(true)
    }
}

/// Fails the first `failures` discoveries, then behaves like `FreshFeed`.
pub struct FlakyFeed {
    pub failures: u32,
    pub inner: FreshFeed,
}

#[async_trait]
impl Discovery for FlakyFeed {
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>> {
        if self.failures > 0 {
            self.failures -= 1;
            anyhow::bail!("page not ready");
        }
        self.inner.find_candidates().await
    }

    async fn load_more(&mut self) -> Result<bool> {
        Ok(true)
    }
}

/// Page whose elements can be made to disappear or break.
#[derive(Default)]
pub struct StubPage {
    pub missing: Vec<TargetRole>,
    pub fail_clicks: bool,
    pub clicks: AtomicU32,
}

#[async_trait]
impl InteractionCapabilities for StubPage {
    async fn locate(&self, candidate: &CandidateItem, role: TargetRole) -> Result<Option<Target>> {
        if self.missing.contains(&role) {
            return Ok(None);
        }
        Ok(Some(Target(format!("{}/{}", candidate.item_key, role))))
    }

    async fn click(&self, _target: &Target) -> Result<()> {
        if self.fail_clicks {
            anyhow::bail!("element detached from DOM");
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn focus(&self, _target: &Target) -> Result<()> {
        Ok(())
    }

    async fn type_into(&self, _target: &Target, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Memory store whose next `failures` author-record writes fail.
pub struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn failing_author_writes(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        if collection == AUTHOR_RECORDS
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            anyhow::bail!("transient write failure");
        }
        self.inner.set(collection, key, value).await
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool> {
        self.inner.remove(collection, key).await
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        self.inner.keys(collection).await
    }
}

#[derive(Default)]
pub struct CollectStatus(pub Mutex<Vec<String>>);

impl CollectStatus {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusListener for CollectStatus {
    fn on_status(&self, message: &str, _progress_percent: Option<u8>) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
    ))
}

pub fn store() -> Arc<DedupStore> {
    Arc::new(DedupStore::new(Arc::new(MemoryStore::new()), clock()))
}

pub fn store_on(kv: Arc<dyn KeyValueStore>) -> Arc<DedupStore> {
    Arc::new(DedupStore::new(kv, clock()))
}

pub fn run_config(target: u32) -> RunConfig {
    RunConfig {
        target_action_count: target,
        duplicate_author_window_hours: 24.0,
        per_action_delay_seconds: 1.0,
        scroll_window_seconds: 2.0,
        max_actions_per_minute: 100,
        ..RunConfig::default()
    }
}

pub fn timing() -> TimingConfig {
    TimingConfig {
        seed: Some(7),
        ..TimingConfig::default()
    }
}

pub fn orchestrator(
    discovery: Box<dyn Discovery>,
    interaction: Arc<dyn InteractionCapabilities>,
    store: Arc<DedupStore>,
    config: RunConfig,
) -> Arc<Orchestrator> {
    let generator = TemplateGenerator::with_seed(vec!["Congrats, well deserved!".to_string()], 3);
    Arc::new(
        Orchestrator::new(
            config,
            &timing(),
            Collaborators {
                discovery,
                interaction,
                generator: Arc::new(generator),
                store,
            },
        )
        .unwrap(),
    )
}
