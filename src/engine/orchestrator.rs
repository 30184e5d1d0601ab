//! The automation loop: discover → filter → execute → commit → pace.
//!
//! One run at a time per orchestrator. `start()` drives the loop on the
//! caller's task; share the orchestrator as `Arc<Orchestrator>` to call
//! `stop()`/`status()` from elsewhere.

use super::filter::FilterPipeline;
use super::state::{RunState, StopReason};
use super::status::{StatusHub, StatusListener};
use super::timing::{
    burst_protection_delay, progressive_delay, ActionWindow, TimingController,
};
use crate::config::{RunConfig, TimingConfig};
use crate::error::{EngineError, EngineResult};
use crate::execution::executor::{ActionExecutor, ActionOutcome};
use crate::execution::InteractionCapabilities;
use crate::feed::types::CandidateItem;
use crate::feed::Discovery;
use crate::generator::ContentGenerator;
use crate::store::dedup::{DedupStore, TOTAL_SOFT_FAILED};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// External capabilities a run needs.
pub struct Collaborators {
    pub discovery: Box<dyn Discovery>,
    pub interaction: Arc<dyn InteractionCapabilities>,
    pub generator: Arc<dyn ContentGenerator>,
    pub store: Arc<DedupStore>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub success_count: u32,
    pub total_attempted: u32,
    pub soft_failures: u32,
    pub total_errors: u64,
}

/// Outcome of handling one candidate.
enum Step {
    /// Pause this long before the next candidate.
    Next(Duration),
    Abort(StopReason),
}

pub struct Orchestrator {
    config: Mutex<RunConfig>,
    discovery: tokio::sync::Mutex<Box<dyn Discovery>>,
    timing: tokio::sync::Mutex<TimingController>,
    window: tokio::sync::Mutex<ActionWindow>,
    executor: ActionExecutor,
    filter: FilterPipeline,
    store: Arc<DedupStore>,
    status: StatusHub,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    state_tx: watch::Sender<RunState>,
}

/// Attempts at recording a success before giving up on it for this run.
const COMMIT_ATTEMPTS: u32 = 3;

/// Ends a run even if the loop unwinds: consumes any stop request, then
/// clears the running flag.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    stop_tx: &'a watch::Sender<bool>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.stop_tx.send_replace(false);
        self.running.store(false, Ordering::SeqCst);
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        timing: &TimingConfig,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        config.validate()?;
        let Collaborators {
            discovery,
            interaction,
            generator,
            store,
        } = collaborators;
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(RunState::new());
        Ok(Self {
            config: Mutex::new(config),
            discovery: tokio::sync::Mutex::new(discovery),
            timing: tokio::sync::Mutex::new(TimingController::from_config(timing)),
            window: tokio::sync::Mutex::new(ActionWindow::new()),
            executor: ActionExecutor::new(interaction, generator, timing.clone()),
            filter: FilterPipeline::new(store.clone()),
            store,
            status: StatusHub::new(),
            running: AtomicBool::new(false),
            stop_tx,
            state_tx,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.status.subscribe(listener);
    }

    pub fn config(&self) -> RunConfig {
        match self.config.lock() {
            Ok(c) => c.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the run config. Rejected while a run is in progress.
    pub fn update_config(&self, config: RunConfig) -> EngineResult<()> {
        if self.is_running() {
            return Err(EngineError::ConfigLocked);
        }
        config.validate()?;
        let mut current = self
            .config
            .lock()
            .map_err(|_| EngineError::Store("config lock poisoned".to_string()))?;
        *current = config;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the current run state.
    pub fn status(&self) -> RunState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<DedupStore> {
        &self.store
    }

    /// Ask the loop to exit at its next checkpoint. In-flight interactions finish.
    /// A request made before the loop begins ends the next run immediately.
    pub fn stop(&self) {
        if self.is_running() {
            tracing::info!("stop requested");
        }
        self.stop_tx.send_replace(true);
    }

    /// Run until the target is reached, `stop()` is called, discovery runs
    /// dry or the consecutive-error limit trips.
    pub async fn start(&self) -> EngineResult<RunSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }
        let _guard = RunGuard {
            running: &self.running,
            stop_tx: &self.stop_tx,
        };

        let config = self.config();
        let started_at = self.store.now();
        self.state_tx.send_modify(|s| s.begin(started_at));
        tracing::info!(
            target_actions = config.target_action_count,
            author_window_h = config.duplicate_author_window_hours,
            time_filter = config.time_filter_enabled,
            "automation run started"
        );
        self.emit("Automation started", Some(0));

        let reason = self.run_loop(&config).await;

        self.state_tx.send_modify(|s| s.finish(reason));
        let state = self.status();
        let summary = RunSummary {
            stop_reason: reason,
            success_count: state.success_count,
            total_attempted: state.total_attempted,
            soft_failures: state.soft_failures,
            total_errors: state.total_errors,
        };
        tracing::info!(
            reason = ?reason,
            succeeded = summary.success_count,
            attempted = summary.total_attempted,
            errors = summary.total_errors,
            "automation run finished"
        );
        self.emit(
            &format!(
                "Automation finished ({:?}): {} of {} comments posted",
                reason, summary.success_count, config.target_action_count
            ),
            Some(state.progress_percent(config.target_action_count)),
        );
        Ok(summary)
    }

    async fn run_loop(&self, config: &RunConfig) -> StopReason {
        let mut discovery = self.discovery.lock().await;
        let mut timing = self.timing.lock().await;
        let mut window = self.window.lock().await;

        if let Some(reason) = self.recover_pending(config).await {
            return reason;
        }

        let scroll_base = seconds(config.scroll_window_seconds);
        // Key of the item just before the cursor, to tell a grown page from a new one.
        let mut last_processed: Option<String> = None;

        loop {
            if self.stop_requested() {
                return StopReason::Stopped;
            }
            if self.success_count() >= config.target_action_count {
                return StopReason::TargetReached;
            }

            let candidates = match discovery.find_candidates().await {
                Ok(c) => c,
                Err(e) => {
                    if let Some(reason) = self.record_error(config, format!("discovery: {:#}", e)) {
                        return reason;
                    }
                    if !self.pause(timing.anti_detection_delay()).await {
                        return StopReason::Stopped;
                    }
                    continue;
                }
            };

            let mut cursor = self.status().cursor_index;
            if !resumes_at(&candidates, cursor, last_processed.as_deref()) {
                tracing::debug!(cursor, visible = candidates.len(), "new batch, cursor reset");
                cursor = 0;
                self.state_tx.send_modify(|s| s.cursor_index = 0);
            }

            if cursor >= candidates.len() {
                self.emit("No new posts yet, scrolling for more", None);
                match discovery.load_more().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("discovery exhausted");
                        return StopReason::Exhausted;
                    }
                    Err(e) => {
                        if let Some(reason) = self.record_error(config, format!("scroll: {:#}", e)) {
                            return reason;
                        }
                        if !self.pause(timing.anti_detection_delay()).await {
                            return StopReason::Stopped;
                        }
                        continue;
                    }
                }
                let wait = timing.human_delay(scroll_base, scroll_base / 3, scroll_base / 2, scroll_base * 2);
                if !self.pause(wait).await {
                    return StopReason::Stopped;
                }
                continue;
            }

            for candidate in &candidates[cursor..] {
                if self.stop_requested() {
                    return StopReason::Stopped;
                }
                last_processed = Some(candidate.item_key.clone());
                self.state_tx.send_modify(|s| s.cursor_index += 1);

                let delay = match self
                    .process(candidate, config, &mut timing, &mut window)
                    .await
                {
                    Step::Next(delay) => delay,
                    Step::Abort(reason) => return reason,
                };

                if self.success_count() >= config.target_action_count {
                    return StopReason::TargetReached;
                }
                if !self.pause(delay).await {
                    return StopReason::Stopped;
                }
            }
        }
    }

    async fn process(
        &self,
        candidate: &CandidateItem,
        config: &RunConfig,
        timing: &mut TimingController,
        window: &mut ActionWindow,
    ) -> Step {
        let per_action = seconds(config.per_action_delay_seconds);

        let verdict = match self.filter.evaluate(candidate, config).await {
            Ok(v) => v,
            Err(e) => return self.recover(config, timing, format!("filter: {}", e)),
        };
        if !verdict.passed {
            self.state_tx.send_modify(|s| s.clear_error_streak());
            return Step::Next(progressive_delay(self.status().total_attempted, per_action));
        }

        self.state_tx.send_modify(|s| s.total_attempted += 1);
        self.emit(
            &format!("Commenting on a post by {}", candidate.author_key),
            Some(self.progress(config)),
        );

        // Without a pending marker a crash could not be told apart from "never tried".
        if let Err(e) = self.store.mark_pending(candidate).await {
            return self.recover(config, timing, format!("pending marker: {}", e));
        }

        let outcome = self.executor.execute(candidate, timing).await;
        let attempted = self.status().total_attempted;

        match outcome {
            Ok(ActionOutcome::Success(item_key)) => {
                let committed = match self.commit_with_retry(candidate, timing).await {
                    Ok(()) => true,
                    Err(e) => {
                        // Marker stays: the filter skips the item for the rest of this
                        // run and the next start() settles it.
                        tracing::error!(item = %item_key, error = %e, "action performed but not recorded");
                        if let Some(reason) = self.record_error(config, format!("commit: {}", e)) {
                            return Step::Abort(reason);
                        }
                        false
                    }
                };
                if committed {
                    self.clear_pending(&item_key).await;
                }

                let now = self.store.now();
                window.push(now);
                self.state_tx.send_modify(|s| {
                    s.success_count += 1;
                    if committed {
                        s.clear_error_streak();
                    }
                });
                self.emit(
                    &format!(
                        "Commented {}/{}",
                        self.success_count(),
                        config.target_action_count
                    ),
                    Some(self.progress(config)),
                );

                let base = progressive_delay(attempted, per_action);
                let recent = window.recent(now);
                let delay =
                    burst_protection_delay(&recent, now, config.max_actions_per_minute, base);
                if delay > base {
                    tracing::info!(
                        wait_s = delay.as_secs(),
                        in_window = recent.len(),
                        "burst limit reached, backing off"
                    );
                }
                Step::Next(delay)
            }
            Ok(ActionOutcome::SoftFailure(reason)) => {
                self.clear_pending(&candidate.item_key).await;
                if let Err(e) = self.store.increment_counter(TOTAL_SOFT_FAILED).await {
                    tracing::warn!(error = %e, "failed to bump soft-failure counter");
                }
                self.state_tx.send_modify(|s| {
                    s.soft_failures += 1;
                    s.clear_error_streak();
                });
                self.emit(&format!("Skipped post: {}", reason), Some(self.progress(config)));
                Step::Next(progressive_delay(attempted, per_action))
            }
            Err(e) => {
                self.clear_pending(&candidate.item_key).await;
                self.recover(config, timing, format!("execute: {:#}", e))
            }
        }
    }

    /// Settle leftovers from a run that died between acting and recording.
    /// They are treated as acted on so the item is never commented twice.
    async fn recover_pending(&self, config: &RunConfig) -> Option<StopReason> {
        let pending = match self.store.pending_items().await {
            Ok(p) => p,
            Err(e) => return self.record_error(config, format!("pending recovery: {}", e)),
        };
        for marker in pending {
            tracing::warn!(
                item = %marker.item_key,
                author = %marker.author_key,
                marked_at = %marker.marked_at,
                "unconfirmed action from a previous run, marking as done"
            );
            if let Err(e) = self.store.settle_pending(&marker).await {
                if let Some(reason) = self.record_error(config, format!("pending recovery: {}", e)) {
                    return Some(reason);
                }
            }
        }
        None
    }

    /// `commit_success` is idempotent, so a transient store failure is retried
    /// in place. Returns the last error once the attempts run out.
    async fn commit_with_retry(
        &self,
        candidate: &CandidateItem,
        timing: &mut TimingController,
    ) -> EngineResult<()> {
        let mut attempt = 1;
        loop {
            match self.store.commit_success(candidate).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < COMMIT_ATTEMPTS => {
                    tracing::warn!(item = %candidate.item_key, attempt, error = %e, "commit failed, retrying");
                    attempt += 1;
                    // Not interruptible: the action already happened.
                    tokio::time::sleep(timing.anti_detection_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn recover(&self, config: &RunConfig, timing: &mut TimingController, message: String) -> Step {
        match self.record_error(config, message) {
            Some(reason) => Step::Abort(reason),
            None => Step::Next(timing.anti_detection_delay()),
        }
    }

    /// Append to the error log. Returns a stop reason when the configured
    /// consecutive-error limit is reached.
    fn record_error(&self, config: &RunConfig, message: String) -> Option<StopReason> {
        tracing::warn!(error = %message, "recoverable run error");
        let mut streak = 0;
        self.state_tx.send_modify(|s| {
            s.push_error(message.clone());
            streak = s.consecutive_errors;
        });
        self.emit(&format!("Error: {}", message), None);

        match config.max_consecutive_errors {
            Some(max) if streak >= max => {
                tracing::error!(streak, "too many consecutive errors, giving up");
                Some(StopReason::TooManyErrors)
            }
            _ => None,
        }
    }

    async fn clear_pending(&self, item_key: &str) {
        if let Err(e) = self.store.clear_pending(item_key).await {
            tracing::warn!(item = %item_key, error = %e, "failed to clear pending marker");
        }
    }

    /// Suspend for `duration` unless a stop arrives first. Returns false if
    /// the run should end.
    async fn pause(&self, duration: Duration) -> bool {
        if self.stop_requested() {
            return false;
        }
        if !duration.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = stop_signal(self.stop_tx.subscribe()) => {}
            }
        }
        !self.stop_requested()
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn success_count(&self) -> u32 {
        self.state_tx.borrow().success_count
    }

    fn progress(&self, config: &RunConfig) -> u8 {
        self.state_tx
            .borrow()
            .progress_percent(config.target_action_count)
    }

    fn emit(&self, message: &str, progress: Option<u8>) {
        self.state_tx
            .send_modify(|s| s.last_status = Some(message.to_string()));
        self.status.emit(message, progress);
    }
}

/// Resolves once the stop flag is set.
async fn stop_signal(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: no stop can arrive any more.
            std::future::pending::<()>().await;
        }
    }
}

/// True when `cursor` still points into the same page we were walking:
/// the item just before it is the one processed last.
fn resumes_at(candidates: &[CandidateItem], cursor: usize, last_processed: Option<&str>) -> bool {
    if cursor == 0 {
        return true;
    }
    match (candidates.get(cursor - 1), last_processed) {
        (Some(item), Some(key)) => item.item_key == key,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(keys: &[&str]) -> Vec<CandidateItem> {
        keys.iter()
            .map(|k| CandidateItem::new(*k, format!("author-{}", k), "text"))
            .collect()
    }

    #[test]
    fn test_resumes_on_grown_page() {
        let page = items(&["a", "b", "c", "d"]);
        assert!(resumes_at(&page, 2, Some("b")));
        assert!(resumes_at(&page, 4, Some("d")));
    }

    #[test]
    fn test_resets_on_unrelated_batch() {
        let page = items(&["x", "y"]);
        assert!(!resumes_at(&page, 1, Some("a")));
        // Shorter than the cursor: the page was replaced.
        assert!(!resumes_at(&page, 5, Some("y")));
        assert!(!resumes_at(&page, 1, None));
    }

    #[test]
    fn test_zero_cursor_always_resumes() {
        assert!(resumes_at(&[], 0, None));
        assert!(resumes_at(&items(&["a"]), 0, Some("zzz")));
    }

    #[test]
    fn test_seconds_handles_bad_values() {
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
        assert_eq!(seconds(-3.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
    }
}
