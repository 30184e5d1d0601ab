use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Most recent error messages kept on the run state.
pub const MAX_ERROR_LOG: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// `stop()` was called.
    Stopped,
    /// Discovery reported that no more content can be loaded.
    Exhausted,
    /// `max_consecutive_errors` identical errors in a row.
    TooManyErrors,
}

/// Aggregate state of the current (or last) run. Owned by the orchestrator;
/// callers only ever see clones.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub phase: RunPhase,
    pub is_running: bool,
    pub cursor_index: usize,
    pub success_count: u32,
    /// Candidates that passed the filters and went to the executor.
    pub total_attempted: u32,
    pub soft_failures: u32,
    /// Oldest first, capped at `MAX_ERROR_LOG`.
    pub errors: VecDeque<String>,
    pub total_errors: u64,
    /// Length of the current streak of identical errors.
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_status: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            is_running: false,
            cursor_index: 0,
            success_count: 0,
            total_attempted: 0,
            soft_failures: 0,
            errors: VecDeque::with_capacity(16),
            total_errors: 0,
            consecutive_errors: 0,
            last_error: None,
            last_status: None,
            started_at: None,
            stop_reason: None,
        }
    }

    /// Reset per-run fields and enter `Running`.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        *self = Self {
            phase: RunPhase::Running,
            is_running: true,
            started_at: Some(now),
            ..Self::new()
        };
    }

    pub fn finish(&mut self, reason: StopReason) {
        self.phase = RunPhase::Idle;
        self.is_running = false;
        self.stop_reason = Some(reason);
    }

    pub fn push_error(&mut self, message: String) {
        if self.last_error.as_deref() == Some(message.as_str()) {
            self.consecutive_errors += 1;
        } else {
            self.consecutive_errors = 1;
        }
        self.total_errors += 1;
        if self.errors.len() >= MAX_ERROR_LOG {
            self.errors.pop_front();
        }
        self.errors.push_back(message.clone());
        self.last_error = Some(message);
    }

    /// Any non-error outcome ends the streak.
    pub fn clear_error_streak(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
    }

    pub fn progress_percent(&self, target: u32) -> u8 {
        if target == 0 {
            return 100;
        }
        ((self.success_count as u64 * 100) / target as u64).min(100) as u8
    }
}
