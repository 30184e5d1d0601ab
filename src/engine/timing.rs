//! Human-like pacing: jittered pauses, typing time, progressive slow-down and
//! the sliding-window burst limiter.
//!
//! Nothing here sleeps. Every function returns a `Duration` and the caller
//! decides where to suspend.

use crate::config::{DelaySpec, TimingConfig};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_WPM: u32 = 60;
const CHARS_PER_WORD: f64 = 5.0;
const TYPING_JITTER: f64 = 0.3;
const TYPING_MIN_MS: f64 = 500.0;
const TYPING_MAX_MS: f64 = 10_000.0;

const PROGRESSIVE_STEP: f64 = 0.2;
const PROGRESSIVE_CAP: f64 = 3.0;

const ANTI_DETECTION_MIN_MS: u64 = 500;
const ANTI_DETECTION_MAX_MS: u64 = 3000;

/// Length of the burst-protection window.
pub const BURST_WINDOW: Duration = Duration::from_secs(60);

/// Source of jittered delays. Owns its RNG so a seeded controller is fully
/// reproducible.
pub struct TimingController {
    rng: StdRng,
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingController {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &TimingConfig) -> Self {
        match config.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }

    /// `clamp(base + uniform(-variation, +variation), min, max)`.
    pub fn human_delay(
        &mut self,
        base: Duration,
        variation: Duration,
        min: Duration,
        max: Duration,
    ) -> Duration {
        let base_ms = base.as_millis() as i64;
        let variation_ms = variation.as_millis() as i64;
        let jitter = if variation_ms > 0 {
            self.rng.gen_range(-variation_ms..=variation_ms)
        } else {
            0
        };
        let min_ms = min.as_millis() as i64;
        // A misconfigured max below min collapses to min instead of panicking in clamp.
        let max_ms = (max.as_millis() as i64).max(min_ms);
        let ms = (base_ms + jitter).clamp(min_ms, max_ms).max(0);
        Duration::from_millis(ms as u64)
    }

    pub fn human_delay_for(&mut self, spec: &DelaySpec) -> Duration {
        self.human_delay(
            Duration::from_millis(spec.base_ms),
            Duration::from_millis(spec.variation_ms),
            Duration::from_millis(spec.min_ms),
            Duration::from_millis(spec.max_ms),
        )
    }

    /// Time a person typing at `words_per_minute` (±30%) needs for `text`,
    /// clamped to [500ms, 10s].
    pub fn typing_delay(&mut self, text: &str, words_per_minute: u32) -> Duration {
        let chars = text.chars().count() as f64;
        let chars_per_minute = words_per_minute.max(1) as f64 * CHARS_PER_WORD;
        let base_ms = chars / chars_per_minute * 60_000.0;
        let factor = self
            .rng
            .gen_range((1.0 - TYPING_JITTER)..=(1.0 + TYPING_JITTER));
        let ms = (base_ms * factor).clamp(TYPING_MIN_MS, TYPING_MAX_MS);
        Duration::from_millis(ms.round() as u64)
    }

    /// Uniform pause in [500ms, 3000ms] for error-recovery paths.
    pub fn anti_detection_delay(&mut self) -> Duration {
        Duration::from_millis(
            self.rng
                .gen_range(ANTI_DETECTION_MIN_MS..=ANTI_DETECTION_MAX_MS),
        )
    }
}

/// `min(1 + 0.2 * action_count, 3)`.
pub fn progressive_multiplier(action_count: u32) -> f64 {
    (1.0 + action_count as f64 * PROGRESSIVE_STEP).min(PROGRESSIVE_CAP)
}

pub fn progressive_delay(action_count: u32, base: Duration) -> Duration {
    base.mul_f64(progressive_multiplier(action_count))
}

/// Sliding-window rate limiter.
///
/// With `max_per_minute` or more actions in the trailing 60s, waits until the
/// oldest of them leaves the window, plus `base`. Otherwise waits `base`.
pub fn burst_protection_delay(
    recent: &[DateTime<Utc>],
    now: DateTime<Utc>,
    max_per_minute: u32,
    base: Duration,
) -> Duration {
    let window = window_span();
    let window_start = now - window;
    let mut in_window = recent.iter().filter(|t| **t > window_start && **t <= now);

    let Some(first) = in_window.next() else {
        return base;
    };
    let mut count: u32 = 1;
    let mut oldest = *first;
    for t in in_window {
        count += 1;
        if *t < oldest {
            oldest = *t;
        }
    }

    if count < max_per_minute {
        return base;
    }

    let until_free = (oldest + window - now).to_std().unwrap_or(Duration::ZERO);
    until_free + base
}

/// Fractional hours as a millisecond-precision span, rounded to the nearest ms.
pub fn hours_span(hours: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

fn window_span() -> chrono::Duration {
    chrono::Duration::from_std(BURST_WINDOW).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

/// Timestamps of recent successful actions, trimmed to the trailing 60s
/// on every read and write.
#[derive(Debug, Default)]
pub struct ActionWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ActionWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: DateTime<Utc>) {
        self.trim(at);
        self.timestamps.push_back(at);
    }

    pub fn recent(&mut self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.trim(now);
        self.timestamps.iter().copied().collect()
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        let window_start = now - window_span();
        while self.timestamps.front().is_some_and(|&t| t <= window_start) {
            self.timestamps.pop_front();
        }
    }
}
