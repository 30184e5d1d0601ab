use crate::error::{EngineError, EngineResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub generator: Option<GeneratorConfig>,
}

/// Parameters of a single automation run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunConfig {
    pub target_action_count: u32,
    #[serde(default = "default_author_window_hours")]
    pub duplicate_author_window_hours: f64,
    #[serde(default = "default_per_action_delay")]
    pub per_action_delay_seconds: f64,
    #[serde(default = "default_scroll_window")]
    pub scroll_window_seconds: f64,
    #[serde(default)]
    pub min_item_age_hours: f64,
    #[serde(default)]
    pub time_filter_enabled: bool,
    /// Hard cap on successful actions inside any trailing 60s window.
    #[serde(default = "default_max_per_minute")]
    pub max_actions_per_minute: u32,
    /// Abort the run after this many identical errors in a row. `None` retries forever.
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
    #[serde(default)]
    pub skip_keywords: Vec<String>,
}

fn default_author_window_hours() -> f64 { 24.0 }
fn default_per_action_delay() -> f64 { 8.0 }
fn default_scroll_window() -> f64 { 3.0 }
fn default_max_per_minute() -> u32 { 4 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_action_count: 10,
            duplicate_author_window_hours: default_author_window_hours(),
            per_action_delay_seconds: default_per_action_delay(),
            scroll_window_seconds: default_scroll_window(),
            min_item_age_hours: 0.0,
            time_filter_enabled: false,
            max_actions_per_minute: default_max_per_minute(),
            max_consecutive_errors: None,
            skip_keywords: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.target_action_count == 0 {
            return Err(EngineError::InvalidConfig(
                "target_action_count must be > 0".to_string(),
            ));
        }
        if self.max_actions_per_minute == 0 {
            return Err(EngineError::InvalidConfig(
                "max_actions_per_minute must be > 0".to_string(),
            ));
        }
        let non_negative = [
            ("duplicate_author_window_hours", self.duplicate_author_window_hours),
            ("per_action_delay_seconds", self.per_action_delay_seconds),
            ("scroll_window_seconds", self.scroll_window_seconds),
            ("min_item_age_hours", self.min_item_age_hours),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.max_consecutive_errors == Some(0) {
            return Err(EngineError::InvalidConfig(
                "max_consecutive_errors must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Jittered pause: `clamp(base ± variation, min, max)` in milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct DelaySpec {
    pub base_ms: u64,
    pub variation_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelaySpec {
    pub const fn new(base_ms: u64, variation_ms: u64, min_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, variation_ms, min_ms, max_ms }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimingConfig {
    /// Mouse travel before a click.
    #[serde(default = "default_pre_click")]
    pub pre_click: DelaySpec,
    /// UI settle after a click.
    #[serde(default = "default_post_click")]
    pub post_click: DelaySpec,
    #[serde(default = "default_post_focus")]
    pub post_focus: DelaySpec,
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
    /// Seed for the jitter RNG. Unset means seeded from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_pre_click() -> DelaySpec { DelaySpec::new(800, 400, 300, 2000) }
fn default_post_click() -> DelaySpec { DelaySpec::new(1500, 500, 800, 3000) }
fn default_post_focus() -> DelaySpec { DelaySpec::new(500, 200, 200, 1200) }
fn default_words_per_minute() -> u32 { 60 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pre_click: default_pre_click(),
            post_click: default_post_click(),
            post_focus: default_post_focus(),
            words_per_minute: default_words_per_minute(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Author records older than this are dropped by the startup sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_store_path() -> PathBuf { PathBuf::from("autopilot-state.json") }
fn default_retention_days() -> u32 { 30 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    #[serde(default = "default_generator_timeout")]
    pub request_timeout_ms: u64,
}

fn default_generator_timeout() -> u64 { 15000 }

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config TOML")?;
        config
            .run
            .validate()
            .context("Invalid [run] section")?;
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// Bearer token for the comment generator, if one is configured.
    pub fn generator_api_key() -> Option<String> {
        match std::env::var("GENERATOR_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
            _ => None,
        }
    }
}
