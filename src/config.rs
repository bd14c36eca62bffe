//! Engine configuration.
//!
//! Defaults are sensible for an embedded single-process deployment; every
//! knob can be overridden with a `COACHDB_*` environment variable.

use std::path::PathBuf;

/// Retry configuration for classifier calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retries for transient failures.
    pub max_retries: u32,
    /// Initial backoff in milliseconds; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff sleep.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Configuration for the coachdb engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `SQLite` database. `None` opens an in-memory store.
    pub db_path: Option<PathBuf>,
    /// Interval between batch job status checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Retry behavior for classifier calls.
    pub retry: RetryConfig,
    /// Minimum confidence for a methodology tag to be accepted.
    pub tag_confidence_floor: f64,
    /// Maximum accepted methodology tags per insight in one run.
    pub max_tags_per_insight: usize,
    /// Default minimum audience confidence for confidence-gated queries.
    pub default_min_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            poll_interval_ms: 30_000,
            retry: RetryConfig::default(),
            tag_confidence_floor: 0.5,
            max_tags_per_insight: 5,
            default_min_confidence: 0.7,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Creates a configuration backed by a database file at `path`.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("COACHDB_DB_PATH") {
            if !v.is_empty() {
                self.db_path = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("COACHDB_POLL_INTERVAL_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.poll_interval_ms = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("COACHDB_MAX_RETRIES") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.retry.max_retries = parsed;
            }
        }
        if let Ok(v) = std::env::var("COACHDB_BASE_BACKOFF_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.retry.base_backoff_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("COACHDB_MAX_BACKOFF_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.retry.max_backoff_ms = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("COACHDB_TAG_CONFIDENCE_FLOOR") {
            if let Ok(parsed) = v.parse::<f64>() {
                self.tag_confidence_floor = parsed.clamp(0.0, 1.0);
            }
        }
        if let Ok(v) = std::env::var("COACHDB_MAX_TAGS_PER_INSIGHT") {
            if let Ok(parsed) = v.parse::<usize>() {
                self.max_tags_per_insight = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("COACHDB_MIN_CONFIDENCE") {
            if let Ok(parsed) = v.parse::<f64>() {
                self.default_min_confidence = parsed.clamp(0.0, 1.0);
            }
        }
        self
    }
}
