//! # Configuration Module
//!
//! Options for the smart logging layer and their resolution into a
//! fully-defaulted [`ResolvedOptions`].
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde (snake_case or camelCase keys)
//! - Environment variable override support
//! - Programmatic filters and logger sinks, which cannot come from files
//!
//! Out-of-range values are not rejected. A negative or non-finite slow
//! threshold is clamped to `0` during resolution, which turns the layer into
//! a plain access logger without deferral.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::error::{LoggingError, LoggingResult};
use crate::logging::decision::{LogFilter, SharedFilter};
use crate::logging::sink::{LogSink, StdioSink};

/// Default number of body characters shown for error responses
pub const DEFAULT_MAX_BODY_LENGTH: usize = 200;

/// Environment variable overriding the slow-response threshold (milliseconds)
pub const ENV_SLOW_THRESHOLD: &str = "SMART_LOGGING_SLOW_THRESHOLD_MS";
/// Environment variable overriding `log_non_successes`
pub const ENV_NON_SUCCESSES: &str = "SMART_LOGGING_NON_SUCCESSES";
/// Environment variable overriding `max_body_length`
pub const ENV_MAX_BODY_LENGTH: &str = "SMART_LOGGING_MAX_BODY_LENGTH";

/// User-facing logging options
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Responses slower than this many milliseconds are always logged.
    /// `0` logs every request immediately, like a normal access logger.
    #[serde(alias = "logSlowResponsesThreshold")]
    pub log_slow_responses_threshold: f64,

    /// Always log responses outside the 2xx range
    #[serde(alias = "logNonSuccesses")]
    pub log_non_successes: bool,

    /// Maximum number of body characters logged for error responses
    #[serde(alias = "maxBodyLength")]
    pub max_body_length: usize,

    /// Custom filters, applied after the built-in ones
    #[serde(skip)]
    pub filters: Vec<SharedFilter>,

    /// Destination for log lines; stdout/stderr when unset
    #[serde(skip)]
    pub logger: Option<Arc<dyn LogSink>>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_slow_responses_threshold: 0.0,
            log_non_successes: true,
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            filters: Vec::new(),
            logger: None,
        }
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("log_slow_responses_threshold", &self.log_slow_responses_threshold)
            .field("log_non_successes", &self.log_non_successes)
            .field("max_body_length", &self.max_body_length)
            .field("filters", &self.filters.len())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl LoggingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a YAML document
    pub fn from_yaml_str(content: &str) -> LoggingResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse options from a JSON document
    pub fn from_json_str(content: &str) -> LoggingResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load options from a file; `.json` files are parsed as JSON, everything
    /// else as YAML. Environment overrides are applied afterwards.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> LoggingResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let mut options = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        options.apply_env_overrides()?;
        debug!(path = %path.display(), options = ?options, "Loaded logging options");
        Ok(options)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> LoggingResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> LoggingResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threshold) = lookup(ENV_SLOW_THRESHOLD) {
            self.log_slow_responses_threshold = threshold.trim().parse().map_err(|e| {
                LoggingError::config(format!("Invalid {}: {}", ENV_SLOW_THRESHOLD, e))
            })?;
        }

        if let Some(enabled) = lookup(ENV_NON_SUCCESSES) {
            self.log_non_successes = enabled.trim().parse().map_err(|e| {
                LoggingError::config(format!("Invalid {}: {}", ENV_NON_SUCCESSES, e))
            })?;
        }

        if let Some(length) = lookup(ENV_MAX_BODY_LENGTH) {
            self.max_body_length = length.trim().parse().map_err(|e| {
                LoggingError::config(format!("Invalid {}: {}", ENV_MAX_BODY_LENGTH, e))
            })?;
        }

        Ok(())
    }

    pub fn with_slow_threshold_ms(mut self, threshold: f64) -> Self {
        self.log_slow_responses_threshold = threshold;
        self
    }

    pub fn with_log_non_successes(mut self, enabled: bool) -> Self {
        self.log_non_successes = enabled;
        self
    }

    pub fn with_max_body_length(mut self, length: usize) -> Self {
        self.max_body_length = length;
        self
    }

    /// Append a custom filter
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: LogFilter + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Use a custom logger sink
    pub fn with_logger<L>(mut self, logger: L) -> Self
    where
        L: LogSink + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Share an existing logger sink
    pub fn with_shared_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Fill in defaults and normalize out-of-range values
    pub fn resolve(self) -> ResolvedOptions {
        let threshold = self.log_slow_responses_threshold;
        let slow_threshold_ms = if threshold.is_finite() && threshold >= 0.0 {
            threshold
        } else {
            warn!(
                threshold = threshold,
                "Slow response threshold must be a non-negative number, treating it as 0"
            );
            0.0
        };

        ResolvedOptions {
            slow_threshold_ms,
            log_non_successes: self.log_non_successes,
            max_body_length: self.max_body_length,
            filters: self.filters,
            logger: self.logger.unwrap_or_else(|| Arc::new(StdioSink)),
        }
    }
}

/// Fully-defaulted options used by the pipeline and the orchestrator
#[derive(Clone)]
pub struct ResolvedOptions {
    /// Non-negative slow threshold in milliseconds, `0` disables deferral
    pub slow_threshold_ms: f64,
    pub log_non_successes: bool,
    pub max_body_length: usize,
    /// User filters, evaluated after the built-ins
    pub filters: Vec<SharedFilter>,
    pub logger: Arc<dyn LogSink>,
}

impl ResolvedOptions {
    /// `true` when every request line is logged at start
    pub fn logs_immediately(&self) -> bool {
        self.slow_threshold_ms == 0.0
    }

    /// Delay before a pending request line is considered slow, if deferral is enabled
    pub fn deferral(&self) -> Option<Duration> {
        if self.slow_threshold_ms > 0.0 {
            Some(Duration::from_secs_f64(self.slow_threshold_ms / 1000.0))
        } else {
            None
        }
    }
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        LoggingOptions::default().resolve()
    }
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("slow_threshold_ms", &self.slow_threshold_ms)
            .field("log_non_successes", &self.log_non_successes)
            .field("max_body_length", &self.max_body_length)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}
