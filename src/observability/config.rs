//! Configuration for the crate's own diagnostics (not the request lines).

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`LogConfig::level`]
pub const ENV_LOG_LEVEL: &str = "SMART_LOGGING_LOG_LEVEL";

/// Environment variable overriding [`LogConfig::format`] (`json` or `text`)
pub const ENV_LOG_FORMAT: &str = "SMART_LOGGING_LOG_FORMAT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Defaults overridden from the process environment
    pub fn from_env() -> Self {
        Self::default().with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; unknown formats are ignored
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|level| !level.trim().is_empty()) {
            self.level = level.trim().to_lowercase();
        }

        match lookup(ENV_LOG_FORMAT).map(|f| f.trim().to_lowercase()).as_deref() {
            Some("json") => self.format = LogFormat::Json,
            Some("text") => self.format = LogFormat::Text,
            _ => {}
        }

        self
    }
}
