//! Tracing subscriber setup for binaries embedding the middleware.
//!
//! Request lines go through a [`LogSink`](crate::logging::sink::LogSink);
//! this subscriber carries the crate's own warnings (clamped thresholds,
//! duplicate request ids) and anything routed through
//! [`TracingSink`](crate::logging::sink::TracingSink).

use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use super::config::{LogConfig, LogFormat};

/// Map a level name to a [`Level`], defaulting to `INFO`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` directives are honored on top of the configured level. A
/// subscriber installed earlier (e.g. by a test harness) is left in place.
pub fn init_logging(config: &LogConfig) {
    let level = parse_level(&config.level);
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return;
    }

    info!(level = %level, format = ?config.format, "Diagnostic logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn second_init_is_harmless() {
        init_logging(&LogConfig::default());
        init_logging(&LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        });
    }
}
