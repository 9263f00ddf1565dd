// Diagnostic log configuration
pub mod config;

// Tracing subscriber setup
pub mod logging;

pub use config::{LogConfig, LogFormat};
pub use logging::init_logging;
