//! # Smart Logging - Core Library Crate
//!
//! Request/response logging for axum and tower services that stays quiet for
//! fast, successful traffic and speaks up for everything else.
//!
//! ## How It Works
//!
//! Every request passes through a filter pipeline that decides whether its
//! lines are shown, and with which color and tag:
//! - Non-2xx responses are shown (unless `log_non_successes` is off)
//! - Responses slower than the threshold are shown, tagged `SLOW`
//! - Failures are always shown in red, tagged `ERROR`
//! - Custom filters run last and can override any of the above
//!
//! The request line (`[req-1] GET /path`) is written at most once: at start
//! when the threshold is `0`, otherwise only once the request turns out to be
//! slow, failed, or visible.
//!
//! ## Module Layout
//! - `core`: options, error types, and the request/response data model
//! - `logging`: decision pipeline, formatting, timing, and the orchestrator
//! - `middleware`: the tower layer wiring the orchestrator into a service
//! - `observability`: tracing subscriber setup for the crate's own diagnostics
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use smart_logging::{LoggingOptions, SmartLoggingLayer};
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(SmartLoggingLayer::new(
//!         LoggingOptions::new().with_slow_threshold_ms(500.0),
//!     ));
//! ```

/// Options, error types, and the data model shared by every other module
pub mod core;

/// Decision pipeline, line formatting, timing, and lifecycle hooks
pub mod logging;

/// Tower layer driving the lifecycle hooks
pub mod middleware;

/// Diagnostic logging setup
pub mod observability;

pub use crate::core::config::{LoggingOptions, ResolvedOptions, DEFAULT_MAX_BODY_LENGTH};
pub use crate::core::error::{HandlerError, LoggingError, LoggingResult};
pub use crate::core::types::{ErrorPayload, Payload, RequestId, RequestInfo, ResponseInfo};
pub use crate::logging::{
    ActionPatch, LogAction, LogColor, LogContext, LogFilter, LogPhase, LogSink, MemorySink,
    RequestLogger, SharedFilter, StdioSink, TracingSink, Visibility,
};
pub use crate::middleware::{SmartLoggingLayer, SmartLoggingService};
