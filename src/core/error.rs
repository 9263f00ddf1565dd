//! # Error Handling
//!
//! Two kinds of errors live here:
//!
//! - [`LoggingError`]: failures of the crate itself (loading configuration,
//!   installing the diagnostics subscriber). Built with `thiserror`.
//! - [`HandlerError`]: an error type for axum handlers. Returning it from a
//!   handler produces the client-visible error response *and* marks the
//!   response so the logging layer takes the failure path for it.
//!
//! Logging never changes what the client sees. A `HandlerError` renders the
//! same response whether or not the layer is installed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::backtrace::Backtrace;
use thiserror::Error;

use crate::core::types::ErrorPayload;

/// Result type used throughout the crate
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Errors raised by the crate itself
#[derive(Debug, Error, Clone)]
pub enum LoggingError {
    /// Invalid configuration value (environment overrides)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Config file could not be read
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Malformed JSON config
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Malformed YAML config
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl LoggingError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LoggingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LoggingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for LoggingError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Error returned by request handlers
///
/// Any error convertible into `anyhow::Error` converts into a `HandlerError`
/// with status 500, so handlers can use `?` freely:
///
/// ```ignore
/// async fn handler() -> Result<Json<Value>, HandlerError> {
///     let user = load_user().await?;
///     Ok(Json(user))
/// }
/// ```
#[derive(Debug)]
pub struct HandlerError {
    status: StatusCode,
    error: ErrorPayload,
}

impl HandlerError {
    /// Create a handler error with an explicit status and message
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        let backtrace = Backtrace::capture();
        Self {
            status,
            error: ErrorPayload::new(message).with_backtrace(&backtrace),
        }
    }

    /// Create a 500 error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Create a 404 error with a custom message
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create a 400 error with a custom message
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Override the status code
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn payload(&self) -> &ErrorPayload {
        &self.error
    }
}

impl<E> From<E> for HandlerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err: anyhow::Error = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ErrorPayload::from_anyhow(&err),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "statusCode": self.status.as_u16(),
            "error": self.status.canonical_reason().unwrap_or("Unknown"),
            "message": self.error.message(),
        }));

        let mut response = (self.status, body).into_response();
        // The logging layer looks for this marker to take the failure path.
        response.extensions_mut().insert(self.error);
        response
    }
}
