//! Immutable snapshot of one request at one observation phase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{ErrorPayload, Payload, RequestId, RequestInfo};

/// Which lifecycle moment a [`LogContext`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogPhase {
    Request,
    Response,
    Error,
}

impl fmt::Display for LogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Everything a filter or formatter may look at
///
/// Only the phase constructors can build one, which keeps the shape valid:
/// request contexts carry no status, duration, payload or error, while
/// response and error contexts always carry a status.
#[derive(Debug, Clone)]
pub struct LogContext {
    phase: LogPhase,
    method: String,
    url: String,
    request_id: RequestId,
    status_code: Option<u16>,
    duration_ms: Option<f64>,
    payload: Payload,
    error: Option<ErrorPayload>,
}

impl LogContext {
    /// Context for the start of a request
    pub fn request(request: &RequestInfo) -> Self {
        Self {
            phase: LogPhase::Request,
            method: request.method.clone(),
            url: request.url.clone(),
            request_id: request.id.clone(),
            status_code: None,
            duration_ms: None,
            payload: Payload::Empty,
            error: None,
        }
    }

    /// Context for a completed response
    pub fn response(request: &RequestInfo, status_code: u16, duration_ms: f64, payload: Payload) -> Self {
        Self {
            phase: LogPhase::Response,
            status_code: Some(status_code),
            duration_ms: Some(duration_ms),
            payload,
            ..Self::request(request)
        }
    }

    /// Context for a failed request; the duration is unknown when no start was recorded
    pub fn error(
        request: &RequestInfo,
        status_code: u16,
        duration_ms: Option<f64>,
        error: ErrorPayload,
    ) -> Self {
        Self {
            phase: LogPhase::Error,
            status_code: Some(status_code),
            duration_ms,
            error: Some(error),
            ..Self::request(request)
        }
    }

    pub fn phase(&self) -> LogPhase {
        self.phase
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration_ms
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn error_payload(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    /// `true` for the response and error phases, the only ones built-in filters judge
    pub fn is_outcome(&self) -> bool {
        matches!(self.phase, LogPhase::Response | LogPhase::Error)
    }
}
