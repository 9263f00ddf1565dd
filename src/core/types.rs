//! # Core Types
//!
//! Value types shared by the decision pipeline, the formatter and the
//! middleware: request identity, request metadata and the payloads that can
//! be attached to a response or failure.

use bytes::Bytes;
use serde::Serialize;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::structure::{to_bounded_pretty_json, StructureError};

/// Identifier of one in-flight request.
///
/// Unique for the lifetime of the process. Ids generated by [`RequestId::next`]
/// restart from `req-1` after a restart, so collisions across restarts are possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Create a request id from any string-like value
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Allocate the next process-wide id (`req-1`, `req-2`, ...)
    pub fn next() -> Self {
        let n = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!("req-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// The parts of a request every log line needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: RequestId,
    pub method: String,
    pub url: String,
}

impl RequestInfo {
    pub fn new<I, M, U>(id: I, method: M, url: U) -> Self
    where
        I: Into<RequestId>,
        M: Into<String>,
        U: Into<String>,
    {
        Self {
            id: id.into(),
            method: method.into(),
            url: url.into(),
        }
    }
}

/// What the host observed when a response was sent
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    /// Numeric HTTP status code
    pub status: u16,

    /// Outgoing payload, if the host could capture it
    pub payload: Payload,

    /// Explicit content length signal (e.g. the `Content-Length` header)
    pub content_length: Option<u64>,
}

impl ResponseInfo {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_payload<P: Into<Payload>>(mut self, payload: P) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// A value that can be rendered as pretty JSON
///
/// Rendering is depth-bounded, so self-referential values fail with an error
/// instead of recursing; callers fall back to [`StructuredPayload::type_name`].
pub trait StructuredPayload: fmt::Debug + Send + Sync {
    fn to_pretty_json(&self) -> Result<String, StructureError>;

    fn type_name(&self) -> &'static str;
}

impl<T> StructuredPayload for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_pretty_json(&self) -> Result<String, StructureError> {
        to_bounded_pretty_json(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Response body (or any other value) attached to a log context
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Nothing was captured
    #[default]
    Empty,
    /// Text body, shown verbatim
    Text(String),
    /// Raw bytes, decoded as UTF-8 for display
    Bytes(Bytes),
    /// Already-parsed JSON value
    Json(serde_json::Value),
    /// Error-like value; only its message is displayed
    Error(ErrorPayload),
    /// Arbitrary serializable value
    Structured(Arc<dyn StructuredPayload>),
}

impl Payload {
    /// Wrap any serializable value
    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Self::Structured(Arc::new(value))
    }

    /// Byte length of text-like payloads, `None` when it cannot be measured
    pub fn byte_len(&self) -> Option<u64> {
        match self {
            Self::Text(text) if !text.is_empty() => Some(text.len() as u64),
            Self::Bytes(bytes) if !bytes.is_empty() => Some(bytes.len() as u64),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<ErrorPayload> for Payload {
    fn from(error: ErrorPayload) -> Self {
        Self::Error(error)
    }
}

/// Error data captured for logging: a message and an optional stack
///
/// This is a snapshot, so it can be cloned into response extensions and log
/// contexts while the original error keeps flowing to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    message: String,
    stack: Option<String>,
}

impl ErrorPayload {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Capture a `std::error::Error`; the source chain becomes the stack
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\n"))
            },
        }
    }

    /// Capture an `anyhow::Error`; its debug rendering (cause chain and
    /// backtrace, when enabled) becomes the stack
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            stack: Some(format!("{:?}", error)),
        }
    }

    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach a backtrace if one was actually captured
    pub fn with_backtrace(mut self, backtrace: &Backtrace) -> Self {
        if backtrace.status() == BacktraceStatus::Captured {
            self.stack = Some(backtrace.to_string());
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref().filter(|stack| !stack.is_empty())
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
