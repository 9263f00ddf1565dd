//! Smart Request Logging Middleware
//!
//! Tower layer that drives a [`RequestLogger`] from an axum (or any
//! tower-over-`http`) service.
//!
//! ## Key Features:
//! - Assigns every request a process-unique [`RequestId`] (`req-1`, `req-2`, ...)
//!   and stores it in the request extensions for handlers
//! - Responses carrying a [`HandlerError`](crate::core::error::HandlerError)
//!   marker take the failure path, everything else the completion path
//! - Errors from the inner service are logged with their source chain and
//!   returned unchanged
//! - Small error bodies are captured for the log line and re-attached untouched
//!
//! Dropping the response future before it completes (client disconnect)
//! discards the request's tracking state and cancels its deferred timer.

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use crate::core::config::LoggingOptions;
use crate::core::types::{ErrorPayload, Payload, RequestId, RequestInfo, ResponseInfo};
use crate::logging::hooks::RequestLogger;

/// Largest error body buffered so it can appear in the log line
pub const MAX_CAPTURED_BODY_BYTES: u64 = 64 * 1024;

/// Layer installing smart request logging
#[derive(Clone)]
pub struct SmartLoggingLayer {
    logger: Arc<RequestLogger>,
}

impl SmartLoggingLayer {
    /// Create a new layer from options
    pub fn new(options: LoggingOptions) -> Self {
        Self {
            logger: Arc::new(RequestLogger::new(options)),
        }
    }

    /// Share an existing logger, e.g. between several routers
    pub fn from_logger(logger: Arc<RequestLogger>) -> Self {
        Self { logger }
    }

    /// The logger behind this layer
    pub fn logger(&self) -> Arc<RequestLogger> {
        Arc::clone(&self.logger)
    }
}

impl Default for SmartLoggingLayer {
    fn default() -> Self {
        Self::new(LoggingOptions::default())
    }
}

impl<S> Layer<S> for SmartLoggingLayer {
    type Service = SmartLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SmartLoggingService {
            inner,
            logger: Arc::clone(&self.logger),
        }
    }
}

/// Service produced by [`SmartLoggingLayer`]
#[derive(Clone)]
pub struct SmartLoggingService<S> {
    inner: S,
    logger: Arc<RequestLogger>,
}

impl<S> Service<Request> for SmartLoggingService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let info = RequestInfo::new(
            RequestId::next(),
            request.method().as_str(),
            request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string()),
        );
        request.extensions_mut().insert(info.id.clone());

        self.logger.on_request(&info);
        let guard = InflightGuard::new(Arc::clone(&self.logger), info);

        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match inner.call(request).await {
                Ok(response) => Ok(guard.complete(response).await),
                Err(error) => {
                    guard.fail(&error);
                    Err(error)
                }
            }
        })
    }
}

/// Owns the request's tracking state until a hook consumes it
struct InflightGuard {
    logger: Arc<RequestLogger>,
    request: RequestInfo,
    finished: bool,
}

impl InflightGuard {
    fn new(logger: Arc<RequestLogger>, request: RequestInfo) -> Self {
        Self {
            logger,
            request,
            finished: false,
        }
    }

    async fn complete(mut self, response: Response) -> Response {
        let status = response.status().as_u16();

        if let Some(error) = response.extensions().get::<ErrorPayload>().cloned() {
            self.logger.on_error(&self.request, Some(status), error);
            self.finished = true;
            return response;
        }

        let (parts, body) = response.into_parts();
        let content_length = content_length(&parts.headers).or_else(|| body.size_hint().exact());

        let (payload, body) = if status >= 400 {
            capture_body(body).await
        } else {
            (Payload::Empty, body)
        };

        let mut outcome = ResponseInfo::new(status).with_payload(payload);
        outcome.content_length = content_length;
        self.logger.on_response(&self.request, outcome);
        self.finished = true;

        Response::from_parts(parts, body)
    }

    fn fail<E: std::error::Error>(mut self, error: &E) {
        self.logger
            .on_error(&self.request, None, ErrorPayload::from_error(error));
        self.finished = true;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.logger.abandon(&self.request.id);
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Buffer a small body of known size; anything else keeps streaming untouched
async fn capture_body(body: Body) -> (Payload, Body) {
    match body.size_hint().exact() {
        Some(0) => (Payload::Empty, body),
        Some(len) if len <= MAX_CAPTURED_BODY_BYTES => buffer_body(body, len as usize).await,
        _ => (Payload::Empty, body),
    }
}

/// Read the whole body; on a stream error, hand the client the chunks read
/// so far followed by that same error
async fn buffer_body(body: Body, capacity: usize) -> (Payload, Body) {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                warn!(error = %e, "Error response body failed while buffering, forwarding it uncaptured");
                let replay = stream::iter(chunks.into_iter().map(Ok::<Bytes, axum::Error>))
                    .chain(stream::once(async move { Err(e) }));
                return (Payload::Empty, Body::from_stream(replay));
            }
        }
    }

    let mut buffered = BytesMut::with_capacity(capacity);
    for chunk in &chunks {
        buffered.extend_from_slice(chunk);
    }
    let bytes = buffered.freeze();
    (Payload::Bytes(bytes.clone()), Body::from(bytes))
}
