//! # Request Lifecycle Hooks
//!
//! [`RequestLogger`] ties timing, the decision pipeline and the formatter to
//! the three moments of a request's life:
//!
//! - [`RequestLogger::on_request`]: record the start, then either log the
//!   request line right away (threshold `0`) or arm a deferred timer that logs
//!   it once the request turns out to be slow.
//! - [`RequestLogger::on_response`]: cancel the timer, evaluate the filters
//!   and log the response line when visible.
//! - [`RequestLogger::on_error`]: same, for failures, on the sink's error channel.
//!
//! Per-request state lives in a side table keyed by [`RequestId`] and is
//! removed on completion or failure. The request line is guarded by a
//! per-request lock shared with the timer task. The lock is held while the
//! line is written, and completion or failure write their own lines under it,
//! so on a multi-threaded runtime the request line is written at most once
//! and always before the response or error lines of the same request.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::config::{LoggingOptions, ResolvedOptions};
use crate::core::types::{ErrorPayload, RequestId, RequestInfo, ResponseInfo};
use crate::logging::context::LogContext;
use crate::logging::decision::{build_filter_chain, evaluate_filters, LogAction, SharedFilter};
use crate::logging::format::{
    format_error_main_line, format_error_stack_line, format_request_line, format_response_line,
    UNKNOWN_DURATION,
};
use crate::logging::sink::LogSink;
use crate::logging::timing::{self, format_duration_ms, RequestStart};

/// Status reported for failures when the host does not supply one
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// `true` once the request line was written, or once the request settled
/// without it; nothing may write the request line after that.
type RequestLineGuard = Arc<Mutex<bool>>;

/// Tracking record for one in-flight request
struct InflightRequest {
    start: RequestStart,
    request_line: RequestLineGuard,
    deferred: Option<JoinHandle<()>>,
}

impl InflightRequest {
    fn cancel_deferred(&mut self) {
        if let Some(handle) = self.deferred.take() {
            handle.abort();
        }
    }
}

/// Write the request line unless it was already written or settled
fn log_request_line_once(sink: &dyn LogSink, guard: &Mutex<bool>, line: &str) {
    let mut settled = guard.lock();
    if !*settled {
        *settled = true;
        sink.info(line);
    }
}

/// Decides and writes the log lines for every request passing through
pub struct RequestLogger {
    options: ResolvedOptions,
    filters: Vec<SharedFilter>,
    default_action: LogAction,
    inflight: DashMap<RequestId, InflightRequest>,
}

impl RequestLogger {
    pub fn new(options: LoggingOptions) -> Self {
        Self::from_resolved(options.resolve())
    }

    pub fn from_resolved(options: ResolvedOptions) -> Self {
        let filters = build_filter_chain(&options);
        Self {
            options,
            filters,
            default_action: LogAction::hidden(),
            inflight: DashMap::new(),
        }
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// Number of requests started but not yet completed or failed
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run the full filter chain (built-ins, then user filters) against a context
    pub fn evaluate(&self, ctx: &LogContext) -> LogAction {
        evaluate_filters(ctx, &self.filters, &self.default_action)
    }

    /// A request has started
    ///
    /// With a positive threshold this spawns the deferred timer on the
    /// current tokio runtime. Outside a runtime no timer is armed and the
    /// request line is only written on completion or failure.
    pub fn on_request(&self, request: &RequestInfo) {
        let start = timing::mark_start();
        let request_line: RequestLineGuard = Arc::new(Mutex::new(false));
        let mut deferred = None;

        if self.options.logs_immediately() {
            let line = format_request_line(&LogContext::request(request));
            log_request_line_once(self.options.logger.as_ref(), &request_line, &line);
        } else if let Some(delay) = self.options.deferral() {
            deferred = self.schedule_deferred_line(request, delay, Arc::clone(&request_line));
        }

        let record = InflightRequest {
            start,
            request_line,
            deferred,
        };

        if let Some(mut previous) = self.inflight.insert(request.id.clone(), record) {
            warn!(request_id = %request.id, "Request id reused while still in flight, dropping the older record");
            previous.cancel_deferred();
            *previous.request_line.lock() = true;
        }
    }

    fn schedule_deferred_line(
        &self,
        request: &RequestInfo,
        delay: Duration,
        request_line: RequestLineGuard,
    ) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "No tokio runtime, slow request line will not be deferred");
                return None;
            }
        };

        let sink = Arc::clone(&self.options.logger);
        let line = format_request_line(&LogContext::request(request));
        let request_id = request.id.clone();

        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(request_id = %request_id, "Request exceeded slow threshold before completing");
            log_request_line_once(sink.as_ref(), &request_line, &line);
        }))
    }

    /// A response is about to be sent
    ///
    /// Returns the evaluated action, or `None` when no start was recorded for
    /// this request (nothing is logged in that case).
    pub fn on_response(&self, request: &RequestInfo, response: ResponseInfo) -> Option<LogAction> {
        let Some((_, mut record)) = self.inflight.remove(&request.id) else {
            debug!(request_id = %request.id, "Response without a recorded start, skipping");
            return None;
        };
        record.cancel_deferred();

        let duration_ms = record.start.elapsed_ms();
        let payload_length = response
            .content_length
            .or_else(|| response.payload.byte_len());
        let ctx = LogContext::response(request, response.status, duration_ms, response.payload);
        let action = self.evaluate(&ctx);

        // Held until the response line is out, so a timer firing on another
        // thread cannot slip its request line in after it.
        let mut settled = record.request_line.lock();
        if action.is_visible() {
            let sink = self.options.logger.as_ref();
            if !*settled {
                sink.info(&format_request_line(&ctx));
            }
            sink.info(&format_response_line(
                &ctx,
                &action,
                payload_length,
                self.options.max_body_length,
            ));
        }
        *settled = true;

        Some(action)
    }

    /// The request failed
    ///
    /// `status` is the status the host will answer with; `500` when unknown.
    /// The caller keeps ownership of the original error and must still hand
    /// it to the host for the client-visible response.
    pub fn on_error(&self, request: &RequestInfo, status: Option<u16>, error: ErrorPayload) -> LogAction {
        let mut record = self.inflight.remove(&request.id).map(|(_, record)| record);
        if let Some(record) = record.as_mut() {
            record.cancel_deferred();
        }

        let status = status.unwrap_or(DEFAULT_ERROR_STATUS);
        let duration_ms = record.as_ref().map(|record| record.start.elapsed_ms());
        let ctx = LogContext::error(request, status, duration_ms, error);
        let action = self.evaluate(&ctx);

        let mut settled = record.as_ref().map(|record| record.request_line.lock());
        if action.is_visible() {
            let sink = self.options.logger.as_ref();
            if !settled.as_deref().copied().unwrap_or(false) {
                sink.info(&format_request_line(&ctx));
            }

            let duration_label = duration_ms
                .map(format_duration_ms)
                .unwrap_or_else(|| UNKNOWN_DURATION.to_string());
            sink.error(&format_error_main_line(&ctx, &action, &duration_label, status));

            if let Some(stack_line) = format_error_stack_line(&ctx) {
                sink.error(&stack_line);
            }
        }
        if let Some(settled) = settled.as_mut() {
            **settled = true;
        }

        action
    }

    /// Forget a request that will never complete (e.g. the client went away)
    pub fn abandon(&self, request_id: &RequestId) {
        if let Some((_, mut record)) = self.inflight.remove(request_id) {
            record.cancel_deferred();
            *record.request_line.lock() = true;
            debug!(request_id = %request_id, "Request abandoned before completion");
        }
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(LoggingOptions::default())
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger")
            .field("options", &self.options)
            .field("filters", &self.filters.len())
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Payload;
    use crate::logging::context::LogPhase;
    use crate::logging::decision::{ActionPatch, LogColor};
    use crate::logging::sink::{LogSink, MemorySink};
    use serde_json::json;

    fn strip_ansi(text: &str) -> String {
        regex::Regex::new(r"\x1b\[[0-9;]*m")
            .unwrap()
            .replace_all(text, "")
            .into_owned()
    }

    fn logger(threshold: f64) -> (RequestLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let options = LoggingOptions::default()
            .with_slow_threshold_ms(threshold)
            .with_shared_logger(sink.clone());
        (RequestLogger::new(options), sink)
    }

    fn get(id: &str, url: &str) -> RequestInfo {
        RequestInfo::new(id, "GET", url)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_threshold_logs_request_line_at_start() {
        let (logger, sink) = logger(0.0);
        let request = get("req-1", "/ok");

        logger.on_request(&request);
        assert_eq!(sink.info_lines(), vec!["[req-1] GET /ok"]);

        logger.on_response(&request, ResponseInfo::new(200).with_payload("{\"ok\":true}"));

        let lines: Vec<String> = sink.info_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(lines, vec!["[req-1] GET /ok", "[req-1] ↳ 200 11B in 0ms"]);
        assert_eq!(logger.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_success_under_threshold_logs_nothing() {
        let (logger, sink) = logger(1000.0);
        let request = get("req-2", "/ok");

        logger.on_request(&request);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let action = logger.on_response(&request, ResponseInfo::new(200)).unwrap();
        assert!(!action.is_visible());

        // The cancelled timer must not fire later.
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_line_appears_before_completion() {
        let (logger, sink) = logger(1000.0);
        let request = get("req-3", "/report");

        logger.on_request(&request);
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(sink.info_lines(), vec!["[req-3] GET /report"]);

        let action = logger.on_response(&request, ResponseInfo::new(200)).unwrap();
        assert_eq!(action.tag.as_deref(), Some("SLOW"));
        assert_eq!(action.color, Some(LogColor::Yellow));

        let lines: Vec<String> = sink.info_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[req-3] GET /report");
        assert!(lines[1].starts_with("[req-3] ↳ 200 [SLOW] ???B in 1s"), "{}", lines[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_failure_logs_request_and_error_lines() {
        let (logger, sink) = logger(1000.0);
        let request = RequestInfo::new("req-4", "POST", "/orders");

        logger.on_request(&request);
        let action = logger.on_error(
            &request,
            None,
            ErrorPayload::new("boom").with_stack("boom\n    at create_order"),
        );

        assert!(action.is_visible());
        assert_eq!(action.color, Some(LogColor::Red));
        assert_eq!(action.tag.as_deref(), Some("ERROR"));

        assert_eq!(sink.info_lines(), vec!["[req-4] POST /orders"]);
        let errors: Vec<String> = sink.error_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(
            errors,
            vec![
                "[req-4] × POST /orders → 500 0ms boom",
                "[req-4] Error stack: boom\n    at create_order",
            ]
        );

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(sink.info_lines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_response_body_is_logged_and_truncated() {
        let sink = Arc::new(MemorySink::new());
        let options = LoggingOptions::default()
            .with_slow_threshold_ms(1000.0)
            .with_max_body_length(10)
            .with_shared_logger(sink.clone());
        let logger = RequestLogger::new(options);

        let request = get("req-5", "/broken");
        logger.on_request(&request);
        logger.on_response(
            &request,
            ResponseInfo::new(500).with_payload(json!({"foo": "bar"})),
        );

        let lines: Vec<String> = sink.info_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(lines[0], "[req-5] GET /broken");
        assert_eq!(lines[1], "[req-5] ↳ 500 [ERROR] {\n  \"foo\":... ???B in 0ms");
    }

    #[tokio::test(start_paused = true)]
    async fn content_length_wins_over_measured_payload() {
        let (logger, sink) = logger(0.0);
        let request = get("req-6", "/download");

        logger.on_request(&request);
        logger.on_response(
            &request,
            ResponseInfo::new(200).with_payload("tiny").with_content_length(3 * 1024),
        );

        let last = strip_ansi(&sink.info_lines()[1]);
        assert_eq!(last, "[req-6] ↳ 200 3KB in 0ms");
    }

    #[test]
    fn response_without_start_is_ignored() {
        let (logger, sink) = logger(0.0);
        let result = logger.on_response(&get("req-7", "/ok"), ResponseInfo::new(200));
        assert!(result.is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn failure_without_start_uses_unknown_duration() {
        let (logger, sink) = logger(1000.0);
        logger.on_error(&get("req-8", "/x"), Some(502), ErrorPayload::new("upstream closed"));

        assert_eq!(sink.info_lines(), vec!["[req-8] GET /x"]);
        let errors: Vec<String> = sink.error_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(errors, vec!["[req-8] × GET /x → 502 - upstream closed"]);
    }

    #[test]
    fn deferral_is_skipped_outside_a_runtime() {
        let (logger, sink) = logger(1000.0);
        let request = get("req-9", "/ok");
        logger.on_request(&request);
        assert_eq!(logger.in_flight(), 1);

        let action = logger.on_response(&request, ResponseInfo::new(404)).unwrap();
        assert!(action.is_visible());
        assert_eq!(sink.info_lines().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_outcome_suppresses_pending_request_line() {
        let sink = Arc::new(MemorySink::new());
        let options = LoggingOptions::default()
            .with_slow_threshold_ms(1000.0)
            .with_shared_logger(sink.clone())
            .with_filter(|ctx: &LogContext| (ctx.url() == "/health").then(ActionPatch::hide));
        let logger = RequestLogger::new(options);
        let request = get("req-10", "/health");

        logger.on_request(&request);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let action = logger.on_response(&request, ResponseInfo::new(503)).unwrap();
        assert!(!action.is_visible());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn request_line_is_written_at_most_once() {
        // Every interleaving of timer firing and completion/failure.
        for (wait_ms, fail) in [(10, false), (10, true), (1500, false), (1500, true)] {
            let (logger, sink) = logger(1000.0);
            let request = get("req-11", "/race");

            logger.on_request(&request);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            if fail {
                logger.on_error(&request, Some(500), ErrorPayload::new("late"));
            } else {
                logger.on_response(&request, ResponseInfo::new(500));
            }
            tokio::time::sleep(Duration::from_millis(3000)).await;

            let request_lines = sink
                .info_lines()
                .into_iter()
                .filter(|line| line == "[req-11] GET /race")
                .count();
            assert_eq!(request_lines, 1, "wait {} fail {}", wait_ms, fail);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_cancels_the_timer() {
        let (logger, sink) = logger(1000.0);
        let request = get("req-12", "/gone");

        logger.on_request(&request);
        logger.abandon(&request.id);
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(logger.in_flight(), 0);
        assert!(sink.is_empty());
    }

    /// Blocks while writing request lines, so a timer task holding the line
    /// overlaps the completion running on another thread.
    struct StallingSink {
        inner: MemorySink,
        stall: Duration,
    }

    impl LogSink for StallingSink {
        fn info(&self, line: &str) {
            if !line.contains('↳') {
                std::thread::sleep(self.stall);
            }
            self.inner.info(line);
        }

        fn error(&self, line: &str) {
            self.inner.error(line);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn request_line_precedes_response_across_threads() {
        let sink = Arc::new(StallingSink {
            inner: MemorySink::new(),
            stall: Duration::from_millis(200),
        });
        let options = LoggingOptions::default()
            .with_slow_threshold_ms(20.0)
            .with_shared_logger(sink.clone());
        let logger = RequestLogger::new(options);
        let request = get("req-20", "/slow");

        logger.on_request(&request);
        // The timer fires at 20ms and is still writing when the response arrives.
        tokio::time::sleep(Duration::from_millis(60)).await;
        logger.on_response(&request, ResponseInfo::new(200));

        let lines: Vec<String> = sink.inner.info_lines().iter().map(|l| strip_ansi(l)).collect();
        assert_eq!(lines.len(), 2, "{:?}", lines);
        assert_eq!(lines[0], "[req-20] GET /slow");
        assert!(lines[1].starts_with("[req-20] ↳ 200 [SLOW]"), "{}", lines[1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_write_one_leading_request_line_each() {
        let sink = Arc::new(MemorySink::new());
        let options = LoggingOptions::default()
            .with_slow_threshold_ms(1.0)
            .with_shared_logger(sink.clone());
        let logger = Arc::new(RequestLogger::new(options));

        let mut tasks = Vec::new();
        for n in 0..200u64 {
            let logger = Arc::clone(&logger);
            tasks.push(tokio::spawn(async move {
                let request = RequestInfo::new(format!("mt-{}", n), "GET", "/race");
                logger.on_request(&request);
                // Straddle the threshold so timers and completions collide.
                tokio::time::sleep(Duration::from_micros(500 + n * 10)).await;
                if n % 2 == 0 {
                    logger.on_response(&request, ResponseInfo::new(500));
                } else {
                    logger.on_error(&request, None, ErrorPayload::new("late"));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(logger.in_flight(), 0);

        let lines = sink.lines();
        for n in 0..200u64 {
            let prefix = format!("[mt-{}] ", n);
            let own: Vec<&str> = lines
                .iter()
                .filter(|entry| entry.line.starts_with(&prefix))
                .map(|entry| entry.line.as_str())
                .collect();
            let request_line = format!("[mt-{}] GET /race", n);

            let positions: Vec<usize> = own
                .iter()
                .enumerate()
                .filter(|(_, line)| **line == request_line)
                .map(|(index, _)| index)
                .collect();
            assert_eq!(positions, vec![0], "request {}: {:?}", n, own);
            assert_eq!(own.len(), 2, "request {}: {:?}", n, own);
        }
    }

    #[test]
    fn filters_see_the_phase_and_payload() {
        let sink = Arc::new(MemorySink::new());
        let options = LoggingOptions::default()
            .with_shared_logger(sink.clone())
            .with_filter(|ctx: &LogContext| {
                let flagged = ctx.phase() == LogPhase::Response
                    && matches!(ctx.payload(), Payload::Text(text) if text.contains("secret"));
                flagged.then(|| ActionPatch::default().with_color(LogColor::Dim).with_tag("REDACTED"))
            });
        let logger = RequestLogger::new(options);
        let request = get("req-13", "/vault");

        logger.on_request(&request);
        let action = logger
            .on_response(&request, ResponseInfo::new(200).with_payload("top secret"))
            .unwrap();
        assert_eq!(action.tag.as_deref(), Some("REDACTED"));
        assert_eq!(action.color, Some(LogColor::Dim));
    }
}
