//! # Request Logging Integration Tests
//!
//! Drives the logging layer through real axum routers and checks the lines
//! that reach the sink.

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use axum_test::TestServer;
use serde_json::json;
use smart_logging::{
    ActionPatch, HandlerError, LogColor, LogContext, LoggingOptions, MemorySink, RequestId,
    SmartLoggingLayer,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

fn strip_ansi(text: &str) -> String {
    regex::Regex::new(r"\x1b\[[0-9;]*m")
        .unwrap()
        .replace_all(text, "")
        .into_owned()
}

fn plain(lines: Vec<String>) -> Vec<String> {
    lines.iter().map(|line| strip_ansi(line)).collect()
}

fn app(options: LoggingOptions) -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                "done"
            }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"message": "no such widget"}))) }),
        )
        .route(
            "/explode",
            get(|| async { Err::<&'static str, _>(HandlerError::internal("database unavailable")) }),
        )
        .route(
            "/teapot",
            get(|| async { Err::<&'static str, _>(HandlerError::new(StatusCode::IM_A_TEAPOT, "short and stout")) }),
        )
        .route(
            "/id",
            get(|Extension(id): Extension<RequestId>| async move { id.to_string() }),
        )
        .layer(SmartLoggingLayer::new(options))
}

fn options(sink: &Arc<MemorySink>, threshold: f64) -> LoggingOptions {
    LoggingOptions::new()
        .with_slow_threshold_ms(threshold)
        .with_logger(Arc::clone(sink))
}

async fn get_status(router: Router, uri: &str) -> StatusCode {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_zero_threshold_logs_request_and_response() {
    let sink = Arc::new(MemorySink::new());
    let status = get_status(app(options(&sink, 0.0)), "/ok").await;
    assert_eq!(status, StatusCode::OK);

    let lines = plain(sink.info_lines());
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert!(lines[0].starts_with("[req-") && lines[0].ends_with("] GET /ok"));
    assert!(lines[1].contains("↳ 200 2B in "), "{}", lines[1]);
    assert!(sink.error_lines().is_empty());
}

#[tokio::test]
async fn test_fast_success_is_silent() {
    let sink = Arc::new(MemorySink::new());
    get_status(app(options(&sink, 1000.0)), "/ok").await;
    assert!(sink.is_empty(), "{:?}", sink.lines());
}

#[tokio::test]
async fn test_query_string_is_part_of_the_url() {
    let sink = Arc::new(MemorySink::new());
    get_status(app(options(&sink, 0.0)), "/ok?page=2").await;

    let lines = plain(sink.info_lines());
    assert!(lines[0].ends_with("GET /ok?page=2"), "{}", lines[0]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_request_is_logged_before_it_completes() {
    let sink = Arc::new(MemorySink::new());
    let router = app(options(&sink, 1000.0));

    let call = tokio::spawn(get_status(router, "/slow"));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let pending = plain(sink.info_lines());
    assert_eq!(pending.len(), 1, "{:?}", pending);
    assert!(pending[0].ends_with("GET /slow"));

    assert_eq!(call.await.unwrap(), StatusCode::OK);

    let lines = plain(sink.info_lines());
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert!(lines[1].contains("↳ 200 [SLOW] 4B in 1s"), "{}", lines[1]);
}

#[tokio::test]
async fn test_not_found_shows_body() {
    let sink = Arc::new(MemorySink::new());
    let status = get_status(app(options(&sink, 1000.0)), "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let lines = plain(sink.info_lines());
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert!(lines[0].ends_with("GET /missing"));
    assert!(
        lines[1].contains(r#"↳ 404 {"message":"no such widget"} 28B in "#),
        "{}",
        lines[1]
    );
}

#[tokio::test]
async fn test_non_successes_can_be_silenced() {
    let sink = Arc::new(MemorySink::new());
    let options = options(&sink, 1000.0).with_log_non_successes(false);
    get_status(app(options), "/missing").await;
    assert!(sink.is_empty(), "{:?}", sink.lines());
}

#[tokio::test]
async fn test_error_bodies_are_truncated() {
    let sink = Arc::new(MemorySink::new());
    let options = options(&sink, 1000.0).with_max_body_length(10);
    get_status(app(options), "/missing").await;

    let lines = plain(sink.info_lines());
    assert!(lines[1].contains(r#"↳ 404 {"message"... 28B"#), "{}", lines[1]);
}

#[tokio::test]
async fn test_handler_error_goes_to_error_channel() {
    let sink = Arc::new(MemorySink::new());
    let status = get_status(app(options(&sink, 1000.0)), "/explode").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let info = plain(sink.info_lines());
    assert_eq!(info.len(), 1, "{:?}", info);
    assert!(info[0].ends_with("GET /explode"));

    let errors = plain(sink.error_lines());
    assert!(!errors.is_empty());
    assert!(errors[0].contains("× GET /explode → 500 "), "{}", errors[0]);
    assert!(errors[0].ends_with("database unavailable"), "{}", errors[0]);
}

#[tokio::test]
async fn test_handler_error_keeps_its_status() {
    let sink = Arc::new(MemorySink::new());
    let status = get_status(app(options(&sink, 0.0)), "/teapot").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);

    let info = plain(sink.info_lines());
    assert_eq!(info.len(), 1, "request line must be written once: {:?}", info);

    let errors = plain(sink.error_lines());
    assert!(errors[0].contains("→ 418 "), "{}", errors[0]);
    assert!(errors[0].ends_with("short and stout"));
}

#[tokio::test]
async fn test_server_failures_are_red_and_client_failures_yellow() {
    colored::control::set_override(true);

    let sink = Arc::new(MemorySink::new());
    let router = app(options(&sink, 1000.0));
    get_status(router.clone(), "/explode").await;
    get_status(router, "/teapot").await;

    let errors = sink.error_lines();
    assert!(errors[0].contains("\u{1b}[31m500\u{1b}[0m"), "{:?}", errors[0]);
    let teapot = errors.iter().find(|line| line.contains("/teapot")).unwrap();
    assert!(teapot.contains("\u{1b}[33m418\u{1b}[0m"), "{:?}", teapot);
}

#[tokio::test]
async fn test_custom_filter_hides_route() {
    let sink = Arc::new(MemorySink::new());
    let options = options(&sink, 0.0)
        .with_filter(|ctx: &LogContext| ctx.url().starts_with("/missing").then(ActionPatch::hide));
    get_status(app(options), "/missing").await;

    // The request line was written at start; only the response is hidden.
    let lines = plain(sink.info_lines());
    assert_eq!(lines.len(), 1, "{:?}", lines);
    assert!(lines[0].ends_with("GET /missing"));
}

#[tokio::test]
async fn test_custom_filter_overrides_color_and_tag() {
    let sink = Arc::new(MemorySink::new());
    let options = options(&sink, 1000.0).with_filter(|ctx: &LogContext| {
        (ctx.url() == "/ok").then(|| ActionPatch::show().with_color(LogColor::Dim).with_tag("AUDIT"))
    });
    get_status(app(options), "/ok").await;

    let lines = plain(sink.info_lines());
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert!(lines[1].contains("↳ 200 [AUDIT] 2B"), "{}", lines[1]);
}

#[tokio::test]
async fn test_request_id_is_available_to_handlers() {
    let sink = Arc::new(MemorySink::new());
    let router = app(options(&sink, 0.0));

    let request = Request::builder().uri("/id").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let id = String::from_utf8(body.to_vec()).unwrap();

    assert!(id.starts_with("req-"));
    let lines = plain(sink.info_lines());
    assert!(lines[0].starts_with(&format!("[{}] ", id)), "{}", lines[0]);
}

#[tokio::test]
async fn test_inner_service_errors_pass_through() {
    let sink = Arc::new(MemorySink::new());
    let layer = SmartLoggingLayer::new(options(&sink, 1000.0));
    let logger = layer.logger();

    let service = layer.layer(service_fn(|_request: Request| async {
        Err::<axum::response::Response, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "upstream hung up",
        ))
    }));

    let request = Request::builder().method("POST").uri("/upload").body(Body::empty()).unwrap();
    let error = service.oneshot(request).await.unwrap_err();
    assert_eq!(error.kind(), std::io::ErrorKind::ConnectionReset);

    let errors = plain(sink.error_lines());
    assert!(errors[0].contains("× POST /upload → 500 "), "{}", errors[0]);
    assert!(errors[0].ends_with("upstream hung up"));
    assert_eq!(logger.in_flight(), 0);
}

#[derive(Debug, thiserror::Error)]
#[error("upload rejected")]
struct UploadError {
    #[source]
    source: std::io::Error,
}

#[tokio::test]
async fn test_inner_service_error_sources_become_the_stack() {
    let sink = Arc::new(MemorySink::new());
    let layer = SmartLoggingLayer::new(options(&sink, 1000.0));

    let service = layer.layer(service_fn(|_request: Request| async {
        Err::<axum::response::Response, _>(UploadError {
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }));

    let request = Request::builder().method("PUT").uri("/files/a").body(Body::empty()).unwrap();
    let error = service.oneshot(request).await.unwrap_err();
    assert_eq!(error.to_string(), "upload rejected");

    let errors = plain(sink.error_lines());
    assert_eq!(errors.len(), 2, "{:?}", errors);
    assert!(errors[0].contains("× PUT /files/a → 500 "), "{}", errors[0]);
    assert!(errors[0].ends_with("upload rejected"));
    assert!(errors[1].contains("Error stack: caused by: disk full"), "{}", errors[1]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_is_forgotten() {
    let sink = Arc::new(MemorySink::new());
    let layer = SmartLoggingLayer::new(options(&sink, 1000.0));
    let logger = layer.logger();

    let service = layer.layer(service_fn(|_request: Request| async {
        std::future::pending::<Result<axum::response::Response, Infallible>>().await
    }));

    let request = Request::builder().uri("/hang").body(Body::empty()).unwrap();
    let call = tokio::spawn(service.oneshot(request));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(logger.in_flight(), 1);

    call.abort();
    let _ = call.await;
    assert_eq!(logger.in_flight(), 0);

    // The deferred timer died with the record.
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(sink.is_empty(), "{:?}", sink.lines());
}

#[tokio::test]
async fn test_served_over_http() {
    let sink = Arc::new(MemorySink::new());
    let server = TestServer::new(app(options(&sink, 1000.0))).unwrap();

    let response = server.get("/ok").await;
    response.assert_status_ok();
    assert!(sink.is_empty());

    let response = server.get("/missing").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(sink.info_lines().len(), 2);
}
