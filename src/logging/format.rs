//! # Line Formatting
//!
//! Turns a [`LogAction`] and a [`LogContext`] into the text lines handed to
//! the sink:
//!
//! ```text
//! [req-7] GET /orders/42
//! [req-7] ↳ 404 [WARN] {"message":"no such order"} 27B in 3.2ms
//! [req-8] × POST /orders → 500 12.4ms database unavailable
//! [req-8] Error stack: ...
//! ```
//!
//! Colors come from the `colored` crate, which honors `NO_COLOR` and
//! `CLICOLOR_FORCE`.

use colored::Colorize;

use crate::core::types::Payload;
use crate::logging::context::LogContext;
use crate::logging::decision::{LogAction, LogColor};
use crate::logging::humanize::{humanize_bytes, humanize_time};

/// Size token used when the payload length is unknown
pub const UNKNOWN_SIZE: &str = "???B";

/// Duration label used when no start instant was recorded
pub const UNKNOWN_DURATION: &str = "-";

fn paint(text: &str, color: LogColor) -> String {
    match color {
        LogColor::Red => text.red().to_string(),
        LogColor::Yellow => text.yellow().to_string(),
        LogColor::Dim => text.dimmed().to_string(),
    }
}

/// Status code colored by the action, or by convention when the action has no color
pub fn format_status(status_code: u16, action: &LogAction) -> String {
    let text = status_code.to_string();
    let color = action.color.or(match status_code {
        500..=u16::MAX => Some(LogColor::Red),
        400..=499 => Some(LogColor::Yellow),
        _ => None,
    });

    match color {
        Some(color) => paint(&text, color),
        None => text,
    }
}

/// Display text for a payload, cut to `max_length` characters plus `...`
///
/// Returns `None` for empty or falsy payloads (empty text, `null`, `false`,
/// `0`). Never panics: structured values that fail to serialize, including
/// self-referential ones, render as `<type name>`.
pub fn format_body(payload: &Payload, max_length: usize) -> Option<String> {
    let text = stringify_payload(payload)?;
    Some(truncate_chars(text, max_length))
}

fn stringify_payload(payload: &Payload) -> Option<String> {
    let text = match payload {
        Payload::Empty => return None,
        Payload::Text(text) => text.clone(),
        Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Payload::Error(error) => error.message().to_string(),
        Payload::Json(value) => match value {
            serde_json::Value::Null | serde_json::Value::Bool(false) => return None,
            serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => return None,
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => value.to_string(),
            _ => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        },
        Payload::Structured(value) => value
            .to_pretty_json()
            .unwrap_or_else(|_| format!("<{}>", value.type_name())),
    };

    (!text.is_empty()).then_some(text)
}

fn truncate_chars(text: String, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

/// `[id] METHOD url`
pub fn format_request_line(ctx: &LogContext) -> String {
    format!("[{}] {} {}", ctx.request_id(), ctx.method(), ctx.url())
}

/// `[id] ↳ status [TAG] body size in duration`, optional parts omitted
///
/// The body is only rendered for statuses of 400 and above.
pub fn format_response_line(
    ctx: &LogContext,
    action: &LogAction,
    payload_length: Option<u64>,
    max_body_length: usize,
) -> String {
    let status_code = ctx.status_code().unwrap_or(0);

    let mut parts = vec![format!(
        "[{}] ↳ {}",
        ctx.request_id(),
        format_status(status_code, action)
    )];

    if let Some(tag) = action.tag.as_deref().filter(|tag| !tag.is_empty()) {
        parts.push(format!("[{}]", tag));
    }

    if status_code >= 400 {
        if let Some(body) = format_body(ctx.payload(), max_body_length) {
            parts.push(body.dimmed().to_string());
        }
    }

    parts.push(match payload_length {
        Some(length) if length > 0 => humanize_bytes(length),
        _ => UNKNOWN_SIZE.to_string(),
    });

    parts.push(format!("in {}", humanize_time(ctx.duration_ms().unwrap_or(0.0))));

    parts.join(" ")
}

/// `[id] × METHOD url → status duration message`
pub fn format_error_main_line(ctx: &LogContext, action: &LogAction, duration_label: &str, status: u16) -> String {
    let message = ctx.error_payload().map(|error| error.message()).unwrap_or_default();
    format!(
        "[{}] × {} {} → {} {} {}",
        ctx.request_id(),
        ctx.method(),
        ctx.url(),
        format_status(status, action),
        duration_label,
        message
    )
}

/// Dimmed `[id] Error stack: ...`, only when the error carries a stack
pub fn format_error_stack_line(ctx: &LogContext) -> Option<String> {
    let stack = ctx.error_payload()?.stack()?;
    let line = format!("[{}] Error stack: {}", ctx.request_id(), stack);
    Some(line.dimmed().to_string())
}
