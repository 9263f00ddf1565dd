//! Human-readable sizes and durations for log lines.

use std::time::Duration;

use crate::logging::timing::format_duration_ms;

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// `512B`, `1.5KB`, `2MB`... (1024 base, at most one decimal)
pub fn humanize_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as u64, BYTE_UNITS[unit])
    } else {
        format!("{:.1}{}", rounded, BYTE_UNITS[unit])
    }
}

/// Durations under a second in milliseconds (`42ms`, `0.3ms`), longer ones
/// via `humantime` at millisecond precision (`1s 250ms`, `2m 5s`)
pub fn humanize_time(duration_ms: f64) -> String {
    if !duration_ms.is_finite() || duration_ms <= 0.0 {
        return "0ms".to_string();
    }

    if duration_ms < 1000.0 {
        return format_duration_ms(duration_ms);
    }

    let millis = duration_ms.round() as u64;
    humantime::format_duration(Duration::from_millis(millis)).to_string()
}
