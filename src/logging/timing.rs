//! Request timing on the monotonic clock.
//!
//! Uses `tokio::time::Instant`, which is monotonic like `std::time::Instant`
//! and also follows the paused clock in tests.

use tokio::time::Instant;

/// Start instant of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStart(Instant);

impl RequestStart {
    /// Milliseconds elapsed since start, measured now
    pub fn elapsed_ms(&self) -> f64 {
        self.0.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed time as a label such as `12ms` or `12.3ms`
    pub fn format_elapsed(&self) -> String {
        format_duration_ms(self.elapsed_ms())
    }
}

/// Record the current instant
pub fn mark_start() -> RequestStart {
    RequestStart(Instant::now())
}

pub fn elapsed_ms(start: RequestStart) -> f64 {
    start.elapsed_ms()
}

pub fn format_elapsed(start: RequestStart) -> String {
    start.format_elapsed()
}

/// Round to the nearest tenth of a millisecond; whole values drop the decimal
pub fn format_duration_ms(ms: f64) -> String {
    let rounded = (ms * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}ms", rounded as i64)
    } else {
        format!("{:.1}ms", rounded)
    }
}
