//! # Decision Pipeline
//!
//! Filters map a [`LogContext`] to an optional [`ActionPatch`]. The pipeline
//! starts from a default [`LogAction`] and merges every patch in order, so the
//! last filter that sets a field wins that field.
//!
//! Built-in filters run first, in this order:
//! 1. [`BaseVisibilityFilter`] decides show/hide
//! 2. [`SlowColorFilter`] marks slow responses yellow / `SLOW`
//! 3. [`ErrorColorFilter`] marks 4xx yellow / `WARN` and 5xx red / `ERROR`
//!
//! User filters run after them and may override anything.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::ResolvedOptions;
use crate::logging::context::LogContext;

/// Whether a line is ultimately emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Show,
    #[default]
    Hide,
}

/// Color applied to the status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogColor {
    Red,
    Yellow,
    Dim,
}

/// Final logging decision for one context
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogAction {
    pub visibility: Visibility,
    pub color: Option<LogColor>,
    pub tag: Option<String>,
}

impl LogAction {
    /// The canonical starting point: hidden, no color, no tag
    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Show
    }

    /// Overwrite every field the patch sets
    pub fn apply(&mut self, patch: ActionPatch) {
        if let Some(visibility) = patch.visibility {
            self.visibility = visibility;
        }
        if let Some(color) = patch.color {
            self.color = Some(color);
        }
        if let Some(tag) = patch.tag {
            self.tag = Some(tag);
        }
    }
}

/// Partial decision contributed by one filter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionPatch {
    pub visibility: Option<Visibility>,
    pub color: Option<LogColor>,
    pub tag: Option<String>,
}

impl ActionPatch {
    pub fn show() -> Self {
        Self {
            visibility: Some(Visibility::Show),
            ..Default::default()
        }
    }

    pub fn hide() -> Self {
        Self {
            visibility: Some(Visibility::Hide),
            ..Default::default()
        }
    }

    /// Color and tag without touching visibility
    pub fn annotate<S: Into<String>>(color: LogColor, tag: S) -> Self {
        Self {
            visibility: None,
            color: Some(color),
            tag: Some(tag.into()),
        }
    }

    pub fn with_color(mut self, color: LogColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// A pure function contributing an optional partial decision
///
/// Implemented for every `Fn(&LogContext) -> Option<ActionPatch>` closure, so
/// custom filters are usually written inline:
///
/// ```ignore
/// let options = LoggingOptions::default().with_filter(|ctx: &LogContext| {
///     (ctx.url() == "/health").then(ActionPatch::hide)
/// });
/// ```
pub trait LogFilter: Send + Sync {
    /// Return `None` for "no opinion"
    fn evaluate(&self, ctx: &LogContext) -> Option<ActionPatch>;
}

impl<F> LogFilter for F
where
    F: Fn(&LogContext) -> Option<ActionPatch> + Send + Sync,
{
    fn evaluate(&self, ctx: &LogContext) -> Option<ActionPatch> {
        self(ctx)
    }
}

/// Shared handle to a filter
pub type SharedFilter = Arc<dyn LogFilter>;

/// Computes the base show/hide decision from slowness and status
#[derive(Debug, Clone, Copy)]
pub struct BaseVisibilityFilter {
    slow_threshold_ms: f64,
    log_non_successes: bool,
}

impl BaseVisibilityFilter {
    pub fn new(slow_threshold_ms: f64, log_non_successes: bool) -> Self {
        Self {
            slow_threshold_ms,
            log_non_successes,
        }
    }
}

impl LogFilter for BaseVisibilityFilter {
    fn evaluate(&self, ctx: &LogContext) -> Option<ActionPatch> {
        if !ctx.is_outcome() {
            return None;
        }

        let status = ctx.status_code().unwrap_or(0);
        let duration_ms = ctx.duration_ms().unwrap_or(0.0);

        if self.slow_threshold_ms > 0.0 && duration_ms >= self.slow_threshold_ms {
            return Some(ActionPatch::show());
        }

        if self.log_non_successes && !(200..300).contains(&status) {
            return Some(ActionPatch::show());
        }

        // Without a threshold the layer behaves like a plain access logger.
        if self.slow_threshold_ms == 0.0 {
            return Some(ActionPatch::show());
        }

        Some(ActionPatch::hide())
    }
}

/// Marks responses at or above the slow threshold
#[derive(Debug, Clone, Copy)]
pub struct SlowColorFilter {
    slow_threshold_ms: f64,
}

impl SlowColorFilter {
    pub fn new(slow_threshold_ms: f64) -> Self {
        Self { slow_threshold_ms }
    }
}

impl LogFilter for SlowColorFilter {
    fn evaluate(&self, ctx: &LogContext) -> Option<ActionPatch> {
        if self.slow_threshold_ms <= 0.0 || !ctx.is_outcome() {
            return None;
        }

        let duration_ms = ctx.duration_ms().unwrap_or(0.0);
        (duration_ms >= self.slow_threshold_ms).then(|| ActionPatch::annotate(LogColor::Yellow, "SLOW"))
    }
}

/// Marks client and server errors
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorColorFilter;

impl LogFilter for ErrorColorFilter {
    fn evaluate(&self, ctx: &LogContext) -> Option<ActionPatch> {
        if !ctx.is_outcome() {
            return None;
        }

        match ctx.status_code().unwrap_or(0) {
            status if status >= 500 => Some(ActionPatch::annotate(LogColor::Red, "ERROR")),
            status if status >= 400 => Some(ActionPatch::annotate(LogColor::Yellow, "WARN")),
            _ => None,
        }
    }
}

/// Built-in filters followed by the user's filters
pub fn build_filter_chain(options: &ResolvedOptions) -> Vec<SharedFilter> {
    let mut filters: Vec<SharedFilter> = vec![
        Arc::new(BaseVisibilityFilter::new(
            options.slow_threshold_ms,
            options.log_non_successes,
        )),
        Arc::new(SlowColorFilter::new(options.slow_threshold_ms)),
        Arc::new(ErrorColorFilter),
    ];
    filters.extend(options.filters.iter().cloned());
    filters
}

/// Merge every filter's patch, in order, into a copy of `default_action`
pub fn evaluate_filters(ctx: &LogContext, filters: &[SharedFilter], default_action: &LogAction) -> LogAction {
    let mut action = default_action.clone();
    for filter in filters {
        if let Some(patch) = filter.evaluate(ctx) {
            action.apply(patch);
        }
    }
    action
}
