// Snapshot of a request at one lifecycle phase
pub mod context;

// Filters and the merge pipeline
pub mod decision;

// Line formatting
pub mod format;

// Byte and duration humanization
pub mod humanize;

// Start/completion/failure orchestration
pub mod hooks;

// Log line destinations
pub mod sink;

// Monotonic request timing
pub mod timing;

pub use context::{LogContext, LogPhase};
pub use decision::{
    build_filter_chain, evaluate_filters, ActionPatch, BaseVisibilityFilter, ErrorColorFilter,
    LogAction, LogColor, LogFilter, SharedFilter, SlowColorFilter, Visibility,
};
pub use format::{
    format_body, format_error_main_line, format_error_stack_line, format_request_line,
    format_response_line, format_status,
};
pub use hooks::RequestLogger;
pub use sink::{LogSink, LoggedLine, MemorySink, SinkChannel, StdioSink, TracingSink};
