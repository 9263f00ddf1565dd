//! Log sinks: where fully formatted lines end up.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Destination for formatted lines
///
/// Implementations must not panic; write failures are the sink's own problem.
/// Lines from different requests may arrive interleaved.
pub trait LogSink: Send + Sync {
    fn info(&self, line: &str);
    fn error(&self, line: &str);
}

impl<T> LogSink for Arc<T>
where
    T: LogSink + ?Sized,
{
    fn info(&self, line: &str) {
        (**self).info(line)
    }

    fn error(&self, line: &str) {
        (**self).error(line)
    }
}

/// Default sink: `info` to stdout, `error` to stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioSink;

impl LogSink for StdioSink {
    fn info(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }

    fn error(&self, line: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }
}

/// Forwards lines to `tracing` under the `smart_logging` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, line: &str) {
        tracing::info!(target: "smart_logging", "{}", line);
    }

    fn error(&self, line: &str) {
        tracing::error!(target: "smart_logging", "{}", line);
    }
}

/// Which sink method received a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkChannel {
    Info,
    Error,
}

/// One captured line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedLine {
    pub channel: SinkChannel,
    pub line: String,
}

/// Collects lines in memory, in arrival order. Meant for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LoggedLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line in arrival order
    pub fn lines(&self) -> Vec<LoggedLine> {
        self.lines.lock().clone()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.collect(SinkChannel::Info)
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.collect(SinkChannel::Error)
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    fn collect(&self, channel: SinkChannel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|entry| entry.channel == channel)
            .map(|entry| entry.line.clone())
            .collect()
    }

    fn push(&self, channel: SinkChannel, line: &str) {
        self.lines.lock().push(LoggedLine {
            channel,
            line: line.to_string(),
        });
    }
}

impl LogSink for MemorySink {
    fn info(&self, line: &str) {
        self.push(SinkChannel::Info, line);
    }

    fn error(&self, line: &str) {
        self.push(SinkChannel::Error, line);
    }
}
