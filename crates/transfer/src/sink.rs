//! Line-oriented log sinks for user-facing progress output.

use std::io::Write;

use parking_lot::Mutex;

/// Destination for progress and retry notices.
///
/// Shared by concurrent operations writing to the same console, so
/// implementations must keep each line intact.
pub trait LogSink: Send + Sync {
    /// Write one line (without trailing newline).
    fn line(&self, message: &str);

    /// Push buffered output to its destination.
    fn flush(&self) {}
}

/// Sink forwarding every line to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Sink writing lines to any `io::Write`.
///
/// Write errors are dropped; progress output must never fail an operation.
#[derive(Debug)]
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn line(&self, message: &str) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", message);
    }

    fn flush(&self) {
        let _ = self.writer.lock().flush();
    }
}

/// Sink capturing lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    flushes: Mutex<usize>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of times the sink was flushed.
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

impl LogSink for MemorySink {
    fn line(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }

    fn flush(&self) {
        *self.flushes.lock() += 1;
    }
}
