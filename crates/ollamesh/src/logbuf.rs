//! Tracing subscriber layer that captures log events into a shared
//! in-memory buffer.
//!
//! Frontends (a TUI, a web view, a diagnostics endpoint) drain the buffer
//! at their own pace. The buffer has its own mutex, so logging from tokio
//! workers never contends with whatever the frontend is doing.

use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::Subscriber;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

/// Hard cap on buffered lines before trimming kicks in.
pub const MAX_LOG_LINES: usize = 2000;
/// Number of lines kept after a trim.
pub const LOG_TRIM_TO: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One captured log event.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Wall-clock time, `%H:%M:%S`.
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// A shared buffer of pending log lines.
///
/// The tracing layer pushes into this buffer; a frontend drains it
/// periodically. Cloning shares the same underlying buffer.
#[derive(Clone)]
pub struct LogBuffer(Arc<Mutex<Vec<LogLine>>>);

impl LogBuffer {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::with_capacity(128))))
    }

    /// Drain all pending log lines, returning them in arrival order.
    pub fn drain(&self) -> Vec<LogLine> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, line: LogLine) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.push(line);
        // Cap the buffer so a burst of logs before the next drain doesn't
        // consume unbounded memory.
        if buf.len() > MAX_LOG_LINES {
            let trim_to = buf.len() - LOG_TRIM_TO;
            buf.drain(..trim_to);
        }
    }
}

/// A [`tracing_subscriber::Layer`] that captures events into a
/// [`LogBuffer`].
pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl LogCaptureLayer {
    /// Create the layer and its associated buffer. Hand the buffer to
    /// whatever frontend wants to display the log.
    pub fn new() -> (Self, LogBuffer) {
        let buffer = LogBuffer::new();
        (
            Self {
                buffer: buffer.clone(),
            },
            buffer,
        )
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for LogCaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let level = match *event.metadata().level() {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        };

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if message.is_empty() {
                message = extras.join(" ");
            } else {
                message = format!("{message} {{{}}}", extras.join(", "));
            }
        }

        self.buffer.push(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level,
            message,
        });
    }
}

/// Visitor that extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let raw = format!("{value:?}");
            // Strip surrounding quotes from debug-formatted strings.
            if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
                #[allow(clippy::string_slice)] // stripping 1-byte ASCII quote chars
                {
                    self.message = raw[1..raw.len() - 1].to_string();
                }
            } else {
                self.message = raw;
            }
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn events_land_in_the_buffer() {
        let (layer, buffer) = LogCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first line");
            tracing::warn!(node = "pi", "probe failed");
        });

        let lines = buffer.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, LogLevel::Info);
        assert_eq!(lines[0].message, "first line");
        assert_eq!(lines[1].level, LogLevel::Warn);
        assert!(lines[1].message.contains("probe failed"));
        assert!(lines[1].message.contains("node=pi"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_trims_under_burst() {
        let (layer, buffer) = LogCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..(MAX_LOG_LINES + 100) {
                tracing::info!("line {i}");
            }
        });
        assert!(buffer.len() <= MAX_LOG_LINES);
        // The newest lines survive the trim.
        let lines = buffer.drain();
        let last = lines.last().unwrap();
        assert!(last.message.ends_with(&format!("{}", MAX_LOG_LINES + 99)));
    }
}
