//! Structured logging through an injected sink
//!
//! - One log record = one [`Event`] plus string fields
//! - Fields are emitted in alphabetical order
//! - Synchronous, on the caller's thread
//! - Logging never fails the operation being logged

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable misconfiguration
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination for log records. The host application chooses one and owns its lifecycle.
pub trait LogSink: Send + Sync {
    /// Write a single record
    fn write(&self, severity: Severity, event: &str, fields: &[(&str, &str)]);
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn sorted<'a>(fields: &'a [(&'a str, &'a str)]) -> Vec<&'a (&'a str, &'a str)> {
    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);
    sorted_fields
}

/// Cloneable logging handle passed into every component
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Create a logger writing to the given sink
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger forwarding to the `tracing` ecosystem
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: Event, fields: &[(&str, &str)]) {
        self.sink.write(severity, event.as_str(), fields);
    }

    /// Log at TRACE level
    pub fn trace(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Fatal, event, fields);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Forwards records to `tracing` under the `ossgate` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let rendered = sorted(fields)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        match severity {
            Severity::Trace => tracing::trace!(target: "ossgate", fields = %rendered, "{}", event),
            Severity::Info => tracing::info!(target: "ossgate", fields = %rendered, "{}", event),
            Severity::Warn => tracing::warn!(target: "ossgate", fields = %rendered, "{}", event),
            Severity::Error => tracing::error!(target: "ossgate", fields = %rendered, "{}", event),
            Severity::Fatal => {
                tracing::error!(target: "ossgate", fatal = true, fields = %rendered, "{}", event)
            }
        }
    }
}

/// Writes one JSON object per line: event, severity, then fields alphabetically
pub struct JsonSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonSink<io::Stdout> {
    /// JSON lines on stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(256);
        output.push('{');
        output.push_str("\"event\":");
        output.push_str(&quote(event));
        output.push_str(",\"severity\":");
        output.push_str(&quote(severity.as_str()));
        for (key, value) in sorted(fields) {
            output.push(',');
            output.push_str(&quote(key));
            output.push(':');
            output.push_str(&quote(value));
        }
        output.push('}');
        output.push('\n');
        output
    }
}

impl<W: Write + Send> LogSink for JsonSink<W> {
    fn write(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

/// A captured log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub event: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Look up a field value by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory sink. Clones share the same record buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A logger writing into this sink
    pub fn logger(&self) -> Logger {
        Logger::new(Arc::new(self.clone()))
    }

    /// All recorded entries
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Records for one event
    pub fn records_for(&self, event: Event) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event.as_str())
            .collect()
    }

    /// True if the event was logged at least once
    pub fn contains(&self, event: Event) -> bool {
        !self.records_for(event).is_empty()
    }

    /// Number of records at the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.records().iter().filter(|r| r.severity == severity).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

impl LogSink for MemorySink {
    fn write(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let record = LogRecord {
            severity,
            event: event.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}
