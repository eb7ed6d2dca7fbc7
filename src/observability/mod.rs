//! Observability subsystem for the OSS client
//!
//! There is no global logger. Each component holds a [`Logger`] handed to it at
//! construction; the host process decides where records go:
//!
//! - [`TracingSink`]: forwards to `tracing` (the default)
//! - [`JsonSink`]: JSON lines on any writer
//! - [`MemorySink`]: captures records, mostly for tests
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ossgate::observability::{Event, JsonSink, Logger};
//!
//! let logger = Logger::new(Arc::new(JsonSink::stdout()));
//! logger.info(Event::ObjectPut, &[("bucket", "media"), ("key", "a.png")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{JsonSink, LogRecord, LogSink, Logger, MemorySink, Severity, TracingSink};
