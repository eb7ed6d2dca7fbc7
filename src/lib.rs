//! ossgate - A strict, synchronous facade over OSS-style object storage
//!
//! - Visibility decides object ACLs and the kind of URL handed back
//! - Private objects get presigned, expiring URLs; public ones get plain URLs
//! - Transfers report progress to a per-call listener
//! - Provider failures are logged and surface as empty results

pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod errors;
pub mod observability;
pub mod policy;
pub mod progress;
pub mod provider;
pub mod source;
pub mod url;

#[cfg(test)]
mod testing;

pub use client::{OssClient, Progress, TransferOptions};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{OssConfig, WritePolicy};
pub use errors::{OssError, OssErrorCode, OssResult};
pub use observability::{Event, Logger, Severity};
pub use policy::{AccessPolicy, CannedAcl, Visibility};
pub use progress::{ProgressListener, TransferEvent, TransferObserver, TransferPhase};
pub use provider::{LocalProvider, OssProvider, StorageProvider};
pub use source::ObjectSource;
