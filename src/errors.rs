//! # Client Errors
//!
//! Two tiers of failure:
//! - fatal: configuration problems and use before connecting. Always returned as `Err`.
//! - non-fatal: provider and local I/O failures. Logged by the client and turned into
//!   an empty result (`None`, `false`, empty list) for the caller.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type for client operations
pub type OssResult<T> = Result<T, OssError>;

/// Stable error codes, formatted as OSS_CATEGORY_NAME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OssErrorCode {
    /// Missing credential, empty endpoint, malformed endpoint, bad expiration
    ConfigInvalid,
    /// Operation attempted before the provider session was established
    NotConnected,
    /// The storage provider rejected or failed the call
    ProviderFailed,
    /// Local file could not be read or written
    LocalIoFailed,
}

impl OssErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OssErrorCode::ConfigInvalid => "OSS_CONFIG_INVALID",
            OssErrorCode::NotConnected => "OSS_NOT_CONNECTED",
            OssErrorCode::ProviderFailed => "OSS_PROVIDER_FAILED",
            OssErrorCode::LocalIoFailed => "OSS_LOCAL_IO_FAILED",
        }
    }
}

impl fmt::Display for OssErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client errors
#[derive(Debug, Error)]
pub enum OssError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("OSS client is not connected")]
    NotConnected,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Local I/O error: {0}")]
    LocalIo(#[from] io::Error),
}

impl OssError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Get the error code
    pub fn code(&self) -> OssErrorCode {
        match self {
            OssError::Configuration(_) => OssErrorCode::ConfigInvalid,
            OssError::NotConnected => OssErrorCode::NotConnected,
            OssError::Provider(_) => OssErrorCode::ProviderFailed,
            OssError::LocalIo(_) => OssErrorCode::LocalIoFailed,
        }
    }

    /// Fatal errors abort the call and are never retried or swallowed
    pub fn is_fatal(&self) -> bool {
        matches!(self, OssError::Configuration(_) | OssError::NotConnected)
    }
}
