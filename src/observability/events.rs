//! Observable events for the OSS client
//!
//! Every log record names exactly one of these events.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Provider session established
    ClientConnected,
    /// Connection refused because configuration is incomplete
    ClientConnectFailed,
    /// Operation attempted on an unconnected client
    ClientNotConnected,
    /// Configuration loaded from file or environment
    ConfigLoaded,

    // Objects
    /// Object written
    ObjectPut,
    /// Object write skipped because the key already exists
    ObjectPutSkipped,
    /// Object write failed
    ObjectPutFailed,
    /// Object read to completion
    ObjectFetched,
    /// Object read failed
    ObjectGetFailed,
    /// Object deleted
    ObjectDeleted,
    /// Object delete failed
    ObjectDeleteFailed,
    /// Object existence check failed
    ObjectExistsFailed,

    // Buckets
    /// Bucket created
    BucketCreated,
    /// Bucket already present, creation skipped
    BucketAlreadyPresent,
    /// Bucket creation failed
    BucketCreateFailed,
    /// Bucket listing failed
    BucketListFailed,
    /// Bucket existence check failed
    BucketExistsFailed,
    /// Bucket info lookup failed
    BucketInfoFailed,
    /// Bucket deleted
    BucketDeleted,
    /// Bucket delete failed
    BucketDeleteFailed,

    // URLs
    /// Signed URL request failed
    UrlSignFailed,

    // Transfers
    /// Transfer started
    TransferStarted,
    /// Total transfer size reported
    TransferContentLength,
    /// Bytes moved
    TransferProgress,
    /// Transfer completed
    TransferCompleted,
    /// Transfer failed
    TransferFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ClientConnected => "OSS_CLIENT_CONNECTED",
            Event::ClientConnectFailed => "OSS_CLIENT_CONNECT_FAILED",
            Event::ClientNotConnected => "OSS_CLIENT_NOT_CONNECTED",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::ObjectPut => "OBJECT_PUT",
            Event::ObjectPutSkipped => "OBJECT_PUT_SKIPPED",
            Event::ObjectPutFailed => "OBJECT_PUT_FAILED",
            Event::ObjectFetched => "OBJECT_FETCHED",
            Event::ObjectGetFailed => "OBJECT_GET_FAILED",
            Event::ObjectDeleted => "OBJECT_DELETED",
            Event::ObjectDeleteFailed => "OBJECT_DELETE_FAILED",
            Event::ObjectExistsFailed => "OBJECT_EXISTS_FAILED",

            Event::BucketCreated => "BUCKET_CREATED",
            Event::BucketAlreadyPresent => "BUCKET_ALREADY_PRESENT",
            Event::BucketCreateFailed => "BUCKET_CREATE_FAILED",
            Event::BucketListFailed => "BUCKET_LIST_FAILED",
            Event::BucketExistsFailed => "BUCKET_EXISTS_FAILED",
            Event::BucketInfoFailed => "BUCKET_INFO_FAILED",
            Event::BucketDeleted => "BUCKET_DELETED",
            Event::BucketDeleteFailed => "BUCKET_DELETE_FAILED",

            Event::UrlSignFailed => "URL_SIGN_FAILED",

            Event::TransferStarted => "TRANSFER_STARTED",
            Event::TransferContentLength => "TRANSFER_CONTENT_LENGTH",
            Event::TransferProgress => "TRANSFER_PROGRESS",
            Event::TransferCompleted => "TRANSFER_COMPLETED",
            Event::TransferFailed => "TRANSFER_FAILED",
        }
    }

    /// Returns true if this event records a failed operation
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::ClientConnectFailed
                | Event::ClientNotConnected
                | Event::ObjectPutFailed
                | Event::ObjectGetFailed
                | Event::ObjectDeleteFailed
                | Event::ObjectExistsFailed
                | Event::BucketCreateFailed
                | Event::BucketListFailed
                | Event::BucketExistsFailed
                | Event::BucketInfoFailed
                | Event::BucketDeleteFailed
                | Event::UrlSignFailed
                | Event::TransferFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
