//! # Storage Provider
//!
//! The object-storage service the client fronts. Everything here is a thin contract:
//! the provider owns durability, naming rules, signing keys and its own retries.
//!
//! - [`OssProvider`]: the networked service, over blocking HTTP
//! - [`LocalProvider`]: a directory on disk speaking the same contract

pub mod local;
pub mod oss;
pub mod signer;

use std::fmt::Debug;
use std::io::{self, Read};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{CannedAcl, ObjectMetadata, RedundancyType, StorageClass};
use crate::progress::ProgressListener;

pub use local::LocalProvider;
pub use oss::OssProvider;
pub use signer::{Credentials, PresignedTarget, SignatureError, Signer};

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by the storage provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("Object not found: {0}")]
    NoSuchKey(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Service error {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProviderError {
    /// True for "does not exist" answers
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NoSuchBucket(_) | ProviderError::NoSuchKey(_))
    }
}

/// Upload request handed to the provider
pub struct PutObjectRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: Box<dyn Read + Send + 'a>,
    /// Exact size when the source knows it up front
    pub content_length: Option<u64>,
    pub metadata: ObjectMetadata,
    pub listener: Option<&'a mut dyn ProgressListener>,
}

/// Acknowledgement of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAck {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Object metadata returned alongside content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: Option<ObjectMetadata>,
}

/// An open object. The body holds the provider connection until dropped.
pub struct ObjectContent<'a> {
    pub head: ObjectHead,
    pub body: Box<dyn Read + Send + 'a>,
}

/// Bucket creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBucketRequest {
    pub name: String,
    pub storage_class: StorageClass,
    pub redundancy: RedundancyType,
    pub acl: CannedAcl,
}

impl CreateBucketRequest {
    /// Standard storage, zone-redundant, with the given ACL
    pub fn new(name: impl Into<String>, acl: CannedAcl) -> Self {
        Self {
            name: name.into(),
            storage_class: StorageClass::Standard,
            redundancy: RedundancyType::Zone,
            acl,
        }
    }
}

/// Entry in a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub name: String,
    pub location: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub storage_class: Option<StorageClass>,
}

/// Detailed bucket description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub location: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub storage_class: Option<StorageClass>,
    pub redundancy: Option<RedundancyType>,
    pub acl: Option<CannedAcl>,
    pub extranet_endpoint: Option<String>,
}

/// Calls the client makes against the storage service. Implementations are shared
/// across threads; per-transfer state travels in the request, never in the provider.
pub trait StorageProvider: Send + Sync + Debug {
    /// Write an object, emitting progress through the request's listener
    fn put_object(&self, request: PutObjectRequest<'_>) -> ProviderResult<PutAck>;

    /// Open an object for streaming. Dropping the body releases the connection.
    fn get_object<'a>(
        &'a self,
        bucket: &str,
        key: &str,
        listener: Option<&'a mut dyn ProgressListener>,
    ) -> ProviderResult<ObjectContent<'a>>;

    /// Remove an object. Missing objects are not an error.
    fn delete_object(&self, bucket: &str, key: &str) -> ProviderResult<()>;

    fn does_object_exist(&self, bucket: &str, key: &str) -> ProviderResult<bool>;

    fn does_bucket_exist(&self, bucket: &str) -> ProviderResult<bool>;

    fn create_bucket(&self, request: &CreateBucketRequest) -> ProviderResult<()>;

    fn list_buckets(&self) -> ProviderResult<Vec<BucketSummary>>;

    fn bucket_info(&self, bucket: &str) -> ProviderResult<BucketInfo>;

    fn delete_bucket(&self, bucket: &str) -> ProviderResult<()>;

    /// URL granting read access to a private object until `expires`
    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires: DateTime<Utc>,
    ) -> ProviderResult<String>;
}
