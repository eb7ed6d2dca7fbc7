//! # Access Policy
//!
//! Visibility is the only stored knob. ACLs, storage class and the metadata written
//! with every object are derived from it at call time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether objects are anonymously readable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Reads require a signature; URLs handed out are presigned and expire
    Private,
    /// Anyone can read; URLs handed out are plain
    Public,
}

impl Visibility {
    pub fn from_private(is_private: bool) -> Self {
        if is_private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// Canned ACLs understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CannedAcl {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "public-read")]
    PublicRead,
    #[serde(rename = "public-read-write")]
    PublicReadWrite,
}

impl CannedAcl {
    /// Header value
    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
        }
    }

    /// Parse a provider ACL string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(CannedAcl::Private),
            "public-read" => Some(CannedAcl::PublicRead),
            "public-read-write" => Some(CannedAcl::PublicReadWrite),
            _ => None,
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider durability/performance tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Standard,
    #[serde(rename = "IA")]
    InfrequentAccess,
    Archive,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "Standard",
            StorageClass::InfrequentAccess => "IA",
            StorageClass::Archive => "Archive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Standard" => Some(StorageClass::Standard),
            "IA" => Some(StorageClass::InfrequentAccess),
            "Archive" => Some(StorageClass::Archive),
            _ => None,
        }
    }
}

impl Default for StorageClass {
    fn default() -> Self {
        Self::Standard
    }
}

/// Bucket data redundancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedundancyType {
    /// Locally redundant
    #[serde(rename = "LRS")]
    Local,
    /// Zone redundant
    #[serde(rename = "ZRS")]
    Zone,
}

impl RedundancyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedundancyType::Local => "LRS",
            RedundancyType::Zone => "ZRS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LRS" => Some(RedundancyType::Local),
            "ZRS" => Some(RedundancyType::Zone),
            _ => None,
        }
    }
}

/// Metadata written with every object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub storage_class: StorageClass,
    pub acl: CannedAcl,
}

impl ObjectMetadata {
    /// `x-oss-*` headers, sorted by name
    pub fn oss_headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("x-oss-object-acl", self.acl.as_str()),
            ("x-oss-storage-class", self.storage_class.as_str()),
        ]
    }
}

/// Policy in effect for a single call, derived from the client's visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    visibility: Visibility,
}

impl AccessPolicy {
    pub fn new(visibility: Visibility) -> Self {
        Self { visibility }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// ACL for objects written under this policy
    pub fn object_acl(&self) -> CannedAcl {
        match self.visibility {
            Visibility::Private => CannedAcl::Private,
            Visibility::Public => CannedAcl::PublicRead,
        }
    }

    /// ACL for buckets created under this policy
    pub fn bucket_acl(&self) -> CannedAcl {
        self.object_acl()
    }

    /// Metadata applied on every write
    pub fn object_metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            storage_class: StorageClass::Standard,
            acl: self.object_acl(),
        }
    }
}
