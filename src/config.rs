//! # Client Configuration
//!
//! Endpoint, credentials, visibility, URL lifetime and write policy. Loaded from a
//! JSON file or the environment; the loading host owns where it comes from.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{OssError, OssResult};
use crate::policy::Visibility;

/// Longest presigned URL lifetime the provider accepts, in seconds
pub const MAX_EXPIRATION_SECONDS: u64 = 32_400;

/// Default presigned URL lifetime, in seconds
pub const DEFAULT_EXPIRATION_SECONDS: u64 = 3_600;

/// What `put` does when the key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Write unconditionally; the newest content wins
    #[default]
    Overwrite,
    /// Check first; if the key exists, warn and leave it untouched
    SkipExisting,
}

impl WritePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WritePolicy::Overwrite => "overwrite",
            WritePolicy::SkipExisting => "skip_existing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "overwrite" => Some(WritePolicy::Overwrite),
            "skip_existing" => Some(WritePolicy::SkipExisting),
            _ => None,
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OssConfig {
    /// Service endpoint, e.g. `https://oss-cn-hangzhou.aliyuncs.com`
    pub endpoint: String,

    pub access_key_id: String,

    pub access_key_secret: String,

    /// Objects written private, URLs presigned (default true)
    #[serde(default = "default_is_private")]
    pub is_private: bool,

    /// Presigned URL lifetime (default 3600, max 32400)
    #[serde(default = "default_expiration_seconds")]
    pub expiration_seconds: u64,

    #[serde(default)]
    pub write_policy: WritePolicy,
}

fn default_is_private() -> bool {
    true
}

fn default_expiration_seconds() -> u64 {
    DEFAULT_EXPIRATION_SECONDS
}

impl OssConfig {
    /// Configuration with defaults for everything but the three core fields
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            is_private: default_is_private(),
            expiration_seconds: default_expiration_seconds(),
            write_policy: WritePolicy::default(),
        }
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> OssResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| OssError::config(format!("Failed to read config: {}", e)))?;

        let config: OssConfig = serde_json::from_str(&content)
            .map_err(|e| OssError::config(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Read `OSS_*` environment variables and validate
    pub fn from_env() -> OssResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OssResult<Self> {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| OssError::config(format!("{} is not set", name)))
        };

        let mut config = Self::new(
            required("OSS_ENDPOINT")?,
            required("OSS_ACCESS_KEY_ID")?,
            required("OSS_ACCESS_KEY_SECRET")?,
        );

        if let Some(raw) = lookup("OSS_PRIVATE") {
            config.is_private = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(OssError::config(format!(
                        "OSS_PRIVATE must be true or false, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(raw) = lookup("OSS_EXPIRATION_SECONDS") {
            config.expiration_seconds = raw.trim().parse().map_err(|_| {
                OssError::config(format!("OSS_EXPIRATION_SECONDS must be an integer, got '{}'", raw))
            })?;
        }

        if let Some(raw) = lookup("OSS_WRITE_POLICY") {
            config.write_policy = WritePolicy::parse(&raw).ok_or_else(|| {
                OssError::config(format!(
                    "OSS_WRITE_POLICY must be overwrite or skip_existing, got '{}'",
                    raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> OssResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(OssError::config("endpoint is required"));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(OssError::config("access_key_id is required"));
        }
        if self.access_key_secret.trim().is_empty() {
            return Err(OssError::config("access_key_secret is required"));
        }
        validate_expiration(self.expiration_seconds)?;
        Ok(())
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_private(self.is_private)
    }
}

/// Expiration must be within 1..=32400 seconds
pub fn validate_expiration(seconds: u64) -> OssResult<()> {
    if seconds == 0 || seconds > MAX_EXPIRATION_SECONDS {
        return Err(OssError::config(format!(
            "expiration_seconds must be between 1 and {}, got {}",
            MAX_EXPIRATION_SECONDS, seconds
        )));
    }
    Ok(())
}

impl fmt::Debug for OssConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OssConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("is_private", &self.is_private)
            .field("expiration_seconds", &self.expiration_seconds)
            .field("write_policy", &self.write_policy)
            .finish()
    }
}
