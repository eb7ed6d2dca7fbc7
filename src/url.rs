//! # URL Resolution
//!
//! After a write, or on request, an object's access URL is:
//! - private: a presigned URL from the provider, valid until `now + expiration`
//! - public: `{scheme}//{bucket}.{host}/{key}`, computed locally with no network call
//!
//! A malformed endpoint is a configuration error and always surfaces as `Err`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::errors::{OssError, OssResult};
use crate::observability::{Event, Logger};
use crate::policy::Visibility;
use crate::provider::StorageProvider;

/// Endpoint split at its first `//` into scheme and host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
}

impl Endpoint {
    /// Parse `https://oss-cn-hangzhou.aliyuncs.com` style endpoints
    pub fn parse(raw: &str) -> OssResult<Self> {
        let (scheme, host) = raw.split_once("//").ok_or_else(|| {
            OssError::config(format!("Oss endpoint [{}] is malformed: missing '//'", raw))
        })?;
        let host = host.trim_end_matches('/');
        if host.is_empty() {
            return Err(OssError::config(format!(
                "Oss endpoint [{}] is malformed: missing host",
                raw
            )));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
        })
    }

    /// Scheme including the trailing colon, e.g. `https:`
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `https://host`
    pub fn service_url(&self) -> String {
        format!("{}//{}", self.scheme, self.host)
    }

    /// `https://bucket.host`
    pub fn bucket_url(&self, bucket: &str) -> String {
        format!("{}//{}.{}", self.scheme, bucket, self.host)
    }

    /// `https://bucket.host/key`
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", self.bucket_url(bucket), encode_key(key))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_url())
    }
}

/// Percent-encode each path segment of a key, keeping `/` separators
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Plain URL for a publicly readable object
pub fn public_url(endpoint: &str, bucket: &str, key: &str) -> OssResult<String> {
    Ok(Endpoint::parse(endpoint)?.object_url(bucket, key))
}

/// `now + seconds`, refusing to overflow
pub fn expiry_after(now: DateTime<Utc>, seconds: u64) -> OssResult<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| OssError::config(format!("expiration of {}s overflows", seconds)))
}

/// Produces access URLs for objects
pub struct UrlResolver<'a> {
    endpoint: &'a str,
    provider: &'a dyn StorageProvider,
    clock: &'a dyn Clock,
    logger: &'a Logger,
}

impl<'a> UrlResolver<'a> {
    pub fn new(
        endpoint: &'a str,
        provider: &'a dyn StorageProvider,
        clock: &'a dyn Clock,
        logger: &'a Logger,
    ) -> Self {
        Self {
            endpoint,
            provider,
            clock,
            logger,
        }
    }

    /// Resolve an access URL.
    ///
    /// Returns `Ok(None)` when `check_existence_first` is set and the object is
    /// missing, or when the provider cannot sign. Returns `Err` only for configuration
    /// problems.
    pub fn resolve(
        &self,
        bucket: &str,
        key: &str,
        visibility: Visibility,
        expiration_seconds: u64,
        check_existence_first: bool,
    ) -> OssResult<Option<String>> {
        if check_existence_first && !self.object_exists(bucket, key) {
            return Ok(None);
        }

        match visibility {
            Visibility::Public => public_url(self.endpoint, bucket, key).map(Some),
            Visibility::Private => {
                let expires = expiry_after(self.clock.now(), expiration_seconds)?;
                match self.provider.generate_presigned_url(bucket, key, expires) {
                    Ok(url) => Ok(Some(url)),
                    Err(e) => {
                        self.logger.error(
                            Event::UrlSignFailed,
                            &[
                                ("bucket", bucket),
                                ("key", key),
                                ("error", e.to_string().as_str()),
                            ],
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    fn object_exists(&self, bucket: &str, key: &str) -> bool {
        match self.provider.does_object_exist(bucket, key) {
            Ok(exists) => exists,
            Err(e) => {
                self.logger.error(
                    Event::ObjectExistsFailed,
                    &[
                        ("bucket", bucket),
                        ("key", key),
                        ("error", e.to_string().as_str()),
                    ],
                );
                false
            }
        }
    }
}
