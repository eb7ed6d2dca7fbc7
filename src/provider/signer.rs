//! # Request Signing
//!
//! OSS header signature and presigned query URLs. The string to sign is
//!
//! ```text
//! VERB \n Content-MD5 \n Content-Type \n Date \n CanonicalizedOSSHeaders CanonicalizedResource
//! ```
//!
//! signed with HMAC-SHA1 under the access key secret and base64 encoded.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::url::Endpoint;

type HmacSha1 = Hmac<Sha1>;

/// Access key pair. The secret never appears in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    access_key_secret: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub(crate) fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .finish()
    }
}

/// Presigned URL verification failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed presigned URL: {0}")]
    Malformed(String),

    #[error("Unknown access key: {0}")]
    UnknownAccessKey(String),

    #[error("Presigned URL expired at {0}")]
    Expired(i64),

    #[error("Signature mismatch")]
    Mismatch,
}

/// Target of a verified presigned URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedTarget {
    pub bucket: String,
    pub key: String,
    pub expires: DateTime<Utc>,
}

/// `Date` header format
pub fn gmt_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `/bucket/key?sub`, `/bucket/`, or `/` for service-level calls
pub fn canonical_resource(bucket: Option<&str>, key: Option<&str>, sub_resource: Option<&str>) -> String {
    let mut resource = match (bucket, key) {
        (Some(bucket), Some(key)) => format!("/{}/{}", bucket, key),
        (Some(bucket), None) => format!("/{}/", bucket),
        _ => "/".to_string(),
    };
    if let Some(sub) = sub_resource {
        resource.push('?');
        resource.push_str(sub);
    }
    resource
}

/// `x-oss-*` headers lowercased, sorted, one `name:value\n` each
pub fn canonical_oss_headers(headers: &[(&str, &str)]) -> String {
    let mut lowered: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .filter(|(name, _)| name.starts_with("x-oss-"))
        .collect();
    lowered.sort_by(|a, b| a.0.cmp(&b.0));

    lowered
        .into_iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

/// Assemble the string to sign
pub fn string_to_sign(
    verb: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    oss_headers: &[(&str, &str)],
    resource: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        verb,
        content_md5,
        content_type,
        date,
        canonical_oss_headers(oss_headers),
        resource
    )
}

/// Signs requests and URLs with one credential pair
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn access_key_id(&self) -> &str {
        self.credentials.access_key_id()
    }

    /// Base64 HMAC-SHA1 of the message
    pub fn sign(&self, message: &str) -> String {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha1::new_from_slice(self.credentials.access_key_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// `Authorization` header value
    pub fn authorization(
        &self,
        verb: &str,
        content_type: &str,
        date: &str,
        oss_headers: &[(&str, &str)],
        resource: &str,
    ) -> String {
        let message = string_to_sign(verb, "", content_type, date, oss_headers, resource);
        format!("OSS {}:{}", self.access_key_id(), self.sign(&message))
    }

    /// GET URL valid until `expires`
    pub fn presign(&self, endpoint: &Endpoint, bucket: &str, key: &str, expires: DateTime<Utc>) -> String {
        let expires_ts = expires.timestamp();
        let message = string_to_sign(
            "GET",
            "",
            "",
            &expires_ts.to_string(),
            &[],
            &canonical_resource(Some(bucket), Some(key), None),
        );
        let signature = self.sign(&message);

        format!(
            "{}?OSSAccessKeyId={}&Expires={}&Signature={}",
            endpoint.object_url(bucket, key),
            urlencoding::encode(self.access_key_id()),
            expires_ts,
            urlencoding::encode(&signature)
        )
    }

    /// Check a URL produced by [`Signer::presign`] at time `now`
    pub fn verify_presigned(&self, url: &str, now: DateTime<Utc>) -> Result<PresignedTarget, SignatureError> {
        let parsed = Url::parse(url).map_err(|e| SignatureError::Malformed(e.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| SignatureError::Malformed("missing host".to_string()))?;
        let bucket = host
            .split_once('.')
            .map(|(bucket, _)| bucket)
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| SignatureError::Malformed(format!("no bucket in host {}", host)))?
            .to_string();

        let key = urlencoding::decode(parsed.path().trim_start_matches('/'))
            .map_err(|e| SignatureError::Malformed(e.to_string()))?
            .into_owned();

        let mut access_key = None;
        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "OSSAccessKeyId" => access_key = Some(value.into_owned()),
                "Expires" => expires = Some(value.into_owned()),
                "Signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let access_key = access_key.ok_or_else(|| SignatureError::Malformed("missing OSSAccessKeyId".to_string()))?;
        let expires = expires
            .ok_or_else(|| SignatureError::Malformed("missing Expires".to_string()))?
            .parse::<i64>()
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let signature = signature.ok_or_else(|| SignatureError::Malformed("missing Signature".to_string()))?;

        if access_key != self.access_key_id() {
            return Err(SignatureError::UnknownAccessKey(access_key));
        }
        if now.timestamp() > expires {
            return Err(SignatureError::Expired(expires));
        }

        let message = string_to_sign(
            "GET",
            "",
            "",
            &expires.to_string(),
            &[],
            &canonical_resource(Some(&bucket), Some(&key), None),
        );
        let expected = self.sign(&message);
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(SignatureError::Mismatch);
        }

        let expires = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| SignatureError::Malformed(format!("bad Expires {}", expires)))?;

        Ok(PresignedTarget { bucket, key, expires })
    }
}
