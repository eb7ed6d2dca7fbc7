//! URL Policy Tests
//!
//! Tests for:
//! - Public objects get a plain `scheme://bucket.host/key` URL
//! - Private objects get a presigned URL valid for the configured lifetime
//! - Malformed endpoints fail as configuration errors
//! - URLs for missing objects are not produced

use chrono::{DateTime, Utc};
use ossgate::observability::MemorySink;
use ossgate::provider::{Credentials, LocalProvider, SignatureError};
use ossgate::{Event, FixedClock, OssClient, OssConfig, OssError, TransferOptions};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const ENDPOINT: &str = "https://oss-cn-hangzhou.aliyuncs.com";
const NOW: i64 = 1_700_000_000;

fn provider(temp: &TempDir, endpoint: &str) -> LocalProvider {
    LocalProvider::new(
        temp.path().join("store"),
        endpoint,
        Credentials::new("test-id", "test-secret"),
    )
    .unwrap()
}

fn client_at(temp: &TempDir, sink: &MemorySink, config: OssConfig) -> OssClient {
    let mut client = OssClient::new(config)
        .with_logger(sink.logger())
        .with_clock(FixedClock::at_timestamp(NOW));
    client.connect_with(provider(temp, ENDPOINT)).unwrap();
    client.create_bucket_if_absent("media").unwrap();
    client
}

fn private_client(temp: &TempDir, sink: &MemorySink) -> OssClient {
    client_at(temp, sink, OssConfig::new(ENDPOINT, "test-id", "test-secret"))
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

// =============================================================================
// Public URLs
// =============================================================================

/// Public URL is exactly scheme, bucket-prefixed host and key
#[test]
fn test_public_url_format() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let mut client = private_client(&temp, &sink);
    client.set_private(false);

    let url = client
        .put("media", "Kong/test.txt", "Hello World", TransferOptions::none())
        .unwrap();
    assert_eq!(
        url.as_deref(),
        Some("https://media.oss-cn-hangzhou.aliyuncs.com/Kong/test.txt")
    );
}

/// Same inputs, same public URL
#[test]
fn test_public_url_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let mut client = private_client(&temp, &sink);
    client.set_private(false);
    client.put("media", "a b.txt", "x", TransferOptions::none()).unwrap();

    let first = client.generate_url("media", "a b.txt").unwrap().unwrap();
    let second = client.generate_url("media", "a b.txt").unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "https://media.oss-cn-hangzhou.aliyuncs.com/a%20b.txt");
}

#[test]
fn test_public_url_keeps_http_scheme() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let mut config = OssConfig::new("http://127.0.0.1:9000/", "test-id", "test-secret");
    config.is_private = false;
    let client = client_at(&temp, &sink, config);

    client.put("media", "k.txt", "x", TransferOptions::none()).unwrap();
    assert_eq!(
        client.generate_url("media", "k.txt").unwrap().as_deref(),
        Some("http://media.127.0.0.1:9000/k.txt")
    );
}

/// An endpoint without "//" cannot produce a public URL
#[test]
fn test_malformed_endpoint_is_configuration_error() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let mut config = OssConfig::new("oss-cn-hangzhou.aliyuncs.com", "test-id", "test-secret");
    config.is_private = false;
    let client = client_at(&temp, &sink, config);

    let result = client.put("media", "k.txt", "x", TransferOptions::none());
    assert!(matches!(result, Err(OssError::Configuration(_))));
    assert!(client.exists("media", "k.txt").unwrap());
}

#[test]
fn test_networked_connect_rejects_malformed_endpoint() {
    let err = OssClient::configure("oss-cn-hangzhou.aliyuncs.com", "id", "secret").unwrap_err();
    assert!(matches!(err, OssError::Configuration(_)));

    let err = OssClient::configure("https://", "id", "secret").unwrap_err();
    assert!(matches!(err, OssError::Configuration(_)));
}

// =============================================================================
// Presigned URLs
// =============================================================================

/// Private URL verifies until now + 3600s and not after
#[test]
fn test_private_url_expires_after_lifetime() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = private_client(&temp, &sink);

    let url = client
        .put("media", "Kong/test.txt", "Hello World", TransferOptions::none())
        .unwrap()
        .unwrap();
    assert!(url.starts_with("https://media.oss-cn-hangzhou.aliyuncs.com/Kong/test.txt?"));
    assert!(url.contains("OSSAccessKeyId=test-id"));
    assert!(url.contains("Expires=1700003600"));

    let verifier = provider(&temp, ENDPOINT);
    let target = verifier.verify_presigned_url(&url, at(NOW)).unwrap();
    assert_eq!(target.bucket, "media");
    assert_eq!(target.key, "Kong/test.txt");
    assert_eq!(target.expires, at(NOW + 3600));

    assert!(verifier.verify_presigned_url(&url, at(NOW + 3600)).is_ok());
    assert_eq!(
        verifier.verify_presigned_url(&url, at(NOW + 3601)),
        Err(SignatureError::Expired(NOW + 3600))
    );
}

#[test]
fn test_private_url_honors_configured_lifetime() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let mut client = private_client(&temp, &sink);
    client.set_expiration(32_400).unwrap();

    let url = client.put("media", "k.txt", "x", TransferOptions::none()).unwrap().unwrap();
    assert!(url.contains(&format!("Expires={}", NOW + 32_400)));
}

#[test]
fn test_tampered_url_is_rejected() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = private_client(&temp, &sink);

    let url = client.put("media", "k.txt", "x", TransferOptions::none()).unwrap().unwrap();
    let tampered = url.replace("/k.txt?", "/other.txt?");

    let verifier = provider(&temp, ENDPOINT);
    assert_eq!(
        verifier.verify_presigned_url(&tampered, at(NOW)),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_url_signed_by_other_key_is_rejected() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = private_client(&temp, &sink);
    let url = client.put("media", "k.txt", "x", TransferOptions::none()).unwrap().unwrap();

    let other = LocalProvider::new(
        temp.path().join("store"),
        ENDPOINT,
        Credentials::new("test-id", "another-secret"),
    )
    .unwrap();
    assert!(other.verify_presigned_url(&url, at(NOW)).is_err());
}

// =============================================================================
// Missing Objects
// =============================================================================

#[test]
fn test_generate_url_for_missing_object_is_none() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = private_client(&temp, &sink);

    assert_eq!(client.generate_url("media", "absent.txt").unwrap(), None);
    assert!(!sink.contains(Event::UrlSignFailed));
}

#[test]
fn test_generate_url_for_missing_bucket_is_none() {
    let temp = TempDir::new().unwrap();
    let sink = MemorySink::new();
    let client = private_client(&temp, &sink);

    assert_eq!(client.generate_url("nowhere", "k.txt").unwrap(), None);
    assert!(sink.contains(Event::ObjectExistsFailed));
}
