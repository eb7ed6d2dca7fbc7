//! # OSS Provider
//!
//! Talks to an OSS-compatible service over blocking HTTP. Requests are signed with
//! the header scheme in [`super::signer`]; error bodies and listings are XML.
//!
//! Uploads stream: the caller's thread reads the source and reports progress while a
//! scoped sender thread feeds the chunks to the HTTP request through a bounded queue.
//! `Completed` follows the service's acknowledgement.
//!
//! No client-side deadline is set on requests; a transfer runs as long as the
//! connection stays up.

use std::io::{self, Cursor, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Body, Client, ClientBuilder, Response};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, ETAG, LAST_MODIFIED};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::signer::{canonical_resource, gmt_date, Credentials, Signer};
use super::{
    BucketInfo, BucketSummary, CreateBucketRequest, ObjectContent, ObjectHead, ProviderError,
    ProviderResult, PutAck, PutObjectRequest, StorageProvider,
};
use crate::errors::{OssError, OssResult};
use crate::policy::{CannedAcl, ObjectMetadata, RedundancyType, StorageClass};
use crate::progress::{notify, ProgressListener, ProgressReader, TransferEvent};
use crate::url::Endpoint;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const UPLOAD_QUEUE_DEPTH: usize = 4;
const OCTET_STREAM: &str = "application/octet-stream";
const XML: &str = "application/xml";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListAllMyBucketsResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
    #[serde(rename = "Buckets", default)]
    buckets: XmlBuckets,
}

#[derive(Debug, Default, Deserialize)]
struct XmlBuckets {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<XmlBucket>,
}

#[derive(Debug, Deserialize)]
struct XmlBucket {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Location", default)]
    location: Option<String>,
    #[serde(rename = "CreationDate", default)]
    creation_date: Option<String>,
    #[serde(rename = "StorageClass", default)]
    storage_class: Option<String>,
    #[serde(rename = "ExtranetEndpoint", default)]
    extranet_endpoint: Option<String>,
    #[serde(rename = "DataRedundancyType", default)]
    redundancy: Option<String>,
    #[serde(rename = "AccessControlList", default)]
    acl: Option<XmlAccessControlList>,
}

#[derive(Debug, Deserialize)]
struct XmlAccessControlList {
    #[serde(rename = "Grant", default)]
    grant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlBucketInfo {
    #[serde(rename = "Bucket")]
    bucket: XmlBucket,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CreateBucketConfiguration")]
struct CreateBucketConfiguration {
    #[serde(rename = "StorageClass")]
    storage_class: &'static str,
    #[serde(rename = "DataRedundancyType")]
    redundancy: &'static str,
}

fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn error_from_body(status: u16, body: &str) -> ProviderError {
    let parsed: Option<ErrorBody> = quick_xml::de::from_str(body).ok();
    let (code, message) = match parsed {
        Some(e) if !e.code.is_empty() => (e.code, e.message),
        _ => (String::new(), body.trim().to_string()),
    };

    match code.as_str() {
        "NoSuchBucket" => ProviderError::NoSuchBucket(message),
        "NoSuchKey" => ProviderError::NoSuchKey(message),
        "BucketAlreadyExists" => ProviderError::BucketAlreadyExists(message),
        "BucketNotEmpty" => ProviderError::BucketNotEmpty(message),
        "InvalidBucketName" | "InvalidObjectName" => ProviderError::InvalidName(message),
        "AccessDenied" => ProviderError::AccessDenied(message),
        _ => ProviderError::Service {
            status,
            code,
            message,
        },
    }
}

fn parse_bucket_list(xml: &str) -> ProviderResult<(Vec<BucketSummary>, Option<String>)> {
    let result: ListAllMyBucketsResult =
        quick_xml::de::from_str(xml).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let buckets = result
        .buckets
        .bucket
        .into_iter()
        .map(|b| BucketSummary {
            creation_date: parse_date(b.creation_date.as_deref()),
            storage_class: b.storage_class.as_deref().and_then(StorageClass::parse),
            location: b.location,
            name: b.name,
        })
        .collect();

    let next = if result.is_truncated {
        result.next_marker.filter(|m| !m.is_empty())
    } else {
        None
    };
    Ok((buckets, next))
}

fn parse_bucket_info(xml: &str) -> ProviderResult<BucketInfo> {
    let info: XmlBucketInfo =
        quick_xml::de::from_str(xml).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let b = info.bucket;

    Ok(BucketInfo {
        creation_date: parse_date(b.creation_date.as_deref()),
        storage_class: b.storage_class.as_deref().and_then(StorageClass::parse),
        redundancy: b.redundancy.as_deref().and_then(RedundancyType::parse),
        acl: b
            .acl
            .and_then(|acl| acl.grant)
            .as_deref()
            .and_then(CannedAcl::parse),
        location: b.location,
        extranet_endpoint: b.extranet_endpoint,
        name: b.name,
    })
}

fn create_bucket_body(request: &CreateBucketRequest) -> ProviderResult<String> {
    let config = CreateBucketConfiguration {
        storage_class: request.storage_class.as_str(),
        redundancy: request.redundancy.as_str(),
    };
    let xml = quick_xml::se::to_string(&config).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}", xml))
}

fn header_str<'h>(headers: &'h HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn head_from_headers(headers: &HeaderMap) -> ObjectHead {
    let storage_class = header_str(headers, "x-oss-storage-class").and_then(StorageClass::parse);
    let acl = header_str(headers, "x-oss-object-acl").and_then(CannedAcl::parse);

    ObjectHead {
        content_length: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        etag: header_str(headers, ETAG).map(|v| v.trim_matches('"').to_string()),
        last_modified: header_str(headers, LAST_MODIFIED)
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc)),
        metadata: match (storage_class, acl) {
            (Some(storage_class), Some(acl)) => Some(ObjectMetadata { storage_class, acl }),
            _ => None,
        },
    }
}

/// One signed request
#[derive(Default)]
struct Call<'a> {
    method: Method,
    bucket: Option<&'a str>,
    key: Option<&'a str>,
    sub_resource: Option<&'a str>,
    query: Vec<(&'a str, String)>,
    oss_headers: Vec<(&'a str, &'a str)>,
    content_type: &'a str,
    body: Option<Body>,
}

/// HTTP client settings shared by every outbound call: no overall request timeout
pub(crate) fn http_client_builder() -> ClientBuilder {
    Client::builder().timeout(None)
}

pub(crate) fn http_client() -> reqwest::Result<Client> {
    http_client_builder().build()
}

/// Request body fed chunk by chunk from the reading thread
struct QueuedBody {
    chunks: Receiver<io::Result<Vec<u8>>>,
    current: Cursor<Vec<u8>>,
}

impl QueuedBody {
    fn new(chunks: Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            chunks,
            current: Cursor::new(Vec::new()),
        }
    }
}

impl Read for QueuedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.current.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            match self.chunks.recv() {
                Ok(Ok(chunk)) => self.current = Cursor::new(chunk),
                Ok(Err(e)) => return Err(e),
                // Reader finished and hung up
                Err(_) => return Ok(0),
            }
        }
    }
}

/// Move `source` into the queue. Read errors are forwarded to the request and
/// returned; a request that stopped listening ends the pump quietly.
fn pump(source: &mut dyn Read, chunks: SyncSender<io::Result<Vec<u8>>>) -> io::Result<u64> {
    let mut sent = 0u64;
    loop {
        let mut chunk = vec![0u8; UPLOAD_CHUNK_SIZE];
        let n = match source.read(&mut chunk) {
            Ok(0) => return Ok(sent),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = chunks.send(Err(io::Error::new(e.kind(), e.to_string())));
                return Err(e);
            }
        };
        chunk.truncate(n);
        if chunks.send(Ok(chunk)).is_err() {
            return Ok(sent);
        }
        sent += n as u64;
    }
}

/// Provider for an OSS-compatible HTTP service
#[derive(Debug)]
pub struct OssProvider {
    endpoint: Endpoint,
    signer: Signer,
    http: Client,
}

impl OssProvider {
    /// Build a provider for `endpoint`. Fails on a malformed endpoint.
    pub fn new(endpoint: &str, credentials: Credentials) -> OssResult<Self> {
        let http = http_client()
            .map_err(|e| OssError::config(format!("cannot build HTTP client: {}", e)))?;
        Self::with_http_client(endpoint, credentials, http)
    }

    /// Build a provider on a caller-configured HTTP client (proxies, TLS roots, resolvers)
    pub fn with_http_client(endpoint: &str, credentials: Credentials, http: Client) -> OssResult<Self> {
        let endpoint = Endpoint::parse(endpoint)?;
        Ok(Self {
            endpoint,
            signer: Signer::new(credentials),
            http,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url_for(&self, call: &Call<'_>) -> String {
        let mut url = match (call.bucket, call.key) {
            (Some(bucket), Some(key)) => self.endpoint.object_url(bucket, key),
            (Some(bucket), None) => format!("{}/", self.endpoint.bucket_url(bucket)),
            _ => format!("{}/", self.endpoint.service_url()),
        };
        if let Some(sub) = call.sub_resource {
            url.push('?');
            url.push_str(sub);
        }
        url
    }

    fn execute(&self, call: Call<'_>) -> ProviderResult<Response> {
        let date = gmt_date(Utc::now());
        let resource = canonical_resource(call.bucket, call.key, call.sub_resource);
        let authorization = self.signer.authorization(
            call.method.as_str(),
            call.content_type,
            &date,
            &call.oss_headers,
            &resource,
        );

        let mut builder = self
            .http
            .request(call.method.clone(), self.url_for(&call))
            .header(DATE, date)
            .header(AUTHORIZATION, authorization);
        if !call.content_type.is_empty() {
            builder = builder.header(CONTENT_TYPE, call.content_type);
        }
        for (name, value) in &call.oss_headers {
            builder = builder.header(*name, *value);
        }
        if !call.query.is_empty() {
            builder = builder.query(&call.query);
        }
        if let Some(body) = call.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::failure(response))
        }
    }

    fn failure(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        error_from_body(status, &body)
    }

    fn text(response: Response) -> ProviderResult<String> {
        response
            .text()
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

impl StorageProvider for OssProvider {
    fn put_object(&self, request: PutObjectRequest<'_>) -> ProviderResult<PutAck> {
        let PutObjectRequest {
            bucket,
            key,
            body,
            content_length,
            metadata,
            listener,
        } = request;

        let mut listener = listener;
        notify(&mut listener, TransferEvent::Started);
        if let Some(length) = content_length {
            notify(&mut listener, TransferEvent::ContentLengthKnown(length));
        }

        let oss_headers = metadata.oss_headers();
        let (chunks, queued) = mpsc::sync_channel(UPLOAD_QUEUE_DEPTH);
        let upload = QueuedBody::new(queued);
        let upload = match content_length {
            Some(length) => Body::sized(upload, length),
            None => Body::new(upload),
        };

        let mut reader = ProgressReader::new(body, listener);
        let (pumped, result) = thread::scope(|scope| {
            let request = scope.spawn(move || {
                self.execute(Call {
                    method: Method::PUT,
                    bucket: Some(bucket),
                    key: Some(key),
                    oss_headers,
                    content_type: OCTET_STREAM,
                    body: Some(upload),
                    ..Default::default()
                })
            });
            let pumped = pump(&mut reader, chunks);
            let result = request
                .join()
                .unwrap_or_else(|_| Err(ProviderError::Transport("upload request panicked".to_string())));
            (pumped, result)
        });

        // A source read error has already failed the transfer; dropping the reader
        // fails it in every other error case
        let size = pumped?;
        let response = result?;
        let etag = header_str(response.headers(), ETAG).map(|v| v.trim_matches('"').to_string());
        reader.notify(TransferEvent::Completed);
        Ok(PutAck {
            etag,
            size_bytes: size,
        })
    }

    fn get_object<'a>(
        &'a self,
        bucket: &str,
        key: &str,
        listener: Option<&'a mut dyn ProgressListener>,
    ) -> ProviderResult<ObjectContent<'a>> {
        let mut listener = listener;
        notify(&mut listener, TransferEvent::Started);

        let response = match self.execute(Call {
            method: Method::GET,
            bucket: Some(bucket),
            key: Some(key),
            ..Default::default()
        }) {
            Ok(response) => response,
            Err(e) => {
                notify(&mut listener, TransferEvent::Failed);
                return Err(e);
            }
        };

        let head = head_from_headers(response.headers());
        if let Some(length) = head.content_length {
            notify(&mut listener, TransferEvent::ContentLengthKnown(length));
        }

        Ok(ObjectContent {
            head,
            body: Box::new(ProgressReader::completing(response, listener)),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> ProviderResult<()> {
        self.execute(Call {
            method: Method::DELETE,
            bucket: Some(bucket),
            key: Some(key),
            ..Default::default()
        })?;
        Ok(())
    }

    fn does_object_exist(&self, bucket: &str, key: &str) -> ProviderResult<bool> {
        let result = self.execute(Call {
            method: Method::HEAD,
            bucket: Some(bucket),
            key: Some(key),
            ..Default::default()
        });
        match result {
            Ok(_) => Ok(true),
            // HEAD carries no error body, so a 404 is all we get
            Err(ProviderError::Service { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(ProviderError::NoSuchKey(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn does_bucket_exist(&self, bucket: &str) -> ProviderResult<bool> {
        let result = self.execute(Call {
            method: Method::GET,
            bucket: Some(bucket),
            sub_resource: Some("acl"),
            ..Default::default()
        });
        match result {
            Ok(_) => Ok(true),
            Err(ProviderError::NoSuchBucket(_)) => Ok(false),
            // Someone else's bucket
            Err(ProviderError::AccessDenied(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn create_bucket(&self, request: &CreateBucketRequest) -> ProviderResult<()> {
        let body = create_bucket_body(request)?;
        self.execute(Call {
            method: Method::PUT,
            bucket: Some(&request.name),
            oss_headers: vec![("x-oss-acl", request.acl.as_str())],
            content_type: XML,
            body: Some(Body::from(body)),
            ..Default::default()
        })?;
        Ok(())
    }

    fn list_buckets(&self) -> ProviderResult<Vec<BucketSummary>> {
        let mut buckets = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(m) = &marker {
                query.push(("marker", m.clone()));
            }
            let response = self.execute(Call {
                method: Method::GET,
                query,
                ..Default::default()
            })?;

            let (page, next) = parse_bucket_list(&Self::text(response)?)?;
            buckets.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => return Ok(buckets),
            }
        }
    }

    fn bucket_info(&self, bucket: &str) -> ProviderResult<BucketInfo> {
        let response = self.execute(Call {
            method: Method::GET,
            bucket: Some(bucket),
            sub_resource: Some("bucketInfo"),
            ..Default::default()
        })?;
        parse_bucket_info(&Self::text(response)?)
    }

    fn delete_bucket(&self, bucket: &str) -> ProviderResult<()> {
        self.execute(Call {
            method: Method::DELETE,
            bucket: Some(bucket),
            ..Default::default()
        })?;
        Ok(())
    }

    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires: DateTime<Utc>,
    ) -> ProviderResult<String> {
        Ok(self.signer.presign(&self.endpoint, bucket, key, expires))
    }
}
