//! # Local Filesystem Provider
//!
//! Serves the provider contract from a directory:
//!
//! ```text
//! {root}/{bucket}/bucket.json        bucket record
//! {root}/{bucket}/objects/{key}      object bytes
//! {root}/{bucket}/meta/{key}.json    object head
//! {root}/{bucket}/tmp/               staging for in-flight writes
//! ```
//!
//! Writes land in `tmp/` and are renamed into place, so readers never see a
//! partial object. Presigned URLs use the same scheme as the networked provider
//! and can be checked with [`LocalProvider::verify_presigned_url`].

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::signer::{Credentials, PresignedTarget, SignatureError, Signer};
use super::{
    BucketInfo, BucketSummary, CreateBucketRequest, ObjectContent, ObjectHead, ProviderError,
    ProviderResult, PutAck, PutObjectRequest, StorageProvider,
};
use crate::errors::OssResult;
use crate::policy::{CannedAcl, RedundancyType, StorageClass};
use crate::progress::{notify, ProgressListener, ProgressReader, TransferEvent};
use crate::url::Endpoint;

const BUCKET_RECORD: &str = "bucket.json";
const COPY_BUFFER: usize = 64 * 1024;

static BUCKET_NAME: OnceLock<Option<Regex>> = OnceLock::new();

/// 3-63 characters: lowercase letters, digits and hyphens, no leading or trailing hyphen
fn valid_bucket_name(name: &str) -> bool {
    BUCKET_NAME
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").ok())
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketRecord {
    name: String,
    created_at: DateTime<Utc>,
    storage_class: StorageClass,
    redundancy: RedundancyType,
    acl: CannedAcl,
}

/// Provider backed by a local directory
#[derive(Debug)]
pub struct LocalProvider {
    root: PathBuf,
    endpoint: Endpoint,
    signer: Signer,
}

impl LocalProvider {
    /// Serve `root`, presigning URLs against `endpoint`
    pub fn new(root: PathBuf, endpoint: &str, credentials: Credentials) -> OssResult<Self> {
        Ok(Self {
            root,
            endpoint: Endpoint::parse(endpoint)?,
            signer: Signer::new(credentials),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check a presigned URL at `now` and return what it grants access to
    pub fn verify_presigned_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<PresignedTarget, SignatureError> {
        self.signer.verify_presigned(url, now)
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket).join("objects").join(key)
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket).join("meta").join(format!("{}.json", key))
    }

    fn check_bucket(&self, bucket: &str) -> ProviderResult<()> {
        if !valid_bucket_name(bucket) {
            return Err(ProviderError::InvalidName(bucket.to_string()));
        }
        if !self.bucket_dir(bucket).join(BUCKET_RECORD).is_file() {
            return Err(ProviderError::NoSuchBucket(bucket.to_string()));
        }
        Ok(())
    }

    fn check_object(&self, bucket: &str, key: &str) -> ProviderResult<()> {
        self.check_bucket(bucket)?;
        if !valid_key(key) {
            return Err(ProviderError::InvalidName(key.to_string()));
        }
        Ok(())
    }

    fn read_bucket_record(&self, bucket: &str) -> ProviderResult<BucketRecord> {
        let raw = fs::read(self.bucket_dir(bucket).join(BUCKET_RECORD)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProviderError::NoSuchBucket(bucket.to_string())
            } else {
                ProviderError::Io(e)
            }
        })?;
        serde_json::from_slice(&raw).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    fn read_head(&self, bucket: &str, key: &str) -> ProviderResult<Option<ObjectHead>> {
        match fs::read(self.meta_path(bucket, key)) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| ProviderError::Malformed(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::Io(e)),
        }
    }

    /// Stream `body` into a staging file, returning its path, size and digest
    fn stage(&self, bucket: &str, body: &mut dyn Read) -> io::Result<(PathBuf, u64, String)> {
        let tmp_dir = self.bucket_dir(bucket).join("tmp");
        fs::create_dir_all(&tmp_dir)?;
        let tmp_path = tmp_dir.join(Uuid::new_v4().to_string());

        let result = (|| -> io::Result<(u64, String)> {
            let mut file = File::create(&tmp_path)?;
            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; COPY_BUFFER];
            let mut size = 0u64;
            loop {
                let n = match body.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n])?;
                size += n as u64;
            }
            file.sync_all()?;
            Ok((size, format!("{:x}", hasher.finalize())))
        })();

        match result {
            Ok((size, etag)) => Ok((tmp_path, size, etag)),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    fn commit(&self, bucket: &str, key: &str, staged: &Path, head: &ObjectHead) -> ProviderResult<()> {
        let object_path = self.object_path(bucket, key);
        let meta_path = self.meta_path(bucket, key);
        for path in [&object_path, &meta_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let meta = serde_json::to_vec_pretty(head).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        fs::rename(staged, &object_path)?;
        fs::write(&meta_path, meta)?;
        Ok(())
    }
}

fn has_files(dir: &Path) -> io::Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() || has_files(&path)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl StorageProvider for LocalProvider {
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
        if let Err(e) = self.check_object(bucket, key) {
            notify(&mut listener, TransferEvent::Failed);
            return Err(e);
        }
        if let Some(length) = content_length {
            notify(&mut listener, TransferEvent::ContentLengthKnown(length));
        }

        // A failed read has already reported `Failed`; dropping the reader covers the rest
        let mut reader = ProgressReader::new(body, listener);
        let (staged, size, etag) = self.stage(bucket, &mut reader).map_err(ProviderError::Io)?;

        let head = ObjectHead {
            content_length: Some(size),
            etag: Some(etag.clone()),
            last_modified: Some(Utc::now()),
            metadata: Some(metadata),
        };
        if let Err(e) = self.commit(bucket, key, &staged, &head) {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        reader.notify(TransferEvent::Completed);
        Ok(PutAck {
            etag: Some(etag),
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

        let opened = self.check_object(bucket, key).and_then(|()| {
            let not_found = || ProviderError::NoSuchKey(format!("{}/{}", bucket, key));
            let head = self.read_head(bucket, key)?.ok_or_else(not_found)?;
            let file = File::open(self.object_path(bucket, key)).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    not_found()
                } else {
                    ProviderError::Io(e)
                }
            })?;
            Ok((head, file))
        });
        let (head, file) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                notify(&mut listener, TransferEvent::Failed);
                return Err(e);
            }
        };

        if let Some(length) = head.content_length {
            notify(&mut listener, TransferEvent::ContentLengthKnown(length));
        }

        Ok(ObjectContent {
            head,
            body: Box::new(ProgressReader::completing(file, listener)),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> ProviderResult<()> {
        self.check_object(bucket, key)?;
        for path in [self.object_path(bucket, key), self.meta_path(bucket, key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProviderError::Io(e)),
            }
        }
        Ok(())
    }

    fn does_object_exist(&self, bucket: &str, key: &str) -> ProviderResult<bool> {
        self.check_object(bucket, key)?;
        Ok(self.object_path(bucket, key).is_file())
    }

    fn does_bucket_exist(&self, bucket: &str) -> ProviderResult<bool> {
        match self.check_bucket(bucket) {
            Ok(()) => Ok(true),
            Err(ProviderError::NoSuchBucket(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_bucket(&self, request: &CreateBucketRequest) -> ProviderResult<()> {
        if !valid_bucket_name(&request.name) {
            return Err(ProviderError::InvalidName(request.name.clone()));
        }
        let dir = self.bucket_dir(&request.name);
        if dir.join(BUCKET_RECORD).is_file() {
            return Err(ProviderError::BucketAlreadyExists(request.name.clone()));
        }

        fs::create_dir_all(dir.join("objects"))?;
        fs::create_dir_all(dir.join("meta"))?;

        let record = BucketRecord {
            name: request.name.clone(),
            created_at: Utc::now(),
            storage_class: request.storage_class,
            redundancy: request.redundancy,
            acl: request.acl,
        };
        let raw = serde_json::to_vec_pretty(&record).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        fs::write(dir.join(BUCKET_RECORD), raw)?;
        Ok(())
    }

    fn list_buckets(&self) -> ProviderResult<Vec<BucketSummary>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProviderError::Io(e)),
        };

        let mut buckets = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !valid_bucket_name(&name) || !entry.path().join(BUCKET_RECORD).is_file() {
                continue;
            }
            let record = self.read_bucket_record(&name)?;
            buckets.push(BucketSummary {
                name: record.name,
                location: Some("local".to_string()),
                creation_date: Some(record.created_at),
                storage_class: Some(record.storage_class),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    fn bucket_info(&self, bucket: &str) -> ProviderResult<BucketInfo> {
        self.check_bucket(bucket)?;
        let record = self.read_bucket_record(bucket)?;
        Ok(BucketInfo {
            name: record.name,
            location: Some("local".to_string()),
            creation_date: Some(record.created_at),
            storage_class: Some(record.storage_class),
            redundancy: Some(record.redundancy),
            acl: Some(record.acl),
            extranet_endpoint: Some(self.endpoint.host().to_string()),
        })
    }

    fn delete_bucket(&self, bucket: &str) -> ProviderResult<()> {
        self.check_bucket(bucket)?;
        let dir = self.bucket_dir(bucket);
        if has_files(&dir.join("objects"))? {
            return Err(ProviderError::BucketNotEmpty(bucket.to_string()));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires: DateTime<Utc>,
    ) -> ProviderResult<String> {
        if !valid_key(key) {
            return Err(ProviderError::InvalidName(key.to_string()));
        }
        Ok(self.signer.presign(&self.endpoint, bucket, key, expires))
    }
}
