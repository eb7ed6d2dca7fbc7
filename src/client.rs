//! # OSS Client
//!
//! The facade callers use. Holds configuration and exclusively owns the provider
//! session; every operation is a single synchronous provider call (or two, when an
//! existence check comes first).
//!
//! Error policy:
//! - `Err` only for configuration problems and use before [`OssClient::connect`]
//! - every other failure is logged once, here, and becomes `None`, `false` or an empty list
//!
//! All operations take `&self`; a connected client can be shared across threads, each
//! transfer carrying its own listener.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_expiration, OssConfig, WritePolicy};
use crate::errors::{OssError, OssResult};
use crate::observability::{Event, Logger};
use crate::policy::{AccessPolicy, Visibility};
use crate::progress::{ProgressListener, TransferDirection, TransferObserver};
use crate::provider::{
    BucketInfo, BucketSummary, CreateBucketRequest, Credentials, OssProvider, PutObjectRequest,
    StorageProvider,
};
use crate::source::ObjectSource;
use crate::url::UrlResolver;

/// How a transfer reports progress
#[derive(Default)]
pub enum Progress<'a> {
    /// No progress events
    #[default]
    Off,
    /// A client-owned observer logs every transition
    Logged,
    /// Events go to the caller's listener
    Observer(&'a mut dyn ProgressListener),
}

/// Per-call transfer options
#[derive(Default)]
pub struct TransferOptions<'a> {
    pub progress: Progress<'a>,
}

impl<'a> TransferOptions<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    /// Log progress through the client's logger
    pub fn logged() -> Self {
        Self {
            progress: Progress::Logged,
        }
    }

    /// Send progress events to `listener`
    pub fn observed(listener: &'a mut dyn ProgressListener) -> Self {
        Self {
            progress: Progress::Observer(listener),
        }
    }

    fn attach<'s>(
        self,
        slot: &'s mut Option<TransferObserver>,
        direction: TransferDirection,
        logger: &Logger,
    ) -> Option<&'s mut dyn ProgressListener>
    where
        'a: 's,
    {
        match self.progress {
            Progress::Off => None,
            Progress::Logged => {
                let observer: &'s mut dyn ProgressListener =
                    slot.insert(TransferObserver::logged(direction, logger.clone()));
                Some(observer)
            }
            Progress::Observer(listener) => {
                let listener: &'s mut dyn ProgressListener = listener;
                Some(listener)
            }
        }
    }
}

/// Object storage client
#[derive(Debug)]
pub struct OssClient {
    config: OssConfig,
    provider: Option<Box<dyn StorageProvider>>,
    logger: Logger,
    clock: Box<dyn Clock>,
}

impl OssClient {
    /// Unconnected client. Call [`OssClient::connect`] or [`OssClient::connect_with`] before use.
    pub fn new(config: OssConfig) -> Self {
        Self {
            config,
            provider: None,
            logger: Logger::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// Build and connect to the networked provider. Fails if any argument is empty.
    pub fn configure(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> OssResult<Self> {
        let mut client = Self::new(OssConfig::new(endpoint, access_key_id, access_key_secret));
        client.connect()?;
        Ok(client)
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Open a session with the networked provider. No request is sent.
    pub fn connect(&mut self) -> OssResult<()> {
        self.check_config()?;
        let credentials = Credentials::new(&self.config.access_key_id, &self.config.access_key_secret);
        match OssProvider::new(&self.config.endpoint, credentials) {
            Ok(provider) => self.attach_provider(Box::new(provider)),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Use an already-built provider
    pub fn connect_with(&mut self, provider: impl StorageProvider + 'static) -> OssResult<()> {
        self.check_config()?;
        self.attach_provider(Box::new(provider))
    }

    /// Drop the provider session
    pub fn disconnect(&mut self) {
        self.provider = None;
    }

    fn check_config(&self) -> OssResult<()> {
        if let Err(e) = self.config.validate() {
            self.reject(&e);
            return Err(e);
        }
        Ok(())
    }

    fn reject(&self, error: &OssError) {
        let message = error.to_string();
        self.logger.fatal(
            Event::ClientConnectFailed,
            &[
                ("endpoint", self.config.endpoint.as_str()),
                ("code", error.code().as_str()),
                ("error", message.as_str()),
            ],
        );
    }

    fn attach_provider(&mut self, provider: Box<dyn StorageProvider>) -> OssResult<()> {
        self.provider = Some(provider);
        let expiration = self.config.expiration_seconds.to_string();
        self.logger.info(
            Event::ClientConnected,
            &[
                ("endpoint", self.config.endpoint.as_str()),
                ("access_key_id", self.config.access_key_id.as_str()),
                ("visibility", if self.config.is_private { "private" } else { "public" }),
                ("expiration_seconds", expiration.as_str()),
                ("write_policy", self.config.write_policy.as_str()),
            ],
        );
        Ok(())
    }

    pub fn set_private(&mut self, is_private: bool) {
        self.config.is_private = is_private;
    }

    /// Presigned URL lifetime; 1..=32400 seconds
    pub fn set_expiration(&mut self, seconds: u64) -> OssResult<()> {
        validate_expiration(seconds)?;
        self.config.expiration_seconds = seconds;
        Ok(())
    }

    pub fn set_write_policy(&mut self, policy: WritePolicy) {
        self.config.write_policy = policy;
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    pub fn config(&self) -> &OssConfig {
        &self.config
    }

    pub fn visibility(&self) -> Visibility {
        self.config.visibility()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn provider(&self) -> OssResult<&dyn StorageProvider> {
        match self.provider.as_deref() {
            Some(provider) => Ok(provider),
            None => {
                self.logger.error(
                    Event::ClientNotConnected,
                    &[("endpoint", self.config.endpoint.as_str())],
                );
                Err(OssError::NotConnected)
            }
        }
    }

    fn resolver<'a>(&'a self, provider: &'a dyn StorageProvider) -> UrlResolver<'a> {
        UrlResolver::new(&self.config.endpoint, provider, self.clock.as_ref(), &self.logger)
    }

    /// Fatal errors pass through; anything else is logged under `event` and replaced
    /// with `fallback`.
    fn settle<T>(
        &self,
        result: OssResult<T>,
        fallback: T,
        event: Event,
        fields: &[(&str, &str)],
    ) -> OssResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let message = e.to_string();
                let mut all: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 2);
                all.extend_from_slice(fields);
                all.push(("code", e.code().as_str()));
                all.push(("error", message.as_str()));
                self.logger.error(event, &all);
                Ok(fallback)
            }
        }
    }

    /// Upload an object and return its access URL.
    ///
    /// Returns `Ok(None)` when the write fails, or when the key exists under
    /// [`WritePolicy::SkipExisting`].
    pub fn put(
        &self,
        bucket: &str,
        key: &str,
        source: impl Into<ObjectSource>,
        options: TransferOptions<'_>,
    ) -> OssResult<Option<String>> {
        let provider = self.provider()?;
        let source = source.into();
        let kind = source.kind();

        let written = self.write_object(provider, bucket, key, source, options);
        let written = self.settle(
            written,
            false,
            Event::ObjectPutFailed,
            &[("bucket", bucket), ("key", key), ("source", kind)],
        )?;
        if !written {
            return Ok(None);
        }

        // The write just happened, no need to check again
        self.resolver(provider).resolve(
            bucket,
            key,
            self.visibility(),
            self.config.expiration_seconds,
            false,
        )
    }

    fn write_object(
        &self,
        provider: &dyn StorageProvider,
        bucket: &str,
        key: &str,
        source: ObjectSource,
        options: TransferOptions<'_>,
    ) -> OssResult<bool> {
        if self.config.write_policy == WritePolicy::SkipExisting
            && provider.does_object_exist(bucket, key)?
        {
            self.logger.warn(
                Event::ObjectPutSkipped,
                &[("bucket", bucket), ("key", key), ("reason", "object already exists")],
            );
            return Ok(false);
        }

        let opened = source.open()?;
        let policy = AccessPolicy::new(self.visibility());

        let mut slot = None;
        let listener = options.attach(&mut slot, TransferDirection::Upload, &self.logger);
        let ack = provider.put_object(PutObjectRequest {
            bucket,
            key,
            body: opened.body,
            content_length: opened.content_length,
            metadata: policy.object_metadata(),
            listener,
        })?;

        let size = ack.size_bytes.to_string();
        self.logger.info(
            Event::ObjectPut,
            &[
                ("bucket", bucket),
                ("key", key),
                ("size_bytes", size.as_str()),
                ("etag", ack.etag.as_deref().unwrap_or("")),
                ("acl", policy.object_acl().as_str()),
            ],
        );
        Ok(true)
    }

    /// Read an object as text lines. `Ok(None)` if it cannot be read.
    pub fn get_lines(
        &self,
        bucket: &str,
        key: &str,
        options: TransferOptions<'_>,
    ) -> OssResult<Option<Vec<String>>> {
        let provider = self.provider()?;
        let lines = self.read_lines(provider, bucket, key, options).map(Some);
        self.settle(
            lines,
            None,
            Event::ObjectGetFailed,
            &[("bucket", bucket), ("key", key)],
        )
    }

    fn read_lines(
        &self,
        provider: &dyn StorageProvider,
        bucket: &str,
        key: &str,
        options: TransferOptions<'_>,
    ) -> OssResult<Vec<String>> {
        let mut slot = None;
        let listener = options.attach(&mut slot, TransferDirection::Download, &self.logger);
        let content = provider.get_object(bucket, key, listener)?;

        // The reader owns the provider stream; it is released when this returns.
        // Invalid UTF-8 is replaced, never rejected.
        let mut lines = Vec::new();
        for line in BufReader::new(content.body).split(b'\n') {
            let mut line = line?;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(lines)
    }

    /// Download an object to `path`. The object lands in a sibling staging file that
    /// is renamed over `path` once complete; on failure `path` is left as it was.
    pub fn get_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        options: TransferOptions<'_>,
    ) -> OssResult<bool> {
        let provider = self.provider()?;
        let target = path.display().to_string();
        let fields = [("bucket", bucket), ("key", key), ("path", target.as_str())];

        let downloaded = self.download(provider, bucket, key, path, options);
        match self.settle(downloaded.map(Some), None, Event::ObjectGetFailed, &fields)? {
            Some(size) => {
                let size = size.to_string();
                self.logger.info(
                    Event::ObjectFetched,
                    &[
                        ("bucket", bucket),
                        ("key", key),
                        ("path", target.as_str()),
                        ("size_bytes", size.as_str()),
                    ],
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn download(
        &self,
        provider: &dyn StorageProvider,
        bucket: &str,
        key: &str,
        path: &Path,
        options: TransferOptions<'_>,
    ) -> OssResult<u64> {
        let mut slot = None;
        let listener = options.attach(&mut slot, TransferDirection::Download, &self.logger);
        let content = provider.get_object(bucket, key, listener)?;

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "download target has no file name")
        })?;
        fs::create_dir_all(parent)?;
        let staged = parent.join(format!(".{}.{}.part", name.to_string_lossy(), Uuid::new_v4()));

        let mut body = content.body;
        let written = File::create(&staged)
            .and_then(|mut file| {
                let n = io::copy(&mut body, &mut file)?;
                file.sync_all()?;
                Ok(n)
            })
            .and_then(|n| fs::rename(&staged, path).map(|()| n));

        if written.is_err() {
            let _ = fs::remove_file(&staged);
        }
        Ok(written?)
    }

    /// Best-effort delete; provider errors are logged and dropped
    pub fn delete(&self, bucket: &str, key: &str) -> OssResult<()> {
        let provider = self.provider()?;
        let fields = [("bucket", bucket), ("key", key)];
        match provider.delete_object(bucket, key) {
            Ok(()) => {
                self.logger.info(Event::ObjectDeleted, &fields);
                Ok(())
            }
            Err(e) => self.settle(Err(e.into()), (), Event::ObjectDeleteFailed, &fields),
        }
    }

    /// `false` for missing objects and for any provider error
    pub fn exists(&self, bucket: &str, key: &str) -> OssResult<bool> {
        let provider = self.provider()?;
        self.settle(
            provider.does_object_exist(bucket, key).map_err(OssError::from),
            false,
            Event::ObjectExistsFailed,
            &[("bucket", bucket), ("key", key)],
        )
    }

    /// Access URL for an existing object, `None` if it is missing
    pub fn generate_url(&self, bucket: &str, key: &str) -> OssResult<Option<String>> {
        let provider = self.provider()?;
        self.resolver(provider).resolve(
            bucket,
            key,
            self.visibility(),
            self.config.expiration_seconds,
            true,
        )
    }

    /// Create the bucket unless it is already there (warns, no-op)
    pub fn create_bucket_if_absent(&self, bucket: &str) -> OssResult<()> {
        let provider = self.provider()?;
        let result = (|| -> OssResult<()> {
            if provider.does_bucket_exist(bucket)? {
                self.logger.warn(Event::BucketAlreadyPresent, &[("bucket", bucket)]);
                return Ok(());
            }

            let request = CreateBucketRequest::new(bucket, AccessPolicy::new(self.visibility()).bucket_acl());
            provider.create_bucket(&request)?;
            self.logger.info(
                Event::BucketCreated,
                &[
                    ("bucket", bucket),
                    ("acl", request.acl.as_str()),
                    ("storage_class", request.storage_class.as_str()),
                    ("redundancy", request.redundancy.as_str()),
                ],
            );
            Ok(())
        })();
        self.settle(result, (), Event::BucketCreateFailed, &[("bucket", bucket)])
    }

    /// All buckets; empty on failure
    pub fn list_buckets(&self) -> OssResult<Vec<BucketSummary>> {
        let provider = self.provider()?;
        self.settle(
            provider.list_buckets().map_err(OssError::from),
            Vec::new(),
            Event::BucketListFailed,
            &[],
        )
    }

    pub fn bucket_info(&self, bucket: &str) -> OssResult<Option<BucketInfo>> {
        let provider = self.provider()?;
        self.settle(
            provider.bucket_info(bucket).map(Some).map_err(OssError::from),
            None,
            Event::BucketInfoFailed,
            &[("bucket", bucket)],
        )
    }

    pub fn bucket_exists(&self, bucket: &str) -> OssResult<bool> {
        let provider = self.provider()?;
        self.settle(
            provider.does_bucket_exist(bucket).map_err(OssError::from),
            false,
            Event::BucketExistsFailed,
            &[("bucket", bucket)],
        )
    }

    /// Best-effort bucket delete
    pub fn delete_bucket(&self, bucket: &str) -> OssResult<()> {
        let provider = self.provider()?;
        match provider.delete_bucket(bucket) {
            Ok(()) => {
                self.logger.info(Event::BucketDeleted, &[("bucket", bucket)]);
                Ok(())
            }
            Err(e) => self.settle(Err(e.into()), (), Event::BucketDeleteFailed, &[("bucket", bucket)]),
        }
    }
}
