//! Upload sources

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;

use crate::errors::OssResult;
use crate::provider::oss::http_client;
use crate::provider::ProviderError;

/// Content handed to [`crate::OssClient::put`]
pub enum ObjectSource {
    /// In-memory bytes
    Bytes(Vec<u8>),
    /// Any readable stream; size is unknown up front
    Reader(Box<dyn Read + Send>),
    /// A local file, read as it uploads
    File(PathBuf),
    /// A remote URL, fetched and relayed
    Url(String),
}

/// An opened source ready to stream
pub struct OpenedSource {
    pub body: Box<dyn Read + Send>,
    pub content_length: Option<u64>,
}

impl fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSource")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl ObjectSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ObjectSource::File(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        ObjectSource::Url(url.into())
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        ObjectSource::Reader(Box::new(reader))
    }

    /// Short label for log records
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectSource::Bytes(_) => "bytes",
            ObjectSource::Reader(_) => "stream",
            ObjectSource::File(_) => "file",
            ObjectSource::Url(_) => "url",
        }
    }

    /// Open the source. Local files and remote URLs fail here rather than mid-upload.
    pub fn open(self) -> OssResult<OpenedSource> {
        match self {
            ObjectSource::Bytes(data) => Ok(OpenedSource {
                content_length: Some(data.len() as u64),
                body: Box::new(Cursor::new(data)),
            }),
            ObjectSource::Reader(reader) => Ok(OpenedSource {
                body: reader,
                content_length: None,
            }),
            ObjectSource::File(path) => {
                let file = File::open(&path)?;
                let content_length = file.metadata()?.len();
                Ok(OpenedSource {
                    body: Box::new(file),
                    content_length: Some(content_length),
                })
            }
            ObjectSource::Url(url) => {
                let http = http_client().map_err(|e| ProviderError::Transport(e.to_string()))?;
                fetch(&http, &url)
            }
        }
    }
}

/// GET `url` and relay its body. The request carries no deadline.
fn fetch(http: &Client, url: &str) -> OssResult<OpenedSource> {
    let response = http
        .get(url)
        .send()
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Service {
            status: status.as_u16(),
            code: String::new(),
            message: format!("fetching {} failed", url),
        }
        .into());
    }
    Ok(OpenedSource {
        content_length: response.content_length(),
        body: Box::new(response),
    })
}

impl fmt::Debug for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectSource::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            ObjectSource::Reader(_) => f.write_str("Reader(..)"),
            ObjectSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ObjectSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

impl From<&str> for ObjectSource {
    fn from(text: &str) -> Self {
        ObjectSource::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for ObjectSource {
    fn from(text: String) -> Self {
        ObjectSource::Bytes(text.into_bytes())
    }
}

impl From<Vec<u8>> for ObjectSource {
    fn from(data: Vec<u8>) -> Self {
        ObjectSource::Bytes(data)
    }
}

impl From<&[u8]> for ObjectSource {
    fn from(data: &[u8]) -> Self {
        ObjectSource::Bytes(data.to_vec())
    }
}

impl From<&Path> for ObjectSource {
    fn from(path: &Path) -> Self {
        ObjectSource::File(path.to_path_buf())
    }
}

impl From<PathBuf> for ObjectSource {
    fn from(path: PathBuf) -> Self {
        ObjectSource::File(path)
    }
}
