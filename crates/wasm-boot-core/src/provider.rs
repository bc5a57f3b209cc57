//! Module binary delivery.
//!
//! This module provides [`BinaryProvider`], the abstraction over where the
//! compiled module bytes come from, with two delivery modes:
//!
//! - **Streaming**: a chunked byte stream, suitable for instantiation that
//!   overlaps with transfer
//! - **Buffered**: the fully collected byte buffer, used by the fallback
//!   instantiation path
//!
//! Three providers are included: [`HttpProvider`] (remote fetch),
//! [`FileProvider`] (local filesystem), and [`BytesProvider`] (a buffer the
//! host already holds).

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncReadExt;
use url::Url;

use wasm_boot_common::{BootError, FetchConfig};

/// Expected content type for streamed wasm fetches.
const WASM_CONTENT_TYPE: &str = "application/wasm";

/// A chunked stream of module binary bytes.
///
/// `next_chunk` yields `Ok(None)` at end of stream. Chunk boundaries carry
/// no meaning; callers must treat the concatenation as the binary.
#[async_trait]
pub trait ByteStream: Send {
    /// Read the next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BootError>;
}

/// Source of a module binary.
///
/// A provider describes its own capabilities: whether it can deliver a
/// live byte stream (`supports_streaming`) and whether the host already
/// holds the complete binary (`preloaded`). The instantiation strategy
/// selector consults both when choosing a path.
///
/// All I/O is asynchronous; a provider never blocks the caller.
#[async_trait]
pub trait BinaryProvider: Send + Sync {
    /// Human-readable description of the source, for logs and errors.
    fn describe(&self) -> String;

    /// Whether this source can deliver a live byte stream.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// The host-supplied binary, if the provider already holds the
    /// complete bytes. Forces the buffered instantiation path.
    fn preloaded(&self) -> Option<&[u8]> {
        None
    }

    /// Open a chunked byte stream over the binary.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Fetch`] if the source is unreachable or the
    /// transport rejects streaming delivery.
    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError>;

    /// Fetch the complete binary into memory.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Fetch`] if the source is unreachable.
    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetches the module binary over HTTP(S).
///
/// The streaming mode requires the response to be classified as
/// `application/wasm`; a wrong content type is a transport failure, which
/// lets the bootstrap fall back to the buffered mode. The buffered mode
/// ignores content classification, mirroring the asymmetry between
/// streaming and buffer-then-instantiate in the source environment.
pub struct HttpProvider {
    client: reqwest::Client,
    url: Url,
}

impl HttpProvider {
    /// Create a provider for the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: Url, config: &FetchConfig) -> Result<Self, BootError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BootError::fetch(url.as_str(), format!("client setup: {e}")))?;

        Ok(Self { client, url })
    }

    async fn get(&self) -> Result<reqwest::Response, BootError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| BootError::fetch(self.url.as_str(), e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| BootError::fetch(self.url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl BinaryProvider for HttpProvider {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        let response = self.get().await?;

        // Streaming delivery insists on the wasm media type.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with(WASM_CONTENT_TYPE) {
            return Err(BootError::fetch(
                self.url.as_str(),
                format!("unexpected content type '{content_type}', expected '{WASM_CONTENT_TYPE}'"),
            ));
        }

        Ok(Box::new(HttpStream {
            url: self.url.to_string(),
            response,
        }))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        let response = self.get().await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BootError::fetch(self.url.as_str(), e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

struct HttpStream {
    url: String,
    response: reqwest::Response,
}

#[async_trait]
impl ByteStream for HttpStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BootError> {
        let chunk = self
            .response
            .chunk()
            .await
            .map_err(|e| BootError::fetch(&self.url, e.to_string()))?;

        Ok(chunk.map(|b| b.to_vec()))
    }
}

// ============================================================================
// Filesystem
// ============================================================================

/// Reads the module binary from the local filesystem.
pub struct FileProvider {
    path: PathBuf,
    chunk_size: usize,
}

impl FileProvider {
    /// Create a provider for the given path.
    pub fn new(path: impl Into<PathBuf>, config: &FetchConfig) -> Self {
        Self {
            path: path.into(),
            chunk_size: config.chunk_size.max(1),
        }
    }
}

#[async_trait]
impl BinaryProvider for FileProvider {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| BootError::fetch(self.describe(), e.to_string()))?;

        Ok(Box::new(FileStream {
            path: self.describe(),
            file,
            chunk_size: self.chunk_size,
        }))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| BootError::fetch(self.describe(), e.to_string()))
    }
}

struct FileStream {
    path: String,
    file: tokio::fs::File,
    chunk_size: usize,
}

#[async_trait]
impl ByteStream for FileStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BootError> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self
            .file
            .read(&mut buf)
            .await
            .map_err(|e| BootError::fetch(&self.path, e.to_string()))?;

        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

// ============================================================================
// Supplied buffer
// ============================================================================

/// A module binary the host already holds in memory.
///
/// Reports itself as preloaded, which forces the buffered instantiation
/// path: there is no live transfer to overlap with.
pub struct BytesProvider {
    bytes: Vec<u8>,
    label: String,
}

impl BytesProvider {
    /// Wrap a host-supplied binary.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            label: "<supplied buffer>".into(),
        }
    }

    /// Wrap a host-supplied binary with a custom label for logs.
    pub fn with_label(bytes: impl Into<Vec<u8>>, label: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            label: label.into(),
        }
    }
}

#[async_trait]
impl BinaryProvider for BytesProvider {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn preloaded(&self) -> Option<&[u8]> {
        Some(&self.bytes)
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        Err(BootError::fetch(
            self.describe(),
            "supplied buffer has no streaming transport",
        ))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        Ok(self.bytes.clone())
    }
}
