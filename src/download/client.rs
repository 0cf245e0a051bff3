//! HTTP client wrapper for fetching resources.
//!
//! This module provides the `HttpClient` struct which retrieves resource
//! bytes for bundling and streams direct transfers to disk, with timeout
//! configuration and structured errors.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for fetching resources.
///
/// This client is designed to be created once and shared by every worker,
/// taking advantage of connection pooling. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// use asset_bundler::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let bytes = client.fetch_bytes("https://example.com/logo.png").await?;
/// println!("fetched {} bytes", bytes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Client with the stock 30 s connect and 300 s read timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialised.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Client with explicit timeouts, in seconds.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialised. Use
    /// [`try_new_with_timeouts`](Self::try_new_with_timeouts) to handle that.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self::try_new_with_timeouts(connect_timeout_secs, read_timeout_secs)
            .expect("reqwest client builder rejected timeout configuration")
    }

    /// Fallible variant of [`new_with_timeouts`](Self::new_with_timeouts).
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn try_new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Fetches the full body of `url` into memory.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns a non-success status
    /// - The body cannot be read completely
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.send(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        debug!(bytes = body.len(), "fetched resource");
        Ok(body.to_vec())
    }

    /// Streams the body of `url` into `file`, an already claimed handle for
    /// `path`, returning the bytes written.
    ///
    /// `path` is removed when the request or the stream fails, so a failed
    /// transfer never leaves a partial file behind.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_bytes`](Self::fetch_bytes), plus
    /// [`DownloadError::Io`] when the file cannot be written.
    #[instrument(skip(self, file, path), fields(url = %url, path = %path.display()))]
    pub async fn download_into(
        &self,
        url: &str,
        mut file: File,
        path: &Path,
    ) -> Result<u64, DownloadError> {
        let result = match self.send(url).await {
            Ok(response) => stream_to_file(&mut file, response, url, path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                debug!(bytes, "transfer written");
                Ok(bytes)
            }
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(path).await;
                Err(e)
            }
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }
        Ok(response)
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut body = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_bytes_invalid_url() {
        let client = HttpClient::new();
        let result = client.fetch_bytes("not a url").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_download_into_invalid_url_removes_claimed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let file = File::create(&path).await.unwrap();
        let client = HttpClient::new();
        let result = client.download_into("::bad::", file, &path).await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_client_builds_with_custom_timeouts() {
        assert!(HttpClient::try_new_with_timeouts(1, 2).is_ok());
    }
}
