//! Error types for the download module.
//!
//! Every variant is scoped to a single resource. Workers record these errors
//! against the resource that produced them; none of them abort a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ArchiveError;

/// Errors that can occur while fetching or transferring a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The URL points at a streaming manifest (`.m3u8` / `.mpd`).
    #[error("unsupported format (streaming manifest): {url}")]
    UnsupportedFormat {
        /// The rejected URL.
        url: String,
    },

    /// The request or body stream failed below HTTP.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The resource URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The connect or read timeout elapsed.
    #[error("timed out fetching {url}")]
    Timeout {
        /// The resource URL.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The resource URL.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// The URL does not parse.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The raw string.
        url: String,
    },

    /// The host transport refused a download request.
    #[error("transport rejected {target}: {reason}")]
    TransportRejection {
        /// URL or archive name that was submitted.
        target: String,
        /// Reason given by the transport.
        reason: String,
    },

    /// The host transport reported an interruption after the transfer began.
    #[error("transfer of {url} interrupted: {detail}")]
    Interrupted {
        /// The URL being transferred.
        url: String,
        /// Opaque detail from the transport, passed through verbatim.
        detail: String,
    },

    /// A fetched resource could not be added to the archive.
    #[error("archive refused {url}: {source}")]
    EntryRejected {
        /// The URL whose bytes were refused.
        url: String,
        /// Why the archive refused the entry.
        #[source]
        source: ArchiveError,
    },

    /// Local filesystem failure while saving a transfer.
    #[error("IO error saving {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates an unsupported-format error.
    pub fn unsupported_format(url: impl Into<String>) -> Self {
        Self::UnsupportedFormat { url: url.into() }
    }

    /// Creates a network error from a reqwest error, mapping timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a transport rejection error.
    pub fn transport_rejection(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportRejection {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates an interrupted-transfer error.
    pub fn interrupted(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Interrupted {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates an archive-entry rejection.
    pub fn entry_rejected(url: impl Into<String>, source: ArchiveError) -> Self {
        Self::EntryRejected {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for failures that came from the network fetch itself.
    #[must_use]
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::HttpStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_display() {
        let error = DownloadError::unsupported_format("https://example.com/live.m3u8");
        let msg = error.to_string();
        assert!(msg.contains("unsupported format"), "{msg}");
        assert!(msg.contains("live.m3u8"), "{msg}");
    }

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status("https://example.com/a.png", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/a.png"), "{msg}");
        assert!(error.is_network_failure());
    }

    #[test]
    fn test_interrupted_passes_detail_verbatim() {
        let error = DownloadError::interrupted("https://example.com/a.png", "NETWORK_FAILED");
        assert!(error.to_string().ends_with("NETWORK_FAILED"));
        assert!(!error.is_network_failure());
    }

    #[test]
    fn test_transport_rejection_display() {
        let error = DownloadError::transport_rejection("assets/a.png", "path escapes root");
        let msg = error.to_string();
        assert!(msg.contains("assets/a.png"), "{msg}");
        assert!(msg.contains("path escapes root"), "{msg}");
    }

    #[test]
    fn test_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.png"), io_error);
        assert!(error.to_string().contains("/tmp/test.png"));
    }
}
