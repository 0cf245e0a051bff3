//! Filename derivation and sanitization for transfers and archive entries.
//!
//! Both the direct path and the bundling path name resources the same way:
//! the sanitized host followed by the sanitized, percent-decoded last path
//! segment. Streaming manifests never get a transfer name.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use super::DownloadError;
use super::constants::{COLLISION_SUFFIX_LEN, FALLBACK_FILENAME};

/// Streaming manifest extensions (HLS playlists and DASH manifests).
#[allow(clippy::expect_used)]
static STREAMING_MANIFEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(m3u8|mpd)$").expect("manifest regex is valid") // Static pattern, safe to panic
});

/// Host used when a URL has no host component.
const FALLBACK_DOMAIN: &str = "unknown-host";

/// Returns `true` if `url` names a streaming manifest.
///
/// The query string and fragment are ignored, so
/// `https://example.com/video/playlist.m3u8?x=1` matches.
#[must_use]
pub fn is_streaming_manifest(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    STREAMING_MANIFEST.is_match(path)
}

/// Sanitizes a single path component for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`. Names made only
/// of dots have their dots replaced so they cannot act as `.`/`..`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Sanitized host and filename parts of a resource URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Sanitized host.
    pub domain: String,
    /// Sanitized last path segment, or `file` when it is empty.
    pub filename: String,
}

impl UrlParts {
    /// Splits `url` into its sanitized host and last path segment.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if `url` cannot be parsed.
    pub fn parse(url: &str) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let domain = parsed
            .host_str()
            .map(sanitize_filename)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| FALLBACK_DOMAIN.to_string());

        let last = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
        let filename = sanitize_filename(&decoded);
        let filename = if filename.is_empty() {
            FALLBACK_FILENAME.to_string()
        } else {
            filename
        };

        Ok(Self { domain, filename })
    }

    /// `<domain>/<filename>`.
    #[must_use]
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.domain, self.filename)
    }
}

/// Derives the destination path for a direct transfer:
/// `<namespace>/<domain>/<filename>`.
///
/// # Errors
///
/// Returns [`DownloadError::UnsupportedFormat`] for streaming manifests and
/// [`DownloadError::InvalidUrl`] for unparseable URLs.
pub fn destination_path(namespace: &str, url: &str) -> Result<String, DownloadError> {
    if is_streaming_manifest(url) {
        return Err(DownloadError::unsupported_format(url));
    }
    let parts = UrlParts::parse(url)?;
    Ok(format!("{namespace}/{}", parts.relative_path()))
}

/// Derives the archive entry name for a fetched resource.
///
/// Unparseable URLs fall back to `file-<hash>`, which is stable per URL.
#[must_use]
pub fn entry_name_for_url(url: &str) -> String {
    match UrlParts::parse(url) {
        Ok(parts) => parts.relative_path(),
        Err(_) => format!("{FALLBACK_FILENAME}-{}", collision_suffix(url)),
    }
}

/// Short, stable token derived from a SHA-256 hash of `url`.
#[must_use]
pub fn collision_suffix(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = String::with_capacity(COLLISION_SUFFIX_LEN);
    for byte in digest.iter().take(COLLISION_SUFFIX_LEN.div_ceil(2)) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex.truncate(COLLISION_SUFFIX_LEN);
    hex
}

/// Inserts `-<suffix>` before the extension of the last path component.
///
/// `example.com/a.png` + `1f2e3d` becomes `example.com/a-1f2e3d.png`.
#[must_use]
pub fn with_suffix(name: &str, suffix: &str) -> String {
    let dir_end = name.rfind('/').map_or(0, |i| i + 1);
    let (dir, file) = name.split_at(dir_end);
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{dir}{}-{suffix}{}", &file[..dot], &file[dot..]),
        _ => format!("{dir}{file}-{suffix}"),
    }
}

/// Hands out unique archive entry names.
///
/// The first resource to claim a name keeps it; later colliding resources get
/// a suffix derived from their own URL, so the same selection always yields
/// the same names.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    /// Creates an allocator with no names taken.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `url`, suffixing it if it is already taken.
    pub fn allocate(&mut self, name: &str, url: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }

        let suffix = collision_suffix(url);
        let mut candidate = with_suffix(name, &suffix);
        let mut n = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = with_suffix(name, &format!("{suffix}-{n}"));
            n += 1;
        }
        candidate
    }
}
