//! Resource descriptors produced by page discovery.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Media extensions that identify a video resource.
#[allow(clippy::expect_used)]
static VIDEO_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(mp4|webm|ogg)$").expect("video regex is valid") // Static pattern, safe to panic
});

/// What kind of page element referenced a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// `<img>` or `<picture>` source.
    Image,
    /// `<video>` or its `<source>` children.
    Video,
    /// CSS `background-image` declaration.
    Background,
}

impl ResourceKind {
    /// Returns the lowercase label used in asset lists.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Background => "background",
        }
    }

    /// Guesses a kind from the URL's file extension, ignoring the query string.
    ///
    /// Anything that is not a recognised video extension is treated as an image.
    #[must_use]
    pub fn guess_from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if VIDEO_EXTENSION.is_match(path) {
            Self::Video
        } else {
            Self::Image
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "background" => Ok(Self::Background),
            _ => Err(format!("invalid resource kind: {s}")),
        }
    }
}

/// A single discovered resource. The URL is its identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Absolute HTTP(S) URL of the resource.
    pub url: String,
    /// Element kind that referenced the resource.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Intrinsic width in pixels, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Intrinsic height in pixels, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Transfer size reported by the page, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with no dimension or size metadata.
    #[must_use]
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            kind,
            width: None,
            height: None,
            size_bytes: None,
        }
    }

    /// Identity key of this resource.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.url
    }
}

/// Shortens `url` to at most `max` characters by eliding its middle.
///
/// ```
/// use asset_bundler::registry::truncate_url;
///
/// assert_eq!(truncate_url("https://example.com/a.png", 60), "https://example.com/a.png");
/// assert_eq!(truncate_url("https://example.com/images/very/long/path.png", 20), "https://...path.png");
/// ```
#[must_use]
pub fn truncate_url(url: &str, max: usize) -> String {
    let len = url.chars().count();
    if len <= max {
        return url.to_string();
    }
    let half = max.saturating_sub(3) / 2;
    let head: String = url.chars().take(half).collect();
    let tail: String = url.chars().skip(len - half).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_kind_video_extensions() {
        assert_eq!(
            ResourceKind::guess_from_url("https://cdn.example.com/clip.MP4"),
            ResourceKind::Video
        );
        assert_eq!(
            ResourceKind::guess_from_url("https://cdn.example.com/clip.webm?t=10"),
            ResourceKind::Video
        );
    }

    #[test]
    fn test_guess_kind_defaults_to_image() {
        assert_eq!(
            ResourceKind::guess_from_url("https://example.com/photo.jpg"),
            ResourceKind::Image
        );
        assert_eq!(
            ResourceKind::guess_from_url("https://example.com/no-extension"),
            ResourceKind::Image
        );
        // Extension inside the query string does not count.
        assert_eq!(
            ResourceKind::guess_from_url("https://example.com/player?src=a.mp4x"),
            ResourceKind::Image
        );
    }

    #[test]
    fn test_kind_from_str_roundtrips_labels() {
        for kind in [
            ResourceKind::Image,
            ResourceKind::Video,
            ResourceKind::Background,
        ] {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("audio".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let mut descriptor =
            ResourceDescriptor::new("https://example.com/a.png", ResourceKind::Background);
        descriptor.size_bytes = Some(1024);
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains(r#""type":"background""#), "{json}");
        assert!(json.contains(r#""sizeBytes":1024"#), "{json}");
        assert!(!json.contains("width"), "{json}");
    }

    #[test]
    fn test_truncate_url_elides_middle() {
        let url = "https://example.com/images/very/long/path.png";
        let short = truncate_url(url, 20);
        assert_eq!(short, "https://...path.png");
        assert!(short.chars().count() <= 20);
    }

    #[test]
    fn test_truncate_url_short_input_unchanged() {
        assert_eq!(truncate_url("abc", 3), "abc");
    }
}
