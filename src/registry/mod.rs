//! Discovered resources and the user's selection over them.
//!
//! A [`Registry`] is an immutable snapshot of the resources found on a page,
//! keyed by URL. A [`SelectionSet`] records which of those keys the user
//! wants transferred, in the order they chose them.
//!
//! Registries are loaded from the JSON asset list written by discovery:
//!
//! ```
//! use asset_bundler::registry::{Registry, ResourceKind};
//!
//! let json = r#"[
//!     {"url": "https://example.com/a.png", "type": "image", "width": 64},
//!     {"url": "https://example.com/clip.mp4"}
//! ]"#;
//! let registry = Registry::from_json_str(json).unwrap();
//! assert_eq!(registry.len(), 2);
//! assert_eq!(registry.get("https://example.com/clip.mp4").unwrap().kind, ResourceKind::Video);
//! ```

mod descriptor;
mod selection;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use descriptor::{ResourceDescriptor, ResourceKind, truncate_url};
pub use selection::SelectionSet;

/// Errors that can occur while loading or saving an asset list.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The asset list is not valid JSON of the expected shape.
    #[error("invalid asset list: {0}")]
    Json(#[from] serde_json::Error),

    /// The asset list file could not be read or written.
    #[error("IO error accessing asset list {path}: {source}")]
    Io {
        /// Asset list path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// One entry of a discovery asset list, before kind inference.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAsset {
    url: String,
    #[serde(rename = "type", default)]
    kind: Option<ResourceKind>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    size_bytes: Option<u64>,
}

impl From<RawAsset> for ResourceDescriptor {
    fn from(raw: RawAsset) -> Self {
        let kind = raw
            .kind
            .unwrap_or_else(|| ResourceKind::guess_from_url(&raw.url));
        Self {
            url: raw.url,
            kind,
            width: raw.width,
            height: raw.height,
            size_bytes: raw.size_bytes,
        }
    }
}

/// Immutable, URL-keyed snapshot of discovered resources.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    resources: Vec<ResourceDescriptor>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Builds a registry, keeping the first descriptor for each URL.
    #[must_use]
    pub fn new(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        let mut resources = Vec::new();
        let mut index = HashMap::new();
        for descriptor in descriptors {
            if index.contains_key(&descriptor.url) {
                debug!(url = %descriptor.url, "dropping duplicate resource");
                continue;
            }
            index.insert(descriptor.url.clone(), resources.len());
            resources.push(descriptor);
        }
        Self { resources, index }
    }

    /// Parses a discovery asset list.
    ///
    /// Entries without a `type` get one guessed from the URL. Entries whose
    /// URL is not HTTP(S) are dropped with a warning; unknown fields are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Json`] if the text is not a JSON array of
    /// asset objects.
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let raw: Vec<RawAsset> = serde_json::from_str(json)?;
        let descriptors = raw.into_iter().filter_map(|asset| {
            if is_http_url(&asset.url) {
                Some(ResourceDescriptor::from(asset))
            } else {
                warn!(url = %asset.url, "skipping non-HTTP asset");
                None
            }
        });
        Ok(Self::new(descriptors))
    }

    /// Reads and parses an asset list file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] if the file cannot be read, or
    /// [`RegistryError::Json`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&text)?;
        debug!(path = %path.display(), resources = registry.len(), "loaded asset list");
        Ok(registry)
    }

    /// Serializes the registry back into asset list JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Json`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(&self.resources)?)
    }

    /// Looks up a resource by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ResourceDescriptor> {
        self.index.get(key).map(|&i| &self.resources[i])
    }

    /// Returns `true` if `key` is part of this snapshot.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Resources in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.iter()
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` when the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Selected keys that are present in this registry, in selection order.
    ///
    /// Keys that are not part of the snapshot are logged and left out.
    #[must_use]
    pub fn resolve_selection(&self, selection: &SelectionSet) -> Vec<String> {
        selection
            .iter()
            .filter(|key| {
                let known = self.contains(key);
                if !known {
                    warn!(key, "selected key is not in the registry");
                }
                known
            })
            .map(str::to_string)
            .collect()
    }
}

fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.get(..8).unwrap_or(candidate).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_registry_dedupes_first_wins() {
        let registry = Registry::new(vec![
            ResourceDescriptor::new("https://x.test/a.png", ResourceKind::Image),
            ResourceDescriptor::new("https://x.test/a.png", ResourceKind::Background),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("https://x.test/a.png").unwrap().kind,
            ResourceKind::Image
        );
    }

    #[test]
    fn test_from_json_infers_missing_kind_and_ignores_extra_fields() {
        let json = r#"[
            {"url": "https://x.test/clip.webm", "tag": "VIDEO", "filename": "clip.webm"},
            {"url": "https://x.test/bg.jpg", "type": "background", "sizeBytes": 99}
        ]"#;
        let registry = Registry::from_json_str(json).unwrap();
        assert_eq!(
            registry.get("https://x.test/clip.webm").unwrap().kind,
            ResourceKind::Video
        );
        let bg = registry.get("https://x.test/bg.jpg").unwrap();
        assert_eq!(bg.kind, ResourceKind::Background);
        assert_eq!(bg.size_bytes, Some(99));
    }

    #[test]
    fn test_from_json_drops_non_http_urls() {
        let json = r#"[
            {"url": "data:image/png;base64,AAAA", "type": "image"},
            {"url": "HTTPS://x.test/ok.png", "type": "image"}
        ]"#;
        let registry = Registry::from_json_str(json).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("HTTPS://x.test/ok.png"));
    }

    #[test]
    fn test_from_json_rejects_malformed_input() {
        let result = Registry::from_json_str(r#"{"url": "not an array"}"#);
        assert!(matches!(result, Err(RegistryError::Json(_))));
    }

    #[test]
    fn test_load_and_save_roundtrip_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"url": "https://x.test/a.png", "type": "image", "width": 10, "height": 20}}]"#
        )
        .unwrap();

        let registry = Registry::load(file.path()).unwrap();
        let json = registry.to_json_string().unwrap();
        let reloaded = Registry::from_json_str(&json).unwrap();
        assert_eq!(
            reloaded.get("https://x.test/a.png"),
            registry.get("https://x.test/a.png")
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Registry::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(RegistryError::Io { .. })));
    }

    #[test]
    fn test_resolve_selection_skips_unknown_keys() {
        let registry = Registry::new(vec![
            ResourceDescriptor::new("https://x.test/a.png", ResourceKind::Image),
            ResourceDescriptor::new("https://x.test/b.png", ResourceKind::Image),
        ]);
        let selection: SelectionSet = [
            "https://x.test/b.png",
            "https://x.test/missing.png",
            "https://x.test/a.png",
        ]
        .into_iter()
        .collect();
        assert_eq!(
            registry.resolve_selection(&selection),
            vec!["https://x.test/b.png", "https://x.test/a.png"]
        );
    }
}
