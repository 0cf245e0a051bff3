//! Runtime configuration for bundling and direct transfers.
//!
//! Values come from built-in defaults, then an optional JSON config file,
//! then command-line flags. Every source goes through
//! [`BundlerConfig::validate`] before use.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::download::HttpClient;
use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_DIRECT_CONCURRENCY, DEFAULT_FETCH_CONCURRENCY,
    DEFAULT_NAMESPACE, MAX_CONCURRENCY, MIN_CONCURRENCY, READ_TIMEOUT_SECS,
};

/// Largest accepted timeout, in seconds.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Config file name under the per-user config directory.
const CONFIG_FILE_NAME: &str = "config.json";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A worker count is outside `1..=16`.
    #[error("invalid value for `{field}`: {value}. Expected range: 1..=16")]
    InvalidConcurrency {
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: usize,
    },

    /// A timeout is zero or longer than an hour.
    #[error("invalid value for `{field}`: {value}. Expected range: 1..=3600")]
    InvalidTimeout {
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: u64,
    },

    /// The namespace is empty or not a single relative path segment.
    #[error("invalid namespace {value:?}: must be a non-empty folder name without separators")]
    InvalidNamespace {
        /// Offending value.
        value: String,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Settings shared by the fetch pool, dispatcher and bundler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerConfig {
    /// Folder transfers and archives are saved under.
    pub namespace: String,
    /// Worker count for the bundling fetch pool.
    pub fetch_concurrency: usize,
    /// Worker count for the direct-transfer dispatcher.
    pub direct_concurrency: usize,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout.
    pub read_timeout_secs: u64,
    /// Ask the transport to prompt for save locations.
    pub prompt_for_location: bool,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            direct_concurrency: DEFAULT_DIRECT_CONCURRENCY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            prompt_for_location: false,
        }
    }
}

impl BundlerConfig {
    /// Parses and validates a JSON config document. Missing fields keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields,
    /// and the [`validate`](Self::validate) errors for out-of-range values.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// the same errors as [`from_json_str`](Self::from_json_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Loads the per-user config file if one exists.
    ///
    /// # Errors
    ///
    /// Returns the [`load`](Self::load) errors for a file that exists but is
    /// unreadable or invalid.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path).map(Some),
            _ => Ok(None),
        }
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency("fetch_concurrency", self.fetch_concurrency)?;
        validate_concurrency("direct_concurrency", self.direct_concurrency)?;
        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout("read_timeout_secs", self.read_timeout_secs)?;
        validate_namespace(&self.namespace)
    }

    /// Builds an HTTP client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the client cannot be built.
    pub fn http_client(&self) -> Result<HttpClient, ConfigError> {
        Ok(HttpClient::try_new_with_timeouts(
            self.connect_timeout_secs,
            self.read_timeout_secs,
        )?)
    }
}

/// Resolves the per-user config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/asset-bundler/config.json`
/// 2. `$HOME/.config/asset-bundler/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("asset-bundler")
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("asset-bundler")
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Checks a worker count against `1..=16`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidConcurrency`] when out of range.
pub fn validate_concurrency(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidConcurrency { field, value })
    }
}

fn validate_timeout(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if (1..=MAX_TIMEOUT_SECS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeout { field, value })
    }
}

fn validate_namespace(value: &str) -> Result<(), ConfigError> {
    let valid = !value.trim().is_empty()
        && !value.contains(['/', '\\'])
        && value != "."
        && value != "..";
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidNamespace {
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = BundlerConfig::default();
        assert_eq!(config.namespace, "assets");
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.direct_concurrency, 3);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.read_timeout_secs, 300);
        assert!(!config.prompt_for_location);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_fields_keep_defaults() {
        let config = BundlerConfig::from_json_str(r#"{"fetch_concurrency": 8}"#).unwrap();
        assert_eq!(config.fetch_concurrency, 8);
        assert_eq!(config.direct_concurrency, 3);
        assert_eq!(config.namespace, "assets");
    }

    #[test]
    fn test_from_json_rejects_invalid_concurrency() {
        let err = BundlerConfig::from_json_str(r#"{"direct_concurrency": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConcurrency {
                field: "direct_concurrency",
                value: 0
            }
        ));
        assert!(err.to_string().contains("1..=16"), "{err}");

        let err = BundlerConfig::from_json_str(r#"{"fetch_concurrency": 17}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency { .. }));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = BundlerConfig::from_json_str(r#"{"concurency": 2}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_timeouts_and_namespaces() {
        let config = BundlerConfig {
            read_timeout_secs: 0,
            ..BundlerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { .. })
        ));

        for namespace in ["", "a/b", "..", "a\\b"] {
            let config = BundlerConfig {
                namespace: namespace.to_string(),
                ..BundlerConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidNamespace { .. })),
                "{namespace:?}"
            );
        }
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"namespace": "media", "prompt_for_location": true}"#).unwrap();

        let config = BundlerConfig::load(&path).unwrap();
        assert_eq!(config.namespace, "media");
        assert!(config.prompt_for_location);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = BundlerConfig::load(Path::new("/nonexistent/asset-bundler.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
