//! Constants for the download module (timeouts, pool sizes, naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Worker count for the bundling fetch pool.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Worker count for the direct-transfer dispatcher.
pub const DEFAULT_DIRECT_CONCURRENCY: usize = 3;

/// Minimum allowed pool size.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed pool size.
pub const MAX_CONCURRENCY: usize = 16;

/// Folder every transfer is placed under.
pub const DEFAULT_NAMESPACE: &str = "assets";

/// Filename used when a URL has no usable last path segment.
pub const FALLBACK_FILENAME: &str = "file";

/// Hex digits of the URL hash appended to colliding archive names.
pub const COLLISION_SUFFIX_LEN: usize = 6;
