//! Fetching and transferring selected resources.
//!
//! Two paths share this module:
//!
//! - The bundling path: [`FetchPool`] pulls resources into memory with the
//!   [`HttpClient`] so they can be packed into one archive.
//! - The per-item path: [`Dispatcher`] hands each resource to a
//!   [`DownloadTransport`] and leaves completion to transport events.
//!
//! Both derive names with the same rules (see [`destination_path`] and
//! [`entry_name_for_url`]) and both refuse streaming manifests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use asset_bundler::coordinator::TransferCoordinator;
//! use asset_bundler::download::{FetchPool, HttpClient};
//!
//! # async fn example() {
//! let (coordinator, _events) = TransferCoordinator::new();
//! let coordinator = Arc::new(coordinator);
//! let pool = FetchPool::with_defaults(HttpClient::new());
//! let outcome = pool
//!     .fetch_all(&["https://example.com/logo.png".to_string()], &coordinator)
//!     .await;
//! println!("{} entries, {} failed", outcome.entries.len(), outcome.failed.len());
//! # }
//! ```

mod client;
pub mod constants;
mod dispatcher;
mod error;
mod fetch_pool;
mod filename;
mod transport;

pub use client::HttpClient;
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::DownloadError;
pub use fetch_pool::{FetchFailure, FetchOutcome, FetchPool, FetchedEntry};
pub use filename::{
    NameAllocator, UrlParts, collision_suffix, destination_path, entry_name_for_url,
    is_streaming_manifest, sanitize_filename,
};
pub use transport::{
    DownloadRequest, DownloadSource, DownloadTransport, EventSender, FileTransport,
    TransferHandle, TransportEvent, TransportRejection, TransportState,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
