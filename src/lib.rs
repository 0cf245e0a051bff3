//! Asset Bundler Core Library
//!
//! This library turns a list of discovered page resources (images, videos,
//! CSS backgrounds) into saved files, either one transfer per resource or a
//! single store-only zip archive.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`registry`] - Resource descriptors, asset list I/O and selections
//! - [`archive`] - CRC-32 and the store-only zip encoder
//! - [`download`] - HTTP fetching, the fetch pool, the direct-transfer
//!   dispatcher and the host transport seam
//! - [`coordinator`] - Transfer state machine and progress counters
//! - [`bundle`] - The bundling path with per-item fallback
//! - [`config`] - Runtime configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod bundle;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod registry;
mod user_agent;

// Re-export commonly used types
pub use archive::{ArchiveBlob, ArchiveEntry, ArchiveError, build_archive, crc32};
pub use bundle::{ArchiveDelivery, BundleReport, Bundler, archive_filename};
pub use config::{BundlerConfig, ConfigError};
pub use coordinator::{
    CoordinatorError, FailureKind, ProgressSnapshot, TransferCoordinator, TransferRecord,
    TransferState,
};
pub use download::{
    Dispatcher, DownloadError, DownloadRequest, DownloadSource, DownloadTransport, FetchPool,
    FileTransport, HttpClient, TransferHandle, TransportEvent, TransportRejection,
};
pub use registry::{
    Registry, RegistryError, ResourceDescriptor, ResourceKind, SelectionSet, truncate_url,
};
