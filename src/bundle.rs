//! Bundling path: fetch, pack into one archive, hand it to the transport.
//!
//! Resources that cannot be fetched (or packed) are not lost: after the
//! archive has been submitted, each of them is handed exactly once to the
//! direct-transfer dispatcher.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::archive::ArchiveBlob;
use crate::config::BundlerConfig;
use crate::coordinator::TransferCoordinator;
use crate::download::{
    DispatchStats, Dispatcher, DownloadError, DownloadRequest, DownloadSource, DownloadTransport,
    FetchFailure, FetchPool, FetchedEntry, HttpClient, TransferHandle,
};

/// Returns `<namespace>/Assets-<YYYYMMDD-HHMMSS>.zip`.
#[must_use]
pub fn archive_filename(namespace: &str, timestamp: &NaiveDateTime) -> String {
    format!("{namespace}/Assets-{}.zip", timestamp.format("%Y%m%d-%H%M%S"))
}

/// What happened to the generated archive.
#[derive(Debug, Clone)]
pub enum ArchiveDelivery {
    /// Nothing was fetched, so no archive was built.
    Empty,
    /// The transport accepted the archive.
    Submitted {
        /// Destination filename handed to the transport.
        filename: String,
        /// Handle the transport returned.
        handle: TransferHandle,
    },
    /// The transport refused the archive; the bytes are returned so the
    /// caller can save them another way.
    Unsaved {
        /// Destination filename that was refused.
        filename: String,
        /// The encoded archive.
        bytes: Arc<[u8]>,
        /// Reason the transport gave.
        reason: String,
    },
}

impl ArchiveDelivery {
    /// Destination filename, if an archive was built.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Submitted { filename, .. } | Self::Unsaved { filename, .. } => {
                Some(filename.as_str())
            }
        }
    }
}

/// Summary of one bundling run.
#[derive(Debug)]
pub struct BundleReport {
    /// Fate of the archive.
    pub archive: ArchiveDelivery,
    /// Entries packed into the archive.
    pub entries: usize,
    /// Encoded archive length in bytes (0 when no archive was built).
    pub archive_len: u64,
    /// Streaming manifests that were skipped.
    pub skipped: Vec<String>,
    /// Resources left out of the archive, each handed to the fallback.
    pub failed: Vec<FetchFailure>,
    /// Fallback dispatch counts, when a fallback ran.
    pub fallback: Option<DispatchStats>,
}

/// Runs the bundling path against one transport.
#[derive(Clone)]
pub struct Bundler {
    pool: FetchPool,
    dispatcher: Dispatcher,
    transport: Arc<dyn DownloadTransport>,
    namespace: String,
    prompt_for_location: bool,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("pool", &self.pool)
            .field("dispatcher", &self.dispatcher)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    /// Creates a bundler from `config`.
    #[must_use]
    pub fn new(
        config: &BundlerConfig,
        client: HttpClient,
        transport: Arc<dyn DownloadTransport>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&transport))
            .with_namespace(config.namespace.clone())
            .with_concurrency(config.direct_concurrency)
            .with_prompt_for_location(config.prompt_for_location);
        Self {
            pool: FetchPool::new(client, config.fetch_concurrency),
            dispatcher,
            transport,
            namespace: config.namespace.clone(),
            prompt_for_location: config.prompt_for_location,
        }
    }

    /// Bundles `keys` into an archive stamped with the current local time.
    pub async fn bundle(
        &self,
        keys: &[String],
        coordinator: &Arc<TransferCoordinator>,
    ) -> BundleReport {
        self.bundle_at(keys, coordinator, Local::now().naive_local())
            .await
    }

    /// Bundles `keys` into an archive stamped with `timestamp`.
    ///
    /// The archive holds the fetched resources in selection order. It is
    /// submitted to the transport before the fallback runs, so a refused
    /// archive never blocks the individual transfers.
    #[instrument(skip(self, keys, coordinator), fields(selected = keys.len()))]
    pub async fn bundle_at(
        &self,
        keys: &[String],
        coordinator: &Arc<TransferCoordinator>,
        timestamp: NaiveDateTime,
    ) -> BundleReport {
        let outcome = self.pool.fetch_all(keys, coordinator).await;
        let mut failed = outcome.failed;

        let mut blob = ArchiveBlob::new(&timestamp);
        for FetchedEntry { url, entry } in outcome.entries {
            if let Err(e) = blob.push(entry) {
                warn!(url = url.as_str(), error = %e, "entry left out of archive");
                let error = DownloadError::entry_rejected(url.as_str(), e);
                failed.push(FetchFailure { url, error });
            }
        }

        let entries = blob.len();
        let (archive, archive_len) = if blob.is_empty() {
            info!("nothing fetched, no archive built");
            (ArchiveDelivery::Empty, 0)
        } else {
            let filename = archive_filename(&self.namespace, &timestamp);
            let archive_len = blob.encoded_len();
            let archive = self.submit_archive(&blob, filename, coordinator).await;
            (archive, archive_len)
        };

        let fallback = if failed.is_empty() {
            None
        } else {
            let urls: Vec<String> = failed.iter().map(|f| f.url.clone()).collect();
            info!(count = urls.len(), "handing failed resources to direct transfer");
            Some(self.dispatcher.dispatch(&urls, coordinator).await)
        };

        info!(
            entries,
            archive_len,
            skipped = outcome.skipped.len(),
            failed = failed.len(),
            "bundle complete"
        );
        BundleReport {
            archive,
            entries,
            archive_len,
            skipped: outcome.skipped,
            failed,
            fallback,
        }
    }

    async fn submit_archive(
        &self,
        blob: &ArchiveBlob,
        filename: String,
        coordinator: &TransferCoordinator,
    ) -> ArchiveDelivery {
        let bytes: Arc<[u8]> = blob.to_bytes().into();
        debug!(filename = filename.as_str(), bytes = bytes.len(), "archive encoded");

        let request = DownloadRequest {
            source: DownloadSource::Bytes(Arc::clone(&bytes)),
            filename: filename.clone(),
            prompt_for_location: self.prompt_for_location,
        };
        match self.transport.download(request).await {
            Ok(handle) => {
                info!(filename = filename.as_str(), %handle, "archive submitted");
                coordinator.track_archive(&filename, handle);
                ArchiveDelivery::Submitted { filename, handle }
            }
            Err(rejection) => {
                warn!(
                    filename = filename.as_str(),
                    reason = rejection.reason.as_str(),
                    "transport refused archive"
                );
                ArchiveDelivery::Unsaved {
                    filename,
                    bytes,
                    reason: rejection.reason,
                }
            }
        }
    }
}
