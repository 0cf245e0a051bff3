//! Bounded fetch pool for the bundling path.
//!
//! Workers claim the next unclaimed selection index from a shared atomic
//! cursor, fetch that resource into memory and checksum it, and store the
//! result in the slot pre-allocated for that index. Archive order is therefore
//! fixed by the selection, not by which response arrives first.
//!
//! After every worker has finished, entry names are deduplicated in slot order
//! and the slots are compacted into [`FetchOutcome::entries`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::constants::DEFAULT_FETCH_CONCURRENCY;
use super::filename::{NameAllocator, entry_name_for_url, is_streaming_manifest};
use super::{DownloadError, HttpClient};
use crate::archive::ArchiveEntry;
use crate::coordinator::{FailureKind, TransferCoordinator};

/// A resource that could not be fetched for the archive.
#[derive(Debug)]
pub struct FetchFailure {
    /// The resource URL.
    pub url: String,
    /// Why the fetch failed.
    pub error: DownloadError,
}

/// A fetched resource and the archive entry built from it.
#[derive(Debug)]
pub struct FetchedEntry {
    /// The resource URL.
    pub url: String,
    /// The checksummed entry, name already deduplicated.
    pub entry: ArchiveEntry,
}

/// Result of one [`FetchPool::fetch_all`] run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Fetched entries in selection order, names deduplicated.
    pub entries: Vec<FetchedEntry>,
    /// Streaming manifests that were never fetched.
    pub skipped: Vec<String>,
    /// Resources whose fetch failed, in selection order.
    pub failed: Vec<FetchFailure>,
}

impl FetchOutcome {
    /// URLs of the failed fetches, in selection order.
    #[must_use]
    pub fn failed_urls(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.url.clone()).collect()
    }
}

type Slot = Option<Result<ArchiveEntry, DownloadError>>;

/// Fetches selected resources into memory with a fixed number of workers.
#[derive(Debug, Clone)]
pub struct FetchPool {
    client: HttpClient,
    concurrency: usize,
}

impl FetchPool {
    /// Creates a pool with `concurrency` workers (at least one).
    #[must_use]
    pub fn new(client: HttpClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Creates a pool with the default worker count.
    #[must_use]
    pub fn with_defaults(client: HttpClient) -> Self {
        Self::new(client, DEFAULT_FETCH_CONCURRENCY)
    }

    /// Number of workers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches every key in `keys` and returns the ordered archive entries.
    ///
    /// Streaming manifests are skipped without a network request and are not
    /// registered with the coordinator. Every other key is queued on
    /// `coordinator` and marked done or failed as its fetch finishes. Keys
    /// that already have an active transfer are left alone.
    ///
    /// Individual fetch failures never abort the run; they are collected in
    /// [`FetchOutcome::failed`].
    #[instrument(skip(self, keys, coordinator), fields(selected = keys.len(), workers = self.concurrency))]
    pub async fn fetch_all(
        &self,
        keys: &[String],
        coordinator: &Arc<TransferCoordinator>,
    ) -> FetchOutcome {
        let (skipped, candidates): (Vec<String>, Vec<String>) = keys
            .iter()
            .cloned()
            .partition(|url| is_streaming_manifest(url));
        for url in &skipped {
            info!(url = url.as_str(), "skipping streaming manifest");
        }

        let accepted: Arc<[String]> = coordinator.begin_batch(&candidates).into();
        let slots: Arc<Mutex<Vec<Slot>>> =
            Arc::new(Mutex::new((0..accepted.len()).map(|_| None).collect()));
        let cursor = Arc::new(AtomicUsize::new(0));

        let workers = self.concurrency.min(accepted.len());
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let client = self.client.clone();
            let keys = Arc::clone(&accepted);
            let slots = Arc::clone(&slots);
            let cursor = Arc::clone(&cursor);
            let coordinator = Arc::clone(coordinator);

            handles.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(url) = keys.get(index) else {
                        break;
                    };
                    debug!(worker, index, url = url.as_str(), "claimed resource");

                    let result = fetch_entry(&client, url).await;
                    report(&coordinator, url, &result);
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
                }
            }));
        }

        debug!(task_count = handles.len(), "waiting for fetch workers");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "fetch worker panicked");
            }
        }

        let slots = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
        let outcome = assemble(&accepted, slots, skipped, coordinator);
        info!(
            entries = outcome.entries.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            "fetch pool settled"
        );
        outcome
    }
}

async fn fetch_entry(client: &HttpClient, url: &str) -> Result<ArchiveEntry, DownloadError> {
    let bytes = client.fetch_bytes(url).await?;
    ArchiveEntry::new(entry_name_for_url(url), bytes)
        .map_err(|e| DownloadError::entry_rejected(url, e))
}

fn report(
    coordinator: &TransferCoordinator,
    url: &str,
    result: &Result<ArchiveEntry, DownloadError>,
) {
    let marked = match result {
        Ok(entry) => {
            debug!(url, bytes = entry.size(), crc32 = entry.crc32(), "fetched");
            coordinator.mark_done(url)
        }
        Err(e) => {
            warn!(url, error = %e, "fetch failed");
            coordinator.mark_failed(url, FailureKind::classify(e), e.to_string())
        }
    };
    if let Err(e) = marked {
        warn!(url, error = %e, "failed to record fetch result");
    }
}

/// Deduplicates names in slot order and compacts the slots.
fn assemble(
    keys: &[String],
    slots: Vec<Slot>,
    skipped: Vec<String>,
    coordinator: &TransferCoordinator,
) -> FetchOutcome {
    let mut names = NameAllocator::new();
    let mut outcome = FetchOutcome {
        skipped,
        ..FetchOutcome::default()
    };

    for (url, slot) in keys.iter().zip(slots) {
        let result = match slot {
            Some(Ok(entry)) => {
                let name = names.allocate(entry.name(), url);
                if name == entry.name() {
                    Ok(entry)
                } else {
                    debug!(url = url.as_str(), name = name.as_str(), "renamed colliding entry");
                    entry
                        .rename(name)
                        .map_err(|e| DownloadError::entry_rejected(url.as_str(), e))
                }
            }
            Some(Err(e)) => Err(e),
            None => {
                let result = Err(DownloadError::interrupted(url.as_str(), "fetch worker stopped"));
                report(coordinator, url, &result);
                result
            }
        };

        match result {
            Ok(entry) => outcome.entries.push(FetchedEntry {
                url: url.clone(),
                entry,
            }),
            Err(error) => outcome.failed.push(FetchFailure {
                url: url.clone(),
                error,
            }),
        }
    }
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::coordinator::TransferState;
    use crate::download::collision_suffix;

    fn pool() -> FetchPool {
        FetchPool::new(HttpClient::new(), 4)
    }

    #[test]
    fn test_new_clamps_zero_concurrency() {
        assert_eq!(FetchPool::new(HttpClient::new(), 0).concurrency(), 1);
        assert_eq!(FetchPool::with_defaults(HttpClient::new()).concurrency(), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_empty_selection() {
        let (coordinator, _tx) = TransferCoordinator::new();
        let outcome = pool().fetch_all(&[], &Arc::new(coordinator)).await;
        assert!(outcome.entries.is_empty());
        assert!(outcome.failed.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_skips_manifests_without_registering() {
        let (coordinator, _tx) = TransferCoordinator::new();
        let coordinator = Arc::new(coordinator);
        let keys = vec!["https://example.invalid/live/playlist.m3u8?x=1".to_string()];

        let outcome = pool().fetch_all(&keys, &coordinator).await;

        assert_eq!(outcome.skipped, keys);
        assert!(coordinator.record(&keys[0]).is_none());
        assert_eq!(coordinator.progress().selected, 0);
    }

    #[tokio::test]
    async fn test_fetch_all_records_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (coordinator, _tx) = TransferCoordinator::new();
        let coordinator = Arc::new(coordinator);
        let ok = format!("{}/ok.png", server.uri());
        let gone = format!("{}/gone.png", server.uri());

        let outcome = pool()
            .fetch_all(&[ok.clone(), gone.clone()], &coordinator)
            .await;

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].entry.data(), b"png");
        assert_eq!(outcome.entries[0].url, ok);
        assert_eq!(outcome.failed_urls(), vec![gone.clone()]);
        assert!(matches!(
            outcome.failed[0].error,
            DownloadError::HttpStatus { status: 404, .. }
        ));
        assert_eq!(coordinator.record(&ok).unwrap().state, TransferState::Done);
        let failed = coordinator.record(&gone).unwrap();
        assert_eq!(failed.state, TransferState::Failed);
        assert_eq!(failed.failure_kind, Some(FailureKind::NetworkFailure));
    }

    #[tokio::test]
    async fn test_fetch_all_deduplicates_names_in_selection_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/y/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"y".to_vec()))
            .mount(&server)
            .await;

        let (coordinator, _tx) = TransferCoordinator::new();
        let first = format!("{}/x/logo.png", server.uri());
        let second = format!("{}/y/logo.png", server.uri());

        let outcome = pool()
            .fetch_all(&[first, second.clone()], &Arc::new(coordinator))
            .await;

        let names: Vec<&str> = outcome.entries.iter().map(|f| f.entry.name()).collect();
        assert_eq!(names[0], "127.0.0.1/logo.png");
        assert_eq!(
            names[1],
            format!("127.0.0.1/logo-{}.png", collision_suffix(&second))
        );
        assert_eq!(outcome.entries[1].entry.data(), b"y");
    }
}
