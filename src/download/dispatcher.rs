//! Direct-transfer dispatcher for the per-item path.
//!
//! Each selected resource is handed to the host [`DownloadTransport`] as its
//! own request. The dispatcher only submits; completion arrives later as
//! transport events, which the coordinator applies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_DIRECT_CONCURRENCY, DEFAULT_NAMESPACE};
use super::filename::destination_path;
use super::transport::{DownloadRequest, DownloadSource, DownloadTransport};
use super::DownloadError;
use crate::coordinator::{FailureKind, TransferCoordinator, TransferState};

/// Counts from one [`Dispatcher::dispatch`] run.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicUsize,
    rejected: AtomicUsize,
    unsupported: AtomicUsize,
    invalid: AtomicUsize,
}

impl DispatchStats {
    /// Requests the transport accepted.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Requests the transport refused.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Streaming manifests refused before reaching the transport.
    #[must_use]
    pub fn unsupported(&self) -> usize {
        self.unsupported.load(Ordering::SeqCst)
    }

    /// URLs that could not be turned into a destination path.
    #[must_use]
    pub fn invalid(&self) -> usize {
        self.invalid.load(Ordering::SeqCst)
    }

    /// Every key that reached a worker.
    #[must_use]
    pub fn total(&self) -> usize {
        self.submitted() + self.rejected() + self.unsupported() + self.invalid()
    }
}

/// Submits selected resources to the transport with a fixed number of workers.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn DownloadTransport>,
    namespace: String,
    concurrency: usize,
    prompt_for_location: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("namespace", &self.namespace)
            .field("concurrency", &self.concurrency)
            .field("prompt_for_location", &self.prompt_for_location)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default namespace and worker count.
    #[must_use]
    pub fn new(transport: Arc<dyn DownloadTransport>) -> Self {
        Self {
            transport,
            namespace: DEFAULT_NAMESPACE.to_string(),
            concurrency: DEFAULT_DIRECT_CONCURRENCY,
            prompt_for_location: false,
        }
    }

    /// Sets the top-level directory transfers are saved under.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the worker count (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Asks the transport to prompt for a save location.
    #[must_use]
    pub fn with_prompt_for_location(mut self, prompt: bool) -> Self {
        self.prompt_for_location = prompt;
        self
    }

    /// Number of workers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Namespace transfers are saved under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Submits every key in `keys` to the transport.
    ///
    /// Keys are queued on `coordinator` first; keys with an active transfer
    /// are not dispatched again. Accepted requests are registered as
    /// `Starting` under the handle the transport returned. Streaming
    /// manifests and refused requests are recorded as failed immediately.
    ///
    /// Returns once every request has been submitted or refused, not when the
    /// transfers finish.
    #[instrument(skip(self, keys, coordinator), fields(selected = keys.len(), workers = self.concurrency))]
    pub async fn dispatch(
        &self,
        keys: &[String],
        coordinator: &Arc<TransferCoordinator>,
    ) -> DispatchStats {
        let accepted: Arc<[String]> = coordinator.begin_batch(keys).into();
        let stats = Arc::new(DispatchStats::default());
        let cursor = Arc::new(AtomicUsize::new(0));

        let workers = self.concurrency.min(accepted.len());
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let this = self.clone();
            let keys = Arc::clone(&accepted);
            let cursor = Arc::clone(&cursor);
            let stats = Arc::clone(&stats);
            let coordinator = Arc::clone(coordinator);

            handles.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(url) = keys.get(index) else {
                        break;
                    };
                    debug!(worker, index, url = url.as_str(), "claimed resource");
                    this.submit(url, &coordinator, &stats).await;
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch worker panicked");
            }
        }

        // A worker that died mid-submit leaves its claimed key queued.
        for url in accepted.iter() {
            let stranded = coordinator
                .record(url)
                .is_some_and(|r| r.state == TransferState::Queued);
            if stranded {
                record_failure(
                    coordinator,
                    url,
                    FailureKind::InterruptedTransfer,
                    "dispatch worker stopped".to_string(),
                );
            }
        }

        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| DispatchStats {
            submitted: AtomicUsize::new(shared.submitted()),
            rejected: AtomicUsize::new(shared.rejected()),
            unsupported: AtomicUsize::new(shared.unsupported()),
            invalid: AtomicUsize::new(shared.invalid()),
        });
        info!(
            submitted = stats.submitted(),
            rejected = stats.rejected(),
            unsupported = stats.unsupported(),
            invalid = stats.invalid(),
            "dispatch complete"
        );
        stats
    }

    async fn submit(&self, url: &str, coordinator: &TransferCoordinator, stats: &DispatchStats) {
        let filename = match destination_path(&self.namespace, url) {
            Ok(filename) => filename,
            Err(e) => {
                match e {
                    DownloadError::UnsupportedFormat { .. } => {
                        stats.unsupported.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {
                        stats.invalid.fetch_add(1, Ordering::SeqCst);
                    }
                }
                record_failure(coordinator, url, FailureKind::classify(&e), e.to_string());
                return;
            }
        };

        let request = DownloadRequest {
            source: DownloadSource::Url(url.to_string()),
            filename,
            prompt_for_location: self.prompt_for_location,
        };

        match self.transport.download(request).await {
            Ok(handle) => {
                debug!(url, %handle, "transport accepted request");
                stats.submitted.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = coordinator.mark_starting(url, handle) {
                    warn!(url, %handle, error = %e, "failed to register transfer");
                }
            }
            Err(rejection) => {
                stats.rejected.fetch_add(1, Ordering::SeqCst);
                record_failure(
                    coordinator,
                    url,
                    FailureKind::TransportRejection,
                    rejection.reason,
                );
            }
        }
    }
}

fn record_failure(coordinator: &TransferCoordinator, url: &str, kind: FailureKind, reason: String) {
    if let Err(e) = coordinator.mark_failed(url, kind, reason) {
        warn!(url, error = %e, "failed to record transfer failure");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::coordinator::TransferState;
    use crate::download::{TransferHandle, TransportRejection};

    /// Records requests; rejects filenames containing `reject`.
    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<DownloadRequest>>,
        next: AtomicUsize,
    }

    #[async_trait]
    impl DownloadTransport for RecordingTransport {
        async fn download(
            &self,
            request: DownloadRequest,
        ) -> Result<TransferHandle, TransportRejection> {
            let reject = request.filename.contains("reject");
            self.requests.lock().unwrap().push(request);
            if reject {
                return Err(TransportRejection::new("blocked by policy"));
            }
            let id = self.next.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(TransferHandle::new(id))
        }
    }

    fn setup() -> (Arc<RecordingTransport>, Arc<TransferCoordinator>) {
        let (coordinator, _tx) = TransferCoordinator::new();
        (Arc::new(RecordingTransport::default()), Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_dispatch_submits_with_destination_paths() {
        let (transport, coordinator) = setup();
        let dispatcher = Dispatcher::new(transport.clone()).with_namespace("media");
        let key = "https://cdn.example.com/img/My%20Photo.jpg".to_string();

        let stats = dispatcher
            .dispatch(std::slice::from_ref(&key), &coordinator)
            .await;

        assert_eq!(stats.submitted(), 1);
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].filename, "media/cdn.example.com/My Photo.jpg");
        assert!(!requests[0].prompt_for_location);
        assert!(matches!(&requests[0].source, DownloadSource::Url(u) if *u == key));
        let record = coordinator.record(&key).unwrap();
        assert_eq!(record.state, TransferState::Starting);
        assert_eq!(record.external_handle, Some(TransferHandle::new(1)));
    }

    #[tokio::test]
    async fn test_dispatch_never_submits_streaming_manifests() {
        let (transport, coordinator) = setup();
        let key = "https://example.com/video/playlist.m3u8?x=1".to_string();

        let stats = Dispatcher::new(transport.clone())
            .dispatch(std::slice::from_ref(&key), &coordinator)
            .await;

        assert_eq!(stats.unsupported(), 1);
        assert!(transport.requests.lock().unwrap().is_empty());
        let record = coordinator.record(&key).unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::UnsupportedFormat));
    }

    #[tokio::test]
    async fn test_dispatch_records_rejection_reason() {
        let (transport, coordinator) = setup();
        let key = "https://example.com/reject.png".to_string();

        let stats = Dispatcher::new(transport)
            .dispatch(std::slice::from_ref(&key), &coordinator)
            .await;

        assert_eq!(stats.rejected(), 1);
        let record = coordinator.record(&key).unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::TransportRejection));
        assert_eq!(record.failure_reason.as_deref(), Some("blocked by policy"));
    }

    #[tokio::test]
    async fn test_dispatch_skips_active_keys() {
        let (transport, coordinator) = setup();
        let dispatcher = Dispatcher::new(transport.clone());
        let key = "https://example.com/a.png".to_string();

        dispatcher
            .dispatch(std::slice::from_ref(&key), &coordinator)
            .await;
        let again = dispatcher
            .dispatch(std::slice::from_ref(&key), &coordinator)
            .await;

        assert_eq!(again.total(), 0);
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_handles_many_keys_with_few_workers() {
        let (transport, coordinator) = setup();
        let keys: Vec<String> = (0..10)
            .map(|i| format!("https://example.com/{i}.png"))
            .collect();

        let stats = Dispatcher::new(transport.clone())
            .with_concurrency(3)
            .dispatch(&keys, &coordinator)
            .await;

        assert_eq!(stats.submitted(), 10);
        assert_eq!(coordinator.progress().selected, 10);
        assert_eq!(coordinator.progress().in_flight, 10);
    }

    /// Panics on filenames containing `panic`; tracks how many calls overlap.
    #[derive(Default)]
    struct SlowTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
        next: AtomicUsize,
    }

    #[async_trait]
    impl DownloadTransport for SlowTransport {
        async fn download(
            &self,
            request: DownloadRequest,
        ) -> Result<TransferHandle, TransportRejection> {
            assert!(!request.filename.contains("panic"), "transport blew up");
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            let id = self.next.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(TransferHandle::new(id))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dispatch_never_exceeds_worker_count() {
        let (coordinator, _tx) = TransferCoordinator::new();
        let coordinator = Arc::new(coordinator);
        let transport = Arc::new(SlowTransport::default());
        let keys: Vec<String> = (0..12)
            .map(|i| format!("https://example.com/{i}.png"))
            .collect();

        let stats = Dispatcher::new(transport.clone())
            .dispatch(&keys, &coordinator)
            .await;

        assert_eq!(stats.submitted(), 12);
        assert_eq!(transport.peak.load(Ordering::SeqCst), DEFAULT_DIRECT_CONCURRENCY);
        assert_eq!(transport.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_fails_key_left_by_crashed_worker() {
        let (coordinator, _tx) = TransferCoordinator::new();
        let coordinator = Arc::new(coordinator);
        let transport = Arc::new(SlowTransport::default());
        let crashed = "https://example.com/panic.png".to_string();
        let fine = "https://example.com/fine.png".to_string();

        let stats = Dispatcher::new(transport)
            .dispatch(&[crashed.clone(), fine.clone()], &coordinator)
            .await;

        assert_eq!(stats.submitted(), 1);
        let record = coordinator.record(&crashed).unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::InterruptedTransfer));
        assert_eq!(record.failure_reason.as_deref(), Some("dispatch worker stopped"));
        assert_eq!(
            coordinator.record(&fine).unwrap().state,
            TransferState::Starting
        );
        assert_eq!(coordinator.progress().failed, 1);
    }
}
