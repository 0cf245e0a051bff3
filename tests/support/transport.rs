//! In-memory host transport that records every request.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use asset_bundler::download::{
    DownloadRequest, DownloadSource, DownloadTransport, EventSender, TransferHandle,
    TransportEvent, TransportRejection,
};
use async_trait::async_trait;

/// Accepts requests and reports them complete straight away, unless told to
/// refuse archives.
pub struct RecordingTransport {
    requests: Mutex<Vec<DownloadRequest>>,
    events: EventSender,
    next_handle: AtomicU64,
    reject_archives: bool,
}

impl RecordingTransport {
    pub fn new(events: EventSender) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            events,
            next_handle: AtomicU64::new(1),
            reject_archives: false,
        }
    }

    pub fn rejecting_archives(events: EventSender) -> Self {
        Self {
            reject_archives: true,
            ..Self::new(events)
        }
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose source is a URL, in submission order.
    pub fn url_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r.source {
                DownloadSource::Url(url) => Some(url),
                DownloadSource::Bytes(_) => None,
            })
            .collect()
    }

    /// The first archive handed over, as `(filename, bytes)`.
    pub fn archive(&self) -> Option<(String, Vec<u8>)> {
        self.requests().into_iter().find_map(|r| match r.source {
            DownloadSource::Bytes(bytes) => Some((r.filename, bytes.to_vec())),
            DownloadSource::Url(_) => None,
        })
    }
}

#[async_trait]
impl DownloadTransport for RecordingTransport {
    async fn download(
        &self,
        request: DownloadRequest,
    ) -> Result<TransferHandle, TransportRejection> {
        let is_archive = matches!(request.source, DownloadSource::Bytes(_));
        self.requests.lock().unwrap().push(request);
        if is_archive && self.reject_archives {
            return Err(TransportRejection::new("downloads blocked"));
        }

        let handle = TransferHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let _ = self.events.send(TransportEvent::in_progress(handle));
        let _ = self.events.send(TransportEvent::complete(handle));
        Ok(handle)
    }
}
