//! The host download transport and the events it reports.
//!
//! A transport accepts a [`DownloadRequest`], returns an opaque
//! [`TransferHandle`] straight away, and later reports progress as
//! [`TransportEvent`]s on the channel it was built with. The coordinator
//! reconciles those events against its own records.
//!
//! [`FileTransport`] is the bundled implementation: it writes transfers under
//! a root directory, fetching URL sources with the [`HttpClient`].

use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::{DownloadError, HttpClient};

/// Numbered names tried before falling back to a timestamp suffix.
const MAX_NAME_SUFFIX: u32 = 999;

/// Opaque identifier the transport assigns to an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHandle(u64);

impl TransferHandle {
    /// Wraps a raw transport identifier.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw transport identifier.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the transport should save.
#[derive(Debug, Clone)]
pub enum DownloadSource {
    /// Fetch this URL.
    Url(String),
    /// Save these bytes as-is (used for generated archives).
    Bytes(Arc<[u8]>),
}

impl DownloadSource {
    /// Short label for logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// A single request handed to the transport.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Content to save.
    pub source: DownloadSource,
    /// Relative destination path, `/`-separated.
    pub filename: String,
    /// Ask the user where to save instead of using `filename` directly.
    pub prompt_for_location: bool,
}

/// Lifecycle states a transport reports for an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Bytes are moving.
    InProgress,
    /// The file is fully written.
    Complete,
    /// The transfer stopped after it began.
    Interrupted,
}

/// Asynchronous state change for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Handle returned when the request was accepted.
    pub handle: TransferHandle,
    /// New state.
    pub state: TransportState,
    /// Transport-specific detail for interruptions.
    pub error_detail: Option<String>,
}

impl TransportEvent {
    /// Transfer started moving bytes.
    #[must_use]
    pub fn in_progress(handle: TransferHandle) -> Self {
        Self {
            handle,
            state: TransportState::InProgress,
            error_detail: None,
        }
    }

    /// Transfer finished.
    #[must_use]
    pub fn complete(handle: TransferHandle) -> Self {
        Self {
            handle,
            state: TransportState::Complete,
            error_detail: None,
        }
    }

    /// Transfer interrupted with `detail`.
    #[must_use]
    pub fn interrupted(handle: TransferHandle, detail: impl Into<String>) -> Self {
        Self {
            handle,
            state: TransportState::Interrupted,
            error_detail: Some(detail.into()),
        }
    }
}

/// Sending half of a coordinator's inbound event queue.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Synchronous refusal of a download request. No events follow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct TransportRejection {
    /// Why the request was refused.
    pub reason: String,
}

impl TransportRejection {
    /// Creates a rejection with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The host's download primitive.
#[async_trait]
pub trait DownloadTransport: Send + Sync {
    /// Submits a request, returning its handle once accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportRejection`] when the request is refused outright.
    async fn download(&self, request: DownloadRequest)
    -> Result<TransferHandle, TransportRejection>;
}

/// Transport that saves transfers under a root directory.
///
/// Each accepted request runs on its own task and reports `InProgress`
/// followed by `Complete` or `Interrupted`. Existing files are never
/// overwritten; a numeric suffix is added instead.
#[derive(Debug)]
pub struct FileTransport {
    root: PathBuf,
    client: HttpClient,
    events: EventSender,
    next_handle: AtomicU64,
}

impl FileTransport {
    /// Creates a transport rooted at `root`, reporting on `events`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, client: HttpClient, events: EventSender) -> Self {
        Self {
            root: root.into(),
            client,
            events,
            next_handle: AtomicU64::new(1),
        }
    }

    /// Directory transfers are written under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DownloadTransport for FileTransport {
    #[instrument(skip(self, request), fields(filename = %request.filename))]
    async fn download(
        &self,
        request: DownloadRequest,
    ) -> Result<TransferHandle, TransportRejection> {
        let relative = validate_relative_path(&request.filename)?;
        if request.prompt_for_location {
            debug!("prompt requested; file transport saves to its root without prompting");
        }

        let handle = TransferHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let target = self.root.join(relative);
        let client = self.client.clone();
        let events = self.events.clone();
        let source = request.source;

        tokio::spawn(async move {
            let _ = events.send(TransportEvent::in_progress(handle));
            let event = match save(&client, &source, &target).await {
                Ok(path) => {
                    info!(%handle, path = %path.display(), "transfer saved");
                    TransportEvent::complete(handle)
                }
                Err(e) => {
                    warn!(%handle, source = %source.describe(), error = %e, "transfer interrupted");
                    TransportEvent::interrupted(handle, e.to_string())
                }
            };
            if events.send(event).is_err() {
                debug!(%handle, "event receiver dropped");
            }
        });

        Ok(handle)
    }
}

async fn save(
    client: &HttpClient,
    source: &DownloadSource,
    target: &Path,
) -> Result<PathBuf, DownloadError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    let (mut file, path) = create_unique(target).await?;

    match source {
        DownloadSource::Url(url) => {
            client.download_into(url, file, &path).await?;
        }
        DownloadSource::Bytes(bytes) => {
            let written = match file.write_all(bytes).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(DownloadError::io(&path, e));
            }
        }
    }
    Ok(path)
}

/// Accepts only non-empty relative paths made of normal components.
fn validate_relative_path(filename: &str) -> Result<PathBuf, TransportRejection> {
    if filename.trim().is_empty() {
        return Err(TransportRejection::new("empty filename"));
    }
    let path = Path::new(filename);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(TransportRejection::new(format!(
            "filename escapes download root: {filename}"
        )));
    }
    Ok(path.to_path_buf())
}

/// Creates a file at `target` or the first free `<stem>_<N><ext>` beside it.
///
/// Creation uses `create_new`, so two transfers racing for the same name
/// always end up in different files.
async fn create_unique(target: &Path) -> Result<(File, PathBuf), DownloadError> {
    let stem = target
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let ext = target
        .extension()
        .map_or_else(String::new, |e| format!(".{}", e.to_string_lossy()));

    let mut candidate = target.to_path_buf();
    for i in 1..=MAX_NAME_SUFFIX {
        match create_new(&candidate).await {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                candidate = target.with_file_name(format!("{stem}_{i}{ext}"));
            }
            Err(e) => return Err(DownloadError::io(&candidate, e)),
        }
    }

    let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S%f");
    let candidate = target.with_file_name(format!("{stem}_{timestamp}{ext}"));
    let file = create_new(&candidate)
        .await
        .map_err(|e| DownloadError::io(&candidate, e))?;
    Ok((file, candidate))
}

async fn create_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path).await
}
