//! Per-resource transfer records and progress counters.

use std::fmt;

use crate::download::{DownloadError, TransferHandle};

/// Lifecycle of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Accepted into a batch, not yet handed to a worker's I/O.
    Queued,
    /// Submitted to the transport, no progress reported yet.
    Starting,
    /// The transport reported bytes moving.
    InFlight,
    /// Finished successfully.
    Done,
    /// Finished unsuccessfully.
    Failed,
}

impl TransferState {
    /// Returns the lowercase label used in logs and summaries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of why a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Streaming manifest; never sent over the network.
    UnsupportedFormat,
    /// Non-success response or transport-level error while fetching.
    NetworkFailure,
    /// The transport refused the request outright.
    TransportRejection,
    /// The transport reported an interruption after the transfer began.
    InterruptedTransfer,
    /// Fetched, but the bytes did not fit in a classic zip archive.
    ArchiveRejected,
}

impl FailureKind {
    /// Maps a download error onto the failure taxonomy.
    #[must_use]
    pub fn classify(error: &DownloadError) -> Self {
        match error {
            DownloadError::UnsupportedFormat { .. } => Self::UnsupportedFormat,
            DownloadError::TransportRejection { .. } => Self::TransportRejection,
            DownloadError::EntryRejected { .. } => Self::ArchiveRejected,
            DownloadError::Interrupted { .. } | DownloadError::Io { .. } => {
                Self::InterruptedTransfer
            }
            DownloadError::Network { .. }
            | DownloadError::Timeout { .. }
            | DownloadError::HttpStatus { .. }
            | DownloadError::InvalidUrl { .. } => Self::NetworkFailure,
        }
    }

    /// Returns the label used in summaries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::NetworkFailure => "network_failure",
            Self::TransportRejection => "transport_rejection",
            Self::InterruptedTransfer => "interrupted_transfer",
            Self::ArchiveRejected => "archive_rejected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A selected resource; counted in progress.
    Resource,
    /// A generated archive handed to the transport; not counted.
    Archive,
}

/// The coordinator's view of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Resource key (URL), or archive filename for archive records.
    pub key: String,
    /// Handle returned by the transport, once submitted.
    pub external_handle: Option<TransferHandle>,
    /// Current state.
    pub state: TransferState,
    /// Failure classification when `state` is `Failed`.
    pub failure_kind: Option<FailureKind>,
    /// Failure reason when `state` is `Failed`.
    pub failure_reason: Option<String>,
    /// Resource or archive.
    pub kind: RecordKind,
}

impl TransferRecord {
    pub(crate) fn queued(key: &str) -> Self {
        Self {
            key: key.to_string(),
            external_handle: None,
            state: TransferState::Queued,
            failure_kind: None,
            failure_reason: None,
            kind: RecordKind::Resource,
        }
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, reason: String) {
        self.state = TransferState::Failed;
        self.failure_kind = Some(kind);
        self.failure_reason = Some(reason);
    }
}

/// Live progress counters over resource records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Resources accepted for transfer.
    pub selected: usize,
    /// Resources queued, starting or in flight.
    pub in_flight: usize,
    /// Resources finished successfully.
    pub done: usize,
    /// Resources finished unsuccessfully.
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Returns `true` once every selected resource reached a terminal state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.done + self.failed == self.selected
    }
}
