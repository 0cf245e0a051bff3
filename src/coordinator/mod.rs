//! Transfer coordinator: the single owner of transfer state.
//!
//! Workers report what they did through `mark_*` calls; the host transport
//! reports what happened afterwards through [`TransportEvent`]s on the
//! inbound queue. The coordinator reconciles both against one map of
//! [`TransferRecord`]s and publishes a [`ProgressSnapshot`] after every
//! change.
//!
//! Event handling is idempotent. Events for handles the coordinator has not
//! registered yet are parked until the handle is registered (the transport
//! may report before the dispatcher has recorded the handle it returned);
//! events that would move a terminal record, or that refer to a superseded
//! handle, are dropped.
//!
//! # Example
//!
//! ```
//! use asset_bundler::coordinator::{TransferCoordinator, TransferState};
//! use asset_bundler::download::{TransferHandle, TransportEvent};
//!
//! # fn example() -> Result<(), asset_bundler::coordinator::CoordinatorError> {
//! let (coordinator, events) = TransferCoordinator::new();
//! let key = "https://example.com/a.png".to_string();
//! coordinator.begin_batch(std::slice::from_ref(&key));
//! coordinator.mark_starting(&key, TransferHandle::new(7))?;
//!
//! events.send(TransportEvent::complete(TransferHandle::new(7))).ok();
//! coordinator.drain_events();
//! assert_eq!(coordinator.record(&key).map(|r| r.state), Some(TransferState::Done));
//! assert!(coordinator.progress().is_settled());
//! # Ok(())
//! # }
//! ```

mod record;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::download::{EventSender, TransferHandle, TransportEvent, TransportState};

pub use record::{FailureKind, ProgressSnapshot, RecordKind, TransferRecord, TransferState};

/// Detail recorded when an interruption event carries none.
const UNKNOWN_INTERRUPTION: &str = "interrupted";

/// Misuse of the coordinator's registration API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The key was never accepted by [`TransferCoordinator::begin_batch`].
    #[error("no transfer record for {key}")]
    UnknownKey {
        /// The unknown key.
        key: String,
    },

    /// The key's record is not in a state that allows this transition.
    #[error("transfer for {key} is already {state}")]
    AlreadyActive {
        /// The key whose record refused the transition.
        key: String,
        /// State the record was in.
        state: TransferState,
    },
}

#[derive(Debug, Default)]
struct CoordinatorState {
    records: HashMap<String, TransferRecord>,
    order: Vec<String>,
    handles: HashMap<TransferHandle, String>,
    parked: HashMap<TransferHandle, Vec<TransportEvent>>,
}

impl CoordinatorState {
    fn snapshot(&self) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot::default();
        for record in self.records.values() {
            if record.kind != RecordKind::Resource {
                continue;
            }
            snapshot.selected += 1;
            match record.state {
                TransferState::Done => snapshot.done += 1,
                TransferState::Failed => snapshot.failed += 1,
                _ => snapshot.in_flight += 1,
            }
        }
        snapshot
    }

    fn has_active(&self) -> bool {
        self.records.values().any(|r| !r.state.is_terminal())
    }

    fn record_mut(&mut self, key: &str) -> Result<&mut TransferRecord, CoordinatorError> {
        self.records
            .get_mut(key)
            .ok_or_else(|| CoordinatorError::UnknownKey {
                key: key.to_string(),
            })
    }

    fn register_handle(&mut self, key: &str, handle: TransferHandle) {
        self.handles.insert(handle, key.to_string());
        if let Some(events) = self.parked.remove(&handle) {
            debug!(%handle, key, count = events.len(), "replaying parked events");
            for event in events {
                self.apply(&event);
            }
        }
    }

    /// Applies one transport event. Returns `true` if a record changed.
    fn apply(&mut self, event: &TransportEvent) -> bool {
        let Some(key) = self.handles.get(&event.handle).cloned() else {
            debug!(handle = %event.handle, "parking event for unregistered handle");
            self.parked.entry(event.handle).or_default().push(event.clone());
            return false;
        };
        let Some(record) = self.records.get_mut(&key) else {
            return false;
        };
        if record.external_handle != Some(event.handle) {
            debug!(handle = %event.handle, key = %key, "ignoring event for superseded handle");
            return false;
        }

        let from = record.state;
        match (event.state, from) {
            (TransportState::InProgress, TransferState::Starting) => {
                record.state = TransferState::InFlight;
            }
            (
                TransportState::Complete,
                TransferState::Starting | TransferState::InFlight,
            ) => {
                record.state = TransferState::Done;
                info!(key = %key, handle = %event.handle, "transfer complete");
            }
            (
                TransportState::Interrupted,
                TransferState::Starting | TransferState::InFlight,
            ) => {
                let detail = event
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_INTERRUPTION.to_string());
                warn!(key = %key, handle = %event.handle, detail = detail.as_str(), "transfer interrupted");
                record.fail(FailureKind::InterruptedTransfer, detail);
            }
            _ => {
                debug!(key = %key, state = %from, event = ?event.state, "ignoring stale event");
                return false;
            }
        }
        true
    }
}

/// Owns every [`TransferRecord`] and the handle registry.
///
/// Shared between workers behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct TransferCoordinator {
    state: Mutex<CoordinatorState>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    progress: watch::Sender<ProgressSnapshot>,
}

impl TransferCoordinator {
    /// Creates a coordinator and the sender transports report events on.
    ///
    /// The event queue closes once every clone of the sender is dropped.
    #[must_use]
    pub fn new() -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        let coordinator = Self {
            state: Mutex::new(CoordinatorState::default()),
            events: tokio::sync::Mutex::new(rx),
            progress,
        };
        (coordinator, tx)
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CoordinatorState) {
        self.progress.send_replace(state.snapshot());
    }

    /// Queues `keys` for transfer and returns the keys that were accepted.
    ///
    /// Keys with an active record are skipped. Keys with a terminal record
    /// start over as `Queued`. Duplicate keys within `keys` are accepted once.
    pub fn begin_batch(&self, keys: &[String]) -> Vec<String> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut accepted = Vec::with_capacity(keys.len());
        for key in keys {
            match state.records.get(key.as_str()) {
                Some(existing) if !existing.state.is_terminal() => {
                    debug!(key = key.as_str(), state = %existing.state, "already active, skipping");
                    continue;
                }
                Some(_) => {}
                None => state.order.push(key.clone()),
            }
            state
                .records
                .insert(key.clone(), TransferRecord::queued(key));
            accepted.push(key.clone());
        }
        self.publish(state);
        debug!(requested = keys.len(), accepted = accepted.len(), "batch queued");
        accepted
    }

    /// Records that the transport accepted `key` under `handle`.
    ///
    /// Events that arrived for `handle` before this call are applied now.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::UnknownKey`] if `key` was never queued and
    /// [`CoordinatorError::AlreadyActive`] if it is no longer `Queued`.
    pub fn mark_starting(&self, key: &str, handle: TransferHandle) -> Result<(), CoordinatorError> {
        let mut state = self.lock();
        let record = state.record_mut(key)?;
        if record.state != TransferState::Queued {
            return Err(CoordinatorError::AlreadyActive {
                key: key.to_string(),
                state: record.state,
            });
        }
        record.state = TransferState::Starting;
        record.external_handle = Some(handle);
        state.register_handle(key, handle);
        self.publish(&state);
        Ok(())
    }

    /// Records that `key` finished without going through the transport.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::UnknownKey`] if `key` was never queued and
    /// [`CoordinatorError::AlreadyActive`] if it is no longer `Queued`.
    pub fn mark_done(&self, key: &str) -> Result<(), CoordinatorError> {
        let mut state = self.lock();
        let record = state.record_mut(key)?;
        if record.state != TransferState::Queued {
            return Err(CoordinatorError::AlreadyActive {
                key: key.to_string(),
                state: record.state,
            });
        }
        record.state = TransferState::Done;
        self.publish(&state);
        Ok(())
    }

    /// Records that `key` failed before its transfer started.
    ///
    /// A record that is already terminal is left as it is.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::UnknownKey`] if `key` was never queued.
    pub fn mark_failed(
        &self,
        key: &str,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let mut state = self.lock();
        let record = state.record_mut(key)?;
        if record.state.is_terminal() {
            debug!(key, state = %record.state, "ignoring failure for settled record");
            return Ok(());
        }
        let reason = reason.into();
        warn!(key, kind = %kind, reason = reason.as_str(), "transfer failed");
        record.fail(kind, reason);
        self.publish(&state);
        Ok(())
    }

    /// Tracks a generated archive handed to the transport under `handle`.
    ///
    /// Archive records follow transport events like resources do but are
    /// left out of the progress counters.
    pub fn track_archive(&self, name: &str, handle: TransferHandle) {
        let mut state = self.lock();
        if !state.records.contains_key(name) {
            state.order.push(name.to_string());
        }
        let mut record = TransferRecord::queued(name);
        record.kind = RecordKind::Archive;
        record.state = TransferState::Starting;
        record.external_handle = Some(handle);
        state.records.insert(name.to_string(), record);
        state.register_handle(name, handle);
        self.publish(&state);
    }

    /// Applies one transport event. Returns `true` if a record changed.
    pub fn apply_event(&self, event: &TransportEvent) -> bool {
        let mut state = self.lock();
        let changed = state.apply(event);
        if changed {
            self.publish(&state);
        }
        changed
    }

    /// Applies every event already waiting on the inbound queue.
    ///
    /// Never blocks. Returns the number of events taken off the queue; if
    /// another task is currently draining, returns 0.
    pub fn drain_events(&self) -> usize {
        let Ok(mut rx) = self.events.try_lock() else {
            return 0;
        };
        let mut drained = 0;
        while let Ok(event) = rx.try_recv() {
            self.apply_event(&event);
            drained += 1;
        }
        drained
    }

    /// Applies events until no record is active or the queue closes.
    pub async fn run_until_settled(&self) {
        let mut rx = self.events.lock().await;
        loop {
            while let Ok(event) = rx.try_recv() {
                self.apply_event(&event);
            }
            if !self.lock().has_active() {
                break;
            }
            match rx.recv().await {
                Some(event) => {
                    self.apply_event(&event);
                }
                None => {
                    warn!("event queue closed with transfers still active");
                    break;
                }
            }
        }
        let snapshot = self.progress();
        info!(
            selected = snapshot.selected,
            done = snapshot.done,
            failed = snapshot.failed,
            "transfers settled"
        );
    }

    /// Returns a copy of the record for `key`.
    #[must_use]
    pub fn record(&self, key: &str) -> Option<TransferRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Current progress counters.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.borrow()
    }

    /// Subscribes to progress updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Failed resource records, in the order their keys were first queued.
    #[must_use]
    pub fn failures(&self) -> Vec<TransferRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|key| state.records.get(key))
            .filter(|r| r.kind == RecordKind::Resource && r.state == TransferState::Failed)
            .cloned()
            .collect()
    }
}
