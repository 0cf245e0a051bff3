//! Progress UI (bar) fed from coordinator snapshots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use asset_bundler::coordinator::ProgressSnapshot;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_show_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Spawns the progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `show` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    show: bool,
    label: &'static str,
    snapshots: watch::Receiver<ProgressSnapshot>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !show {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar_inner(label, snapshots, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bar_inner(
    label: &'static str,
    snapshots: watch::Receiver<ProgressSnapshot>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let snapshot = *snapshots.borrow();
            bar.set_length(snapshot.selected as u64);
            bar.set_position((snapshot.done + snapshot.failed) as u64);
            bar.set_message(format!(
                "{label}: {} in flight, {} failed",
                snapshot.in_flight, snapshot.failed
            ));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        bar.finish_and_clear();
    })
}

/// Signals the progress task to stop and waits for it.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}
