//! Repeating-interval auto-sync timer.

use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{SyncEngine, SyncOutcome};

/// Handle to a running auto-sync timer thread.
///
/// The thread wakes every `interval` and triggers a sync pass. It holds
/// only a [`Weak`] engine reference: when the last strong handle to the
/// engine goes away the timer exits on its next wake instead of keeping a
/// destroyed store alive. Stopping (or dropping the handle) cancels the
/// timer and joins the thread.
pub(crate) struct AutoSync {
    shutdown: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSync {
    /// Spawns the timer thread.
    pub(crate) fn start(engine: Weak<SyncEngine>, interval: Duration) -> Self {
        let (shutdown, ticker) = mpsc::channel();
        let handle = thread::spawn(move || run_timer(engine, interval, ticker));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Cancels the timer and waits for the thread to exit.
    pub(crate) fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            // Teardown can run on the timer thread itself: a tick upgrades
            // the engine handle, and if it was the last one the engine (and
            // this struct) drop inside the tick. Joining our own thread
            // would error, so detach; the shutdown signal already sent makes
            // the loop exit on its next wake.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Timer loop: sleep-or-shutdown via `recv_timeout`, then sync.
fn run_timer(engine: Weak<SyncEngine>, interval: Duration, ticker: mpsc::Receiver<()>) {
    loop {
        match ticker.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let Some(engine) = engine.upgrade() else {
                    debug!("engine gone, auto-sync timer exiting");
                    break;
                };
                // Auto-sync runs without user interaction; failures are
                // logged, never surfaced.
                match engine.sync_with_cloud() {
                    Ok(SyncOutcome::Skipped) => {
                        debug!("auto-sync tick skipped, pass already in flight");
                    }
                    Ok(SyncOutcome::Completed(report)) => {
                        debug!(
                            pushed = report.pushed,
                            pulled = report.pulled,
                            push_failures = report.push_failures,
                            "auto-sync pass completed"
                        );
                    }
                    Err(e) => warn!(error = %e, "auto-sync pass failed"),
                }
            }
            // Explicit shutdown or the engine dropped the sender.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
