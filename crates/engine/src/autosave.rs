// Autosave scheduling: coalesces bursts of edits into a single
// background persistence call.
//
// Every edit signal (re)starts the debounce window; the save fires once
// when the window elapses with no further edits. The async loop mirrors
// the shape of a select-driven pipeline: edit channel, shutdown
// broadcast, poll-interval tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::sync::{SavePayload, SyncEngine};

/// Sent by the session for every successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditSignal;

/// Provides the freshest persistable state at the moment a save fires.
///
/// Captured at fire time, not at signal time: the payload must reflect
/// every edit made during the debounce window.
pub trait SnapshotSource: Send + Sync {
    fn capture(&self) -> SavePayload;
}

/// Single-note debouncer. `mark()` (re)starts the window; `take_ready()`
/// reports once when the window has elapsed.
pub struct SaveDebouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl SaveDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    /// Record an edit. Restarts the window; a pending fire is pushed out.
    pub fn mark(&mut self) {
        self.mark_at(Instant::now());
    }

    /// Like `mark` but with a specific timestamp (for testing).
    fn mark_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// True exactly once per elapsed window; clears the pending state.
    pub fn take_ready(&mut self) -> bool {
        self.take_ready_at(Instant::now())
    }

    /// Like `take_ready` but with a specific timestamp (for testing).
    fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the pending save becomes due, or None if nothing is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drop any pending save without firing it.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Tuning for the autosave loop.
#[derive(Debug, Clone)]
pub struct AutosaveOptions {
    /// Debounce window (see `AutosaveConfig::debounce_window`).
    pub window: Duration,
    /// How often the loop checks whether the window has elapsed.
    pub poll_interval: Duration,
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self { window: Duration::from_millis(1_500), poll_interval: Duration::from_millis(50) }
    }
}

/// Runs the autosave loop for one editing session.
///
/// Exits when `edit_rx` closes (session dropped) or `shutdown` fires.
/// A pending-but-unfired window is discarded on shutdown; the dismissal
/// path issues its own final save with the freshest state.
pub async fn run_autosave(
    mut edit_rx: mpsc::UnboundedReceiver<EditSignal>,
    source: Arc<dyn SnapshotSource>,
    sync: Arc<SyncEngine>,
    options: AutosaveOptions,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer = SaveDebouncer::new(options.window);

    info!("autosave loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("autosave loop shutting down");
                break;
            }

            maybe_signal = edit_rx.recv() => {
                match maybe_signal {
                    Some(EditSignal) => {
                        trace!("edit signal received");
                        debouncer.mark();
                    }
                    None => {
                        info!("edit channel closed, autosave exiting");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(options.poll_interval) => {
                // Check whether the debounce window has elapsed.
            }
        }

        if debouncer.take_ready() {
            debug!("debounce window elapsed, persisting");
            sync.save(source.capture());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::SaveDebouncer;

    // ── Single edit lifecycle ──────────────────────────────────────

    #[test]
    fn not_ready_before_window() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        debouncer.mark_at(now);
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(50)));
        assert!(debouncer.is_pending());
    }

    #[test]
    fn ready_after_window() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        debouncer.mark_at(now);
        assert!(debouncer.take_ready_at(now + Duration::from_millis(100)));
        assert!(!debouncer.is_pending());
    }

    // ── Coalescing ─────────────────────────────────────────────────

    #[test]
    fn rapid_edits_coalesce_and_reset_the_window() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        debouncer.mark_at(now);
        debouncer.mark_at(now + Duration::from_millis(80));

        // 100ms after the first mark: not ready, the window restarted.
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(100)));
        // 100ms after the second mark: fires exactly once.
        assert!(debouncer.take_ready_at(now + Duration::from_millis(180)));
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(300)));
    }

    #[test]
    fn spaced_edits_fire_once_each() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        debouncer.mark_at(now);
        assert!(debouncer.take_ready_at(now + Duration::from_millis(150)));

        debouncer.mark_at(now + Duration::from_millis(200));
        assert!(debouncer.take_ready_at(now + Duration::from_millis(350)));
    }

    // ── Cancel ─────────────────────────────────────────────────────

    #[test]
    fn cancel_discards_the_pending_save() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        debouncer.mark_at(now);
        debouncer.cancel();
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(500)));
    }

    #[test]
    fn deadline_tracks_latest_mark() {
        let mut debouncer = SaveDebouncer::new(Duration::from_millis(100));
        assert!(debouncer.deadline().is_none());

        let now = Instant::now();
        debouncer.mark_at(now);
        assert_eq!(debouncer.deadline(), Some(now + Duration::from_millis(100)));
    }
}
