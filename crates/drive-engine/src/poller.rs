use std::panic::AssertUnwindSafe;
use std::sync::Weak;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::DriveError;
use crate::events::DriveEvent;
use crate::service::Inner;

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NotEnabled,
    NoLocation,
    /// Moved less than the minimum distance since the last scan.
    Stationary,
    FetchFailed,
    NothingNearby,
    /// Found, but another cycle claimed it first.
    AlreadyPlayed,
    Triggered { item_id: String, distance_miles: f64 },
}

/// The running poll task. Each sleep is scheduled only after the previous
/// cycle has finished, so scans never overlap.
pub(crate) struct Poller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Poller {
    pub(crate) fn spawn(inner: Weak<Inner>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(inner, cancel.clone()));
        Self { cancel, task }
    }

    /// Cancel and wait until the task is gone; after this returns no cycle of
    /// this poller can touch playback.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
        let _ = self.task.await;
    }

    pub(crate) fn abort(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

async fn run(inner: Weak<Inner>, cancel: CancellationToken) {
    info!("drive-mode polling started");
    loop {
        let Some(delay) = inner.upgrade().map(|i| i.poll_delay()) else { break };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(i) = inner.upgrade() else { break };
        match AssertUnwindSafe(i.run_cycle()).catch_unwind().await {
            Ok(outcome) => debug!(?outcome, "poll cycle"),
            Err(_) => {
                error!("poll cycle panicked; continuing with next tick");
                i.events.emit(DriveEvent::Error(DriveError::Cycle("cycle panicked".into())));
            }
        }
    }
    info!("drive-mode polling stopped");
}
