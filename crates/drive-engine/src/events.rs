use tokio::sync::broadcast;
use uuid::Uuid;

use crate::activation::DisableReason;
use crate::error::DriveError;

/// Everything observable about a drive session. Hosts subscribe through
/// [`DriveMode::subscribe`](crate::DriveMode::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum DriveEvent {
    Enabled { manual: bool },
    Disabled { reason: DisableReason },
    AutoDisableArmed { after_minutes: u64 },
    AutoDisableCancelled,
    Triggered { item_id: String, distance_miles: f64 },
    Queued { item_id: String, queue_len: usize },
    PlaybackStarted { session: Uuid, item_id: String, triggered_by_location: bool },
    PlaybackEnded { session: Uuid, item_id: String, played_secs: f64 },
    PlaybackStopped { session: Uuid, item_id: String },
    SettingsChanged,
    Warning(DriveError),
    Error(DriveError),
}

impl DriveEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, DriveEvent::Warning(_) | DriveEvent::Error(_))
    }
}

/// Fan-out of [`DriveEvent`]s. Sending never fails: with no subscribers the
/// event is dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DriveEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: DriveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.tx.subscribe()
    }
}
