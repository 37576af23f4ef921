use std::time::Duration;

use drive_core::{LocationRx, LocationTx};
use drive_engine::{DriveEvent, DriveMode};
use iox::RouteSample;
use model::LocationFix;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Feed every fix from a location source into the session until the source
/// side hangs up.
pub async fn pump(drive: DriveMode, mut rx: LocationRx) {
    while let Some(fix) = rx.recv().await {
        drive.on_location(fix);
    }
}

/// Send `route` in real time divided by `speedup`. Fix timestamps are the
/// route offsets applied to `start`.
pub async fn replay(route: &[RouteSample], speedup: f64, start: OffsetDateTime, tx: &LocationTx) {
    let speedup = if speedup.is_finite() && speedup > 0.0 { speedup } else { 1.0 };
    let mut prev_ms = route.first().map(|s| s.t_ms).unwrap_or(0);
    for s in route {
        let gap = s.t_ms.saturating_sub(prev_ms);
        if gap > 0 {
            tokio::time::sleep(Duration::from_secs_f64(gap as f64 / 1000.0 / speedup)).await;
        }
        prev_ms = s.t_ms;
        let fix = LocationFix {
            point: s.point(),
            speed_mph: s.speed_mph,
            timestamp: start + time::Duration::milliseconds(s.t_ms as i64),
        };
        if tx.send(fix).is_err() {
            return;
        }
    }
    info!(samples = route.len(), "route finished");
}

/// Log what the engine reports until the session is dropped.
pub async fn report(mut rx: broadcast::Receiver<DriveEvent>) {
    loop {
        match rx.recv().await {
            Ok(DriveEvent::Triggered { item_id, distance_miles }) => {
                info!(item = %item_id, distance_miles, "drivecard in range")
            }
            Ok(DriveEvent::Warning(e)) => warn!(error = %e, "drive mode warning"),
            Ok(DriveEvent::Error(e)) => error!(error = %e, "drive mode error"),
            Ok(other) => info!(event = ?other),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "event reporter lagging"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
