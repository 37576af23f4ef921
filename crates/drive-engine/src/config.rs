use proximity::{PollIntervals, STATIONARY_SPEED_MPH};

/// Engine tunables that are not per-user settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Below this speed (mph) the vehicle counts as stopped for auto-disable.
    pub stationary_speed_mph: f64,
    /// Cycles are skipped until the vehicle has moved at least this far (miles)
    /// since the last scan.
    pub min_movement_miles: f64,
    pub speed_window: usize,
    pub poll_intervals: PollIntervals,
    pub event_capacity: usize,
    pub default_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stationary_speed_mph: STATIONARY_SPEED_MPH,
            min_movement_miles: 0.01, // ~50 ft
            speed_window: 10,
            poll_intervals: PollIntervals::default(),
            event_capacity: 256,
            default_volume: 1.0,
        }
    }
}
