use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use model::*;

pub const EARTH_RADIUS_MILES: f64 = 3959.0;
pub const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// At or below this speed (mph) the vehicle is treated as stopped or walking.
pub const STATIONARY_SPEED_MPH: f64 = 5.0;

pub const MIN_TRIGGER_DISTANCE: f64 = 0.05;
pub const MAX_TRIGGER_DISTANCE: f64 = 2.0;
const MIN_PREFETCH_HALF_EXTENT: f64 = 0.1;

/// Great-circle distance in miles (Haversine).
pub fn distance_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1.0 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();
    EARTH_RADIUS_MILES * c
}

/// Trigger radius in miles for the current speed.
pub fn trigger_distance(speed_mph: f64, settings: &DriveModeSettings) -> f64 {
    if !settings.use_predictive_trigger {
        return settings.trigger_distance;
    }
    if speed_mph <= STATIONARY_SPEED_MPH {
        return MIN_TRIGGER_DISTANCE;
    }
    let d = speed_mph * (settings.predictive_lead_time / 3600.0);
    d.clamp(MIN_TRIGGER_DISTANCE, MAX_TRIGGER_DISTANCE)
}

/// Coarse prefetch box around `center`. The half extent is twice the radius
/// (never below 0.1 mi), converted with a flat degrees-per-mile approximation.
pub fn bounding_box(center: &GeoPoint, radius_miles: f64) -> BoundingBox {
    let half = (radius_miles * 2.0).max(MIN_PREFETCH_HALF_EXTENT);
    let dlat = half / MILES_PER_DEGREE_LAT;
    // longitude degrees shrink towards the poles; floor cos so the box stays finite
    let cos_lat = center.latitude.to_radians().cos().abs().max(0.01);
    let dlon = (half / (MILES_PER_DEGREE_LAT * cos_lat)).min(180.0);

    BoundingBox {
        min_lat: (center.latitude - dlat).max(-90.0),
        max_lat: (center.latitude + dlat).min(90.0),
        min_lon: (center.longitude - dlon).max(-180.0),
        max_lon: (center.longitude + dlon).min(180.0),
    }
}

/// Exact filter over a prefetched superset: within `radius_miles`, not already
/// played, not in an excluded category. Returns the nearest survivor and its
/// distance; ties keep the earlier candidate.
pub fn nearest<I>(
    location: &GeoPoint,
    candidates: I,
    radius_miles: f64,
    exclude_ids: &HashSet<String>,
    exclude_categories: &HashSet<String>,
) -> Option<(PlayableItem, f64)>
where
    I: IntoIterator<Item = PlayableItem>,
{
    candidates
        .into_iter()
        .filter(|c| !exclude_ids.contains(&c.id) && !exclude_categories.contains(&c.category))
        .map(|c| {
            let d = distance_miles(location, &c.geo);
            (c, d)
        })
        .filter(|(_, d)| *d <= radius_miles)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Poll period per speed band.
#[derive(Clone, Debug, PartialEq)]
pub struct PollIntervals {
    /// above 35 mph
    pub highway: Duration,
    /// 15..=35 mph
    pub arterial: Duration,
    /// 5..15 mph
    pub slow: Duration,
    /// below 5 mph
    pub stationary: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            highway: Duration::from_secs(2),
            arterial: Duration::from_secs(3),
            slow: Duration::from_secs(5),
            stationary: Duration::from_secs(10),
        }
    }
}

impl PollIntervals {
    pub fn for_speed(&self, speed_mph: f64) -> Duration {
        if speed_mph > 35.0 {
            self.highway
        } else if speed_mph >= 15.0 {
            self.arterial
        } else if speed_mph >= STATIONARY_SPEED_MPH {
            self.slow
        } else {
            self.stationary
        }
    }
}

/// Bounded window of recent speed samples; the oldest sample is dropped first.
#[derive(Clone, Debug)]
pub struct SpeedWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, speed_mph: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(speed_mph);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / (self.samples.len() as f64)
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
