use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Latitude/longitude ranges handed to the content store as a coarse prefilter.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.latitude)
            && (self.min_lon..=self.max_lon).contains(&p.longitude)
    }
}

/// Audio attached to a drivecard. A locally held blob takes precedence over
/// the remote URL when both are present.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct AudioRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AudioRef {
    pub fn remote(url: impl Into<String>) -> Self {
        Self { blob: None, url: Some(url.into()) }
    }

    pub fn local(blob: Vec<u8>) -> Self {
        Self { blob: Some(blob), url: None }
    }

    pub fn is_empty(&self) -> bool {
        self.blob.as_ref().map_or(true, |b| b.is_empty())
            && self.url.as_deref().map_or(true, str::is_empty)
    }
}

/// A drivecard: geo-tagged audio content authored elsewhere.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayableItem {
    pub id: String,
    pub title: String,
    pub geo: GeoPoint,
    pub category: String,
    #[serde(default)]
    pub audio: AudioRef,
    pub username: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveModeSettings {
    pub is_enabled: bool,
    /// mph
    pub auto_enable_speed: f64,
    /// miles
    pub trigger_distance: f64,
    /// minutes
    pub auto_disable_after_stop: u64,
    pub allow_manual_override: bool,
    pub excluded_categories: Vec<String>,
    pub use_predictive_trigger: bool,
    /// seconds
    pub predictive_lead_time: f64,
}

impl Default for DriveModeSettings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            auto_enable_speed: 15.0,
            trigger_distance: 0.1,
            auto_disable_after_stop: 5,
            allow_manual_override: true,
            excluded_categories: Vec::new(),
            use_predictive_trigger: false,
            predictive_lead_time: 30.0,
        }
    }
}

impl DriveModeSettings {
    /// Overwrite only the fields present in `patch`.
    pub fn apply(&mut self, patch: DriveModeSettingsPatch) {
        if let Some(v) = patch.is_enabled {
            self.is_enabled = v;
        }
        if let Some(v) = patch.auto_enable_speed {
            self.auto_enable_speed = v;
        }
        if let Some(v) = patch.trigger_distance {
            self.trigger_distance = v;
        }
        if let Some(v) = patch.auto_disable_after_stop {
            self.auto_disable_after_stop = v;
        }
        if let Some(v) = patch.allow_manual_override {
            self.allow_manual_override = v;
        }
        if let Some(v) = patch.excluded_categories {
            self.excluded_categories = v;
        }
        if let Some(v) = patch.use_predictive_trigger {
            self.use_predictive_trigger = v;
        }
        if let Some(v) = patch.predictive_lead_time {
            self.predictive_lead_time = v;
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveModeSettingsPatch {
    pub is_enabled: Option<bool>,
    pub auto_enable_speed: Option<f64>,
    pub trigger_distance: Option<f64>,
    pub auto_disable_after_stop: Option<u64>,
    pub allow_manual_override: Option<bool>,
    pub excluded_categories: Option<Vec<String>>,
    pub use_predictive_trigger: Option<bool>,
    pub predictive_lead_time: Option<f64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_triggered: u64,
    pub total_play_time_secs: f64,
    pub average_speed_mph: f64,
}

/// Snapshot of the live playback session, without the media handle.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSessionInfo {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub item: PlayableItem,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub triggered_by_location: bool,
    pub paused: bool,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub point: GeoPoint,
    pub speed_mph: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LocationFix {
    pub fn now(point: GeoPoint, speed_mph: f64) -> Self {
        Self { point, speed_mph, timestamp: OffsetDateTime::now_utc() }
    }
}
