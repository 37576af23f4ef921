use thiserror::Error;

/// Failures the engine recovers from and reports on the event stream.
///
/// Collaborator errors are flattened to strings so events stay cloneable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriveError {
    #[error("content store query failed: {0}")]
    Fetch(String),

    #[error("no playable audio for drivecard {0}")]
    NoAudioSource(String),

    #[error("playback failed to start for drivecard {item_id}: {reason}")]
    PlaybackStart { item_id: String, reason: String },

    #[error("failed to load settings for user {user_id}: {reason}")]
    SettingsLoad { user_id: String, reason: String },

    #[error("failed to persist settings for user {user_id}: {reason}")]
    SettingsPersist { user_id: String, reason: String },

    #[error("manual override is not allowed while drive mode was enabled automatically")]
    ManualOverrideNotAllowed,

    #[error("ignoring invalid location fix ({latitude}, {longitude})")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error("polling cycle aborted: {0}")]
    Cycle(String),
}

pub type Result<T> = std::result::Result<T, DriveError>;
