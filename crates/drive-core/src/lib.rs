//! Collaborator contracts for the drive-mode engine: content store, settings
//! store, media backend and location sources.

use bytes::Bytes;
use uuid::Uuid;

pub use model::{BoundingBox, DriveModeSettings, GeoPoint, LocationFix, PlayableItem};

mod memory;
pub use memory::{InMemoryContentStore, MemorySettingsStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Msg(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("no playable audio source")]
    NoSource,
    #[error("media backend rejected playback: {0}")]
    Rejected(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Read side of the drivecard catalog.
///
/// The box is a coarse prefilter only: implementations may return items
/// outside it (a store that can only range-query latitude will), and callers
/// apply the exact radius check themselves.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    async fn query_by_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<PlayableItem>, StoreError>;
}

/// Per-user settings persistence. Last write wins.
pub trait SettingsStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<DriveModeSettings>, StoreError>;
    fn save(&self, user_id: &str, settings: &DriveModeSettings) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// In-memory audio; the backend owns any temporary reference it creates for it.
    Blob(Bytes),
    Url(String),
}

impl AudioSource {
    pub fn is_blob(&self) -> bool {
        matches!(self, AudioSource::Blob(_))
    }
}

/// Natural end-of-playback notifications, tagged with the session id passed to
/// [`MediaBackend::open`].
pub type EndedTx = tokio::sync::mpsc::UnboundedSender<Uuid>;
pub type EndedRx = tokio::sync::mpsc::UnboundedReceiver<Uuid>;

/// A live, opened media resource.
///
/// Dropping a handle must stop output and release everything it holds,
/// including temporary references created for blob sources.
#[async_trait::async_trait]
pub trait MediaHandle: Send {
    async fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn rewind(&mut self);
    fn set_volume(&mut self, volume: f32);
}

#[async_trait::async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open `source` for session `session`. When playback finishes on its own
    /// the handle sends `session` on `ended`.
    async fn open(
        &self,
        source: AudioSource,
        session: Uuid,
        ended: EndedTx,
    ) -> Result<Box<dyn MediaHandle>, MediaError>;
}

pub type LocationTx = tokio::sync::mpsc::UnboundedSender<LocationFix>;
pub type LocationRx = tokio::sync::mpsc::UnboundedReceiver<LocationFix>;

/// Trait for any live position feed
#[async_trait::async_trait]
pub trait LocationSource: Send + Sync {
    async fn run(&self, tx: LocationTx) -> Result<(), SourceError>;
}

pub fn channel() -> (LocationTx, LocationRx) {
    tokio::sync::mpsc::unbounded_channel()
}

pub fn ended_channel() -> (EndedTx, EndedRx) {
    tokio::sync::mpsc::unbounded_channel()
}
