#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drive_core::*;
use drive_engine::{Collaborators, DriveEvent, DriveMode, EngineConfig};
use model::{AudioRef, DriveModeSettings};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const HOME: GeoPoint = GeoPoint { latitude: 40.7128, longitude: -74.0060 };

pub fn card(id: &str, lat: f64, lon: f64) -> PlayableItem {
    card_in(id, lat, lon, "history")
}

pub fn card_in(id: &str, lat: f64, lon: f64, category: &str) -> PlayableItem {
    PlayableItem {
        id: id.into(),
        title: format!("card {id}"),
        geo: GeoPoint::new(lat, lon),
        category: category.into(),
        audio: AudioRef::remote(format!("https://cdn.example/{id}.mp3")),
        username: "tester".into(),
        user_id: "author".into(),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

/// `miles` due north of `from`.
pub fn north_of(from: GeoPoint, miles: f64) -> GeoPoint {
    GeoPoint::new(from.latitude + miles / proximity::MILES_PER_DEGREE_LAT, from.longitude)
}

pub fn fix(point: GeoPoint, speed_mph: f64) -> LocationFix {
    LocationFix::now(point, speed_mph)
}

/// Let spawned tasks run without moving the paused clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn drain(rx: &mut broadcast::Receiver<DriveEvent>) -> Vec<DriveEvent> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
        out.push(e);
    }
    out
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MediaLog {
    pub opened: Vec<(Uuid, AudioSource)>,
    pub released: Vec<Uuid>,
    pub paused: Vec<Uuid>,
    pub resumed: Vec<Uuid>,
    pub volumes: Vec<(Uuid, f32)>,
    ended: HashMap<Uuid, EndedTx>,
}

#[derive(Default)]
pub struct FakeMedia {
    pub log: Arc<Mutex<MediaLog>>,
    pub fail_open: AtomicBool,
    pub fail_play: AtomicBool,
}

impl FakeMedia {
    /// Simulate the track reaching its end.
    pub fn finish(&self, session: Uuid) {
        let tx = self.log.lock().ended.get(&session).cloned();
        if let Some(tx) = tx {
            let _ = tx.send(session);
        }
    }

    /// Handles opened and not yet released.
    pub fn live(&self) -> usize {
        let log = self.log.lock();
        log.opened.len() - log.released.len()
    }

    pub fn opened(&self) -> usize {
        self.log.lock().opened.len()
    }

    pub fn released(&self) -> Vec<Uuid> {
        self.log.lock().released.clone()
    }
}

struct FakeHandle {
    session: Uuid,
    fail_play: bool,
    log: Arc<Mutex<MediaLog>>,
}

#[async_trait::async_trait]
impl MediaHandle for FakeHandle {
    async fn play(&mut self) -> Result<(), MediaError> {
        if self.fail_play {
            return Err(MediaError::Rejected("autoplay blocked".into()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.log.lock().paused.push(self.session);
    }

    fn resume(&mut self) {
        self.log.lock().resumed.push(self.session);
    }

    fn rewind(&mut self) {}

    fn set_volume(&mut self, volume: f32) {
        self.log.lock().volumes.push((self.session, volume));
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        // the ended sender is kept so tests can deliver late notifications
        self.log.lock().released.push(self.session);
    }
}

#[async_trait::async_trait]
impl MediaBackend for FakeMedia {
    async fn open(
        &self,
        source: AudioSource,
        session: Uuid,
        ended: EndedTx,
    ) -> Result<Box<dyn MediaHandle>, MediaError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(MediaError::Rejected("decoder unavailable".into()));
        }
        let mut log = self.log.lock();
        log.opened.push((session, source));
        log.ended.insert(session, ended);
        Ok(Box::new(FakeHandle {
            session,
            fail_play: self.fail_play.load(Ordering::SeqCst),
            log: Arc::clone(&self.log),
        }))
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// In-memory catalog that counts queries and can be told to fail.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryContentStore,
    pub queries: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingStore {
    pub fn with(items: Vec<PlayableItem>) -> Self {
        Self { inner: InMemoryContentStore::new(items), ..Default::default() }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentStore for CountingStore {
    async fn query_by_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<PlayableItem>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("firestore timeout".into()));
        }
        self.inner.query_by_bounding_box(bbox).await
    }
}

pub struct BrokenSettingsStore;

impl SettingsStore for BrokenSettingsStore {
    fn load(&self, _user_id: &str) -> Result<Option<DriveModeSettings>, StoreError> {
        Err(StoreError::Msg("quota exceeded".into()))
    }

    fn save(&self, _user_id: &str, _settings: &DriveModeSettings) -> Result<(), StoreError> {
        Err(StoreError::Msg("quota exceeded".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub drive: DriveMode,
    pub store: Arc<CountingStore>,
    pub settings: Arc<MemorySettingsStore>,
    pub media: Arc<FakeMedia>,
    pub events: broadcast::Receiver<DriveEvent>,
}

impl Harness {
    pub fn new(items: Vec<PlayableItem>) -> Self {
        Self::with_settings(items, DriveModeSettings::default())
    }

    pub fn with_settings(items: Vec<PlayableItem>, settings: DriveModeSettings) -> Self {
        let store = Arc::new(CountingStore::with(items));
        let settings_store = Arc::new(MemorySettingsStore::new());
        settings_store.save("driver", &settings).unwrap();
        let media = Arc::new(FakeMedia::default());
        let drive = DriveMode::new(
            "driver",
            Collaborators {
                content: store.clone(),
                settings: settings_store.clone(),
                media: media.clone(),
            },
            EngineConfig::default(),
        );
        let events = drive.subscribe();
        Self { drive, store, settings: settings_store, media, events }
    }

    pub fn events(&mut self) -> Vec<DriveEvent> {
        drain(&mut self.events)
    }

    pub async fn current_id(&self) -> Option<String> {
        self.drive.current_session().await.map(|s| s.item.id)
    }
}
