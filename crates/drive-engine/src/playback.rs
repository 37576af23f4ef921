//! Playback session manager.
//!
//! Owns the single "current session" slot and the FIFO of drivecards waiting
//! behind it. Every mutation of the slot goes through one async lock, so at
//! most one media handle is live at any time.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use drive_core::{AudioSource, EndedRx, EndedTx, MediaBackend, MediaHandle};
use model::{AudioRef, PlayableItem, PlaybackSessionInfo};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DriveError;
use crate::events::{DriveEvent, EventBus};

struct ActiveSession {
    info: PlaybackSessionInfo,
    handle: Box<dyn MediaHandle>,
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl ActiveSession {
    fn played(&self, now: Instant) -> Duration {
        let paused = self.paused_total + self.paused_at.map(|p| now - p).unwrap_or_default();
        (now - self.started).saturating_sub(paused)
    }
}

#[derive(Default)]
struct Slot {
    current: Option<ActiveSession>,
    queue: VecDeque<PlayableItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    pub total_triggered: u64,
    pub total_play_time_secs: f64,
}

pub struct PlaybackManager {
    backend: Arc<dyn MediaBackend>,
    events: EventBus,
    ended_tx: EndedTx,
    slot: tokio::sync::Mutex<Slot>,
    stats: Mutex<PlaybackStats>,
    volume: Mutex<f32>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Pick the playable source: the local blob wins over the remote URL.
pub fn resolve_source(audio: &AudioRef) -> Option<AudioSource> {
    if let Some(blob) = audio.blob.as_ref().filter(|b| !b.is_empty()) {
        return Some(AudioSource::Blob(Bytes::from(blob.clone())));
    }
    audio
        .url
        .as_ref()
        .filter(|u| !u.is_empty())
        .map(|u| AudioSource::Url(u.clone()))
}

impl PlaybackManager {
    /// Must be called from within a Tokio runtime: spawns the end-of-playback
    /// listener.
    pub fn new(backend: Arc<dyn MediaBackend>, events: EventBus, volume: f32) -> Arc<Self> {
        let (ended_tx, ended_rx) = drive_core::ended_channel();
        let manager = Arc::new(Self {
            backend,
            events,
            ended_tx,
            slot: tokio::sync::Mutex::new(Slot::default()),
            stats: Mutex::new(PlaybackStats::default()),
            volume: Mutex::new(volume.clamp(0.0, 1.0)),
            listener: Mutex::new(None),
        });
        let task = tokio::spawn(listen_for_ended(Arc::downgrade(&manager), ended_rx));
        *manager.listener.lock() = Some(task);
        manager
    }

    /// Start `item` now, replacing any active session.
    pub async fn play(&self, item: PlayableItem, triggered_by_location: bool) -> bool {
        let mut slot = self.slot.lock().await;
        self.play_locked(&mut slot, item, triggered_by_location).await
    }

    pub async fn pause(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(s) = slot.current.as_mut() {
            if s.paused_at.is_none() {
                s.handle.pause();
                s.paused_at = Some(Instant::now());
                s.info.paused = true;
                debug!(item = %s.info.item.id, "playback paused");
            }
        }
    }

    pub async fn resume(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(s) = slot.current.as_mut() {
            if let Some(at) = s.paused_at.take() {
                s.paused_total += Instant::now() - at;
                s.handle.resume();
                s.info.paused = false;
                debug!(item = %s.info.item.id, "playback resumed");
            }
        }
    }

    /// Stop and release the current session. No-op when idle.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot);
    }

    /// Play the next queued drivecard, or stop when the queue is empty.
    pub async fn skip_to_next(&self) {
        let mut slot = self.slot.lock().await;
        self.advance_locked(&mut slot).await;
    }

    /// Queue behind the active session, or play right away when idle.
    pub async fn enqueue(&self, item: PlayableItem, triggered_by_location: bool) {
        let mut slot = self.slot.lock().await;
        if slot.current.is_some() {
            let item_id = item.id.clone();
            slot.queue.push_back(item);
            let queue_len = slot.queue.len();
            debug!(item = %item_id, queue_len, "queued behind active session");
            self.events.emit(DriveEvent::Queued { item_id, queue_len });
        } else {
            self.play_locked(&mut slot, item, triggered_by_location).await;
        }
    }

    /// Stop playback and drop everything queued.
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        slot.queue.clear();
        self.stop_locked(&mut slot);
    }

    pub async fn clear_queue(&self) {
        self.slot.lock().await.queue.clear();
    }

    pub async fn set_volume(&self, volume: f32) {
        let v = volume.clamp(0.0, 1.0);
        *self.volume.lock() = v;
        if let Some(s) = self.slot.lock().await.current.as_mut() {
            s.handle.set_volume(v);
        }
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub async fn current(&self) -> Option<PlaybackSessionInfo> {
        self.slot.lock().await.current.as_ref().map(|s| s.info.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.current.is_some()
    }

    pub async fn queue_len(&self) -> usize {
        self.slot.lock().await.queue.len()
    }

    pub async fn queued_ids(&self) -> Vec<String> {
        self.slot.lock().await.queue.iter().map(|i| i.id.clone()).collect()
    }

    pub fn stats(&self) -> PlaybackStats {
        *self.stats.lock()
    }

    pub fn shutdown_listener(&self) {
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
    }

    async fn on_ended(&self, session: Uuid) {
        let mut slot = self.slot.lock().await;
        let is_current = slot.current.as_ref().map(|s| s.info.id) == Some(session);
        if !is_current {
            debug!(%session, "ignoring end of superseded session");
            return;
        }
        if let Some(s) = slot.current.take() {
            let played_secs = s.played(Instant::now()).as_secs_f64();
            self.stats.lock().total_play_time_secs += played_secs;
            info!(item = %s.info.item.id, played_secs, "playback finished");
            self.events.emit(DriveEvent::PlaybackEnded {
                session,
                item_id: s.info.item.id.clone(),
                played_secs,
            });
        }
        self.advance_locked(&mut slot).await;
    }

    async fn advance_locked(&self, slot: &mut Slot) {
        while let Some(next) = slot.queue.pop_front() {
            if self.play_locked(slot, next, false).await {
                return;
            }
        }
        self.stop_locked(slot);
    }

    async fn play_locked(&self, slot: &mut Slot, item: PlayableItem, triggered_by_location: bool) -> bool {
        self.stop_locked(slot);

        let Some(source) = resolve_source(&item.audio) else {
            warn!(item = %item.id, "drivecard has no playable audio");
            self.events.emit(DriveEvent::Error(DriveError::NoAudioSource(item.id.clone())));
            return false;
        };

        let session = Uuid::new_v4();
        let blob = source.is_blob();
        let mut handle = match self.backend.open(source, session, self.ended_tx.clone()).await {
            Ok(h) => h,
            Err(e) => {
                self.start_failed(&item, e.to_string());
                return false;
            }
        };
        handle.set_volume(self.volume());
        if let Err(e) = handle.play().await {
            // dropping the handle releases it
            self.start_failed(&item, e.to_string());
            return false;
        }

        self.stats.lock().total_triggered += 1;
        info!(item = %item.id, title = %item.title, %session, blob, triggered_by_location, "playback started");
        self.events.emit(DriveEvent::PlaybackStarted {
            session,
            item_id: item.id.clone(),
            triggered_by_location,
        });
        slot.current = Some(ActiveSession {
            info: PlaybackSessionInfo {
                id: session,
                item,
                start_time: OffsetDateTime::now_utc(),
                triggered_by_location,
                paused: false,
            },
            handle,
            started: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        });
        true
    }

    fn stop_locked(&self, slot: &mut Slot) {
        let Some(mut s) = slot.current.take() else {
            return;
        };
        s.handle.pause();
        s.handle.rewind();
        let ActiveSession { info, handle, .. } = s;
        drop(handle);
        info!(item = %info.item.id, session = %info.id, "playback stopped");
        self.events.emit(DriveEvent::PlaybackStopped { session: info.id, item_id: info.item.id });
    }

    fn start_failed(&self, item: &PlayableItem, reason: String) {
        warn!(item = %item.id, %reason, "playback failed to start");
        self.events.emit(DriveEvent::Error(DriveError::PlaybackStart {
            item_id: item.id.clone(),
            reason,
        }));
    }
}

async fn listen_for_ended(manager: Weak<PlaybackManager>, mut rx: EndedRx) {
    while let Some(session) = rx.recv().await {
        let Some(m) = manager.upgrade() else { break };
        m.on_ended(session).await;
    }
}
