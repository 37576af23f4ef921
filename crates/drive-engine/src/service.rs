use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use drive_core::{ContentStore, MediaBackend, SettingsStore};
use model::{
    DriveModeSettings, DriveModeSettingsPatch, GeoPoint, LocationFix, PlaybackSessionInfo,
    Statistics,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activation::{Activation, ActivationState, DisableReason, SpeedAction};
use crate::config::EngineConfig;
use crate::error::{DriveError, Result};
use crate::events::{DriveEvent, EventBus};
use crate::playback::PlaybackManager;
use crate::poller::{CycleOutcome, Poller};
use crate::scanner::ProximityScanner;

/// External services the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub media: Arc<dyn MediaBackend>,
}

/// Drive-mode session for one user. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct DriveMode {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    user_id: String,
    config: EngineConfig,
    settings_store: Arc<dyn SettingsStore>,
    scanner: ProximityScanner,
    playback: Arc<PlaybackManager>,
    pub(crate) events: EventBus,
    state: Mutex<SessionState>,
    // serializes disable so every caller returns only after playback is stopped
    lifecycle: tokio::sync::Mutex<()>,
}

struct SessionState {
    settings: DriveModeSettings,
    activation: Activation,
    played: HashSet<String>,
    location: Option<LocationFix>,
    last_scan_point: Option<GeoPoint>,
    poller: Option<Poller>,
    auto_disable: Option<JoinHandle<()>>,
}

impl SessionState {
    /// Latest speed sample, whether it came with a fix or on its own.
    fn current_speed(&self) -> f64 {
        self.activation
            .speeds()
            .latest()
            .or(self.location.map(|f| f.speed_mph))
            .unwrap_or(0.0)
    }
}

impl DriveMode {
    /// Load (or create) the user's settings and build the session, initially
    /// disabled. Must be called from within a Tokio runtime.
    pub fn new(user_id: impl Into<String>, deps: Collaborators, config: EngineConfig) -> Self {
        let user_id = user_id.into();
        let events = EventBus::new(config.event_capacity);
        let settings = load_settings(&user_id, deps.settings.as_ref(), &events);
        let playback = PlaybackManager::new(deps.media, events.clone(), config.default_volume);

        let state = SessionState {
            settings,
            activation: Activation::new(config.speed_window, config.stationary_speed_mph),
            played: HashSet::new(),
            location: None,
            last_scan_point: None,
            poller: None,
            auto_disable: None,
        };

        info!(user = %user_id, "drive-mode session created");
        Self {
            inner: Arc::new(Inner {
                user_id,
                scanner: ProximityScanner::new(deps.content, events.clone()),
                settings_store: deps.settings,
                config,
                playback,
                events,
                state: Mutex::new(state),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.inner.events.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn state(&self) -> ActivationState {
        self.inner.state.lock().activation.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    pub fn settings(&self) -> DriveModeSettings {
        self.inner.state.lock().settings.clone()
    }

    pub fn location(&self) -> Option<LocationFix> {
        self.inner.state.lock().location
    }

    pub fn played_ids(&self) -> HashSet<String> {
        self.inner.state.lock().played.clone()
    }

    pub fn auto_disable_pending(&self) -> bool {
        self.inner.state.lock().activation.pending_auto_disable().is_some()
    }

    pub fn playback(&self) -> &Arc<PlaybackManager> {
        &self.inner.playback
    }

    pub async fn current_session(&self) -> Option<PlaybackSessionInfo> {
        self.inner.playback.current().await
    }

    pub fn statistics(&self) -> Statistics {
        let average_speed_mph = self.inner.state.lock().activation.speeds().average();
        let p = self.inner.playback.stats();
        Statistics {
            total_triggered: p.total_triggered,
            total_play_time_secs: p.total_play_time_secs,
            average_speed_mph,
        }
    }

    pub fn enable(&self, manual: bool) {
        let mut st = self.inner.state.lock();
        self.inner.enable_locked(&mut st, manual);
    }

    /// Stop polling and playback, forget what has been played. Returns once
    /// nothing from the enabled period can still start audio.
    pub async fn disable(&self) {
        self.inner.disable(DisableReason::User).await;
    }

    /// The user-facing switch. Refused while auto-enabled if the settings do
    /// not allow a manual override. Returns whether drive mode is now on.
    pub async fn toggle_by_user(&self) -> Result<bool> {
        let (state, allow_override) = {
            let st = self.inner.state.lock();
            (st.activation.state(), st.settings.allow_manual_override)
        };
        match state {
            ActivationState::EnabledAuto if !allow_override => Err(DriveError::ManualOverrideNotAllowed),
            ActivationState::Disabled => {
                self.enable(true);
                Ok(true)
            }
            _ => {
                self.inner.disable(DisableReason::User).await;
                Ok(false)
            }
        }
    }

    /// Feed a position/speed sample from the location provider.
    pub fn on_location(&self, fix: LocationFix) {
        if !fix.point.is_valid() || !fix.speed_mph.is_finite() {
            let e = DriveError::InvalidLocation {
                latitude: fix.point.latitude,
                longitude: fix.point.longitude,
            };
            warn!(error = %e, "dropping location fix");
            self.inner.events.emit(DriveEvent::Warning(e));
            return;
        }
        self.inner.state.lock().location = Some(fix);
        self.on_speed_update(fix.speed_mph.max(0.0));
    }

    pub fn on_speed_update(&self, speed_mph: f64) {
        let inner = &self.inner;
        let mut st = inner.state.lock();
        let action = {
            let SessionState { activation, settings, .. } = &mut *st;
            activation.on_speed(speed_mph, settings)
        };

        match action {
            SpeedAction::None => {}
            SpeedAction::AutoEnable => {
                info!(speed_mph, "speed above auto-enable threshold");
                inner.enable_locked(&mut st, false);
            }
            SpeedAction::ArmAutoDisable => {
                let generation = st.activation.arm_auto_disable();
                let minutes = st.settings.auto_disable_after_stop;
                let delay = Duration::from_secs(minutes.saturating_mul(60));
                let weak = Arc::downgrade(&self.inner);
                st.auto_disable = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_auto_disable(generation).await;
                    }
                }));
                debug!(minutes, generation, "auto-disable armed");
                inner.events.emit(DriveEvent::AutoDisableArmed { after_minutes: minutes });
            }
            SpeedAction::CancelAutoDisable => {
                st.activation.cancel_auto_disable();
                if let Some(t) = st.auto_disable.take() {
                    t.abort();
                }
                debug!(speed_mph, "auto-disable cancelled");
                inner.events.emit(DriveEvent::AutoDisableCancelled);
            }
        }
    }

    /// Merge `patch` into the settings and persist the whole object. A failed
    /// save is reported as a warning; the in-memory settings still apply.
    pub fn update_settings(&self, patch: DriveModeSettingsPatch) -> DriveModeSettings {
        let settings = {
            let mut st = self.inner.state.lock();
            st.settings.apply(patch);
            st.settings.clone()
        };
        if let Err(e) = self.inner.settings_store.save(&self.inner.user_id, &settings) {
            let e = DriveError::SettingsPersist {
                user_id: self.inner.user_id.clone(),
                reason: e.to_string(),
            };
            warn!(error = %e, "settings kept in memory only");
            self.inner.events.emit(DriveEvent::Warning(e));
        }
        self.inner.events.emit(DriveEvent::SettingsChanged);
        settings
    }

    /// Run one scan cycle immediately, outside the poll schedule. Holds the
    /// lifecycle lock so a concurrent `disable` returns only after this cycle
    /// has finished (and then stops whatever it started).
    pub async fn poll_now(&self) -> CycleOutcome {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.run_cycle().await
    }

    pub async fn pause(&self) {
        self.inner.playback.pause().await;
    }

    pub async fn resume(&self) {
        self.inner.playback.resume().await;
    }

    pub async fn stop_playback(&self) {
        self.inner.playback.stop().await;
    }

    pub async fn skip_to_next(&self) {
        self.inner.playback.skip_to_next().await;
    }

    pub async fn set_volume(&self, volume: f32) {
        self.inner.playback.set_volume(volume).await;
    }

    /// Disable and stop background tasks. The session stays usable; a later
    /// `enable` starts polling again.
    pub async fn shutdown(&self) {
        self.inner.disable(DisableReason::Shutdown).await;
        info!(user = %self.inner.user_id, "drive-mode session shut down");
    }
}

impl Inner {
    fn enable_locked(self: &Arc<Self>, st: &mut SessionState, manual: bool) {
        let was = st.activation.state();
        if st.activation.enable(manual).is_some() {
            if let Some(t) = st.auto_disable.take() {
                t.abort();
            }
        }
        if st.poller.is_none() {
            st.poller = Some(Poller::spawn(Arc::downgrade(self)));
        }
        if was != st.activation.state() {
            info!(manual, from = ?was, "drive mode enabled");
            self.events.emit(DriveEvent::Enabled { manual });
        }
    }

    async fn disable(&self, reason: DisableReason) {
        let _guard = self.lifecycle.lock().await;

        let (poller, timer) = {
            let mut st = self.state.lock();
            if !st.activation.state().is_enabled() {
                return;
            }
            st.activation.disable();
            st.played.clear();
            st.last_scan_point = None;
            (st.poller.take(), st.auto_disable.take())
        };

        if let Some(t) = timer {
            t.abort();
        }
        if let Some(p) = poller {
            p.stop().await;
        }
        self.playback.reset().await;

        info!(?reason, "drive mode disabled");
        self.events.emit(DriveEvent::Disabled { reason });
    }

    async fn fire_auto_disable(&self, generation: u64) {
        {
            let mut st = self.state.lock();
            if !st.activation.claim_auto_disable(generation) {
                return;
            }
            // this task is the timer; detach instead of aborting it
            st.auto_disable.take();
        }
        info!(generation, "vehicle stopped long enough; auto-disabling");
        self.disable(DisableReason::AutoStopped).await;
    }

    pub(crate) fn poll_delay(&self) -> Duration {
        let speed = self.state.lock().current_speed();
        self.config.poll_intervals.for_speed(speed)
    }

    pub(crate) async fn run_cycle(&self) -> CycleOutcome {
        let (point, radius, played, excluded) = {
            let st = self.state.lock();
            if !st.activation.state().is_enabled() {
                return CycleOutcome::NotEnabled;
            }
            let Some(fix) = st.location else {
                return CycleOutcome::NoLocation;
            };
            if let Some(last) = st.last_scan_point {
                if proximity::distance_miles(&last, &fix.point) < self.config.min_movement_miles {
                    return CycleOutcome::Stationary;
                }
            }
            let radius = proximity::trigger_distance(st.current_speed(), &st.settings);
            let excluded: HashSet<String> = st.settings.excluded_categories.iter().cloned().collect();
            (fix.point, radius, st.played.clone(), excluded)
        };

        let found = match self.scanner.try_find_nearest(&point, radius, &played, &excluded).await {
            Ok(found) => found,
            Err(e) => {
                // leave last_scan_point alone so the next tick retries here
                self.scanner.report(&e);
                return CycleOutcome::FetchFailed;
            }
        };

        let candidate = {
            let mut st = self.state.lock();
            if !st.activation.state().is_enabled() {
                return CycleOutcome::NotEnabled;
            }
            st.last_scan_point = Some(point);
            let Some(c) = found else {
                return CycleOutcome::NothingNearby;
            };
            if !st.played.insert(c.item.id.clone()) {
                return CycleOutcome::AlreadyPlayed;
            }
            c
        };

        let item_id = candidate.item.id.clone();
        let distance_miles = candidate.distance_miles;
        info!(item = %item_id, distance_miles, radius, "drivecard in range");
        self.events.emit(DriveEvent::Triggered { item_id: item_id.clone(), distance_miles });
        self.playback.enqueue(candidate.item, true).await;

        CycleOutcome::Triggered { item_id, distance_miles }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        if let Some(p) = st.poller.take() {
            p.abort();
        }
        if let Some(t) = st.auto_disable.take() {
            t.abort();
        }
        self.playback.shutdown_listener();
    }
}

fn load_settings(user_id: &str, store: &dyn SettingsStore, events: &EventBus) -> DriveModeSettings {
    match store.load(user_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            let s = DriveModeSettings::default();
            if let Err(e) = store.save(user_id, &s) {
                let e = DriveError::SettingsPersist { user_id: user_id.into(), reason: e.to_string() };
                warn!(error = %e, "could not persist default settings");
                events.emit(DriveEvent::Warning(e));
            }
            s
        }
        Err(e) => {
            let e = DriveError::SettingsLoad { user_id: user_id.into(), reason: e.to_string() };
            warn!(error = %e, "falling back to default settings");
            events.emit(DriveEvent::Warning(e));
            DriveModeSettings::default()
        }
    }
}
