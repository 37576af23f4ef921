use model::DriveModeSettings;
use proximity::SpeedWindow;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationState {
    Disabled,
    EnabledManual,
    EnabledAuto,
}

impl ActivationState {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ActivationState::Disabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisableReason {
    User,
    /// Speed stayed below the stationary threshold for `auto_disable_after_stop`.
    AutoStopped,
    Shutdown,
}

/// What the caller has to do after a speed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedAction {
    None,
    AutoEnable,
    ArmAutoDisable,
    CancelAutoDisable,
}

/// Enabled/disabled bookkeeping plus the speed history. Timers themselves live
/// with the caller; this only tracks which timer generation is pending so a
/// late firing can be recognised and ignored.
#[derive(Debug)]
pub struct Activation {
    state: ActivationState,
    speeds: SpeedWindow,
    stationary_speed: f64,
    pending_disable: Option<u64>,
    next_generation: u64,
}

impl Activation {
    pub fn new(speed_window: usize, stationary_speed: f64) -> Self {
        Self {
            state: ActivationState::Disabled,
            speeds: SpeedWindow::new(speed_window),
            stationary_speed,
            pending_disable: None,
            next_generation: 0,
        }
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub fn speeds(&self) -> &SpeedWindow {
        &self.speeds
    }

    pub fn pending_auto_disable(&self) -> Option<u64> {
        self.pending_disable
    }

    /// Returns the generation of the auto-disable timer this cancels, if any.
    pub fn enable(&mut self, manual: bool) -> Option<u64> {
        self.state = if manual { ActivationState::EnabledManual } else { ActivationState::EnabledAuto };
        self.pending_disable.take()
    }

    /// Returns the generation of the auto-disable timer this cancels, if any.
    pub fn disable(&mut self) -> Option<u64> {
        self.state = ActivationState::Disabled;
        self.pending_disable.take()
    }

    pub fn on_speed(&mut self, speed_mph: f64, settings: &DriveModeSettings) -> SpeedAction {
        self.speeds.push(speed_mph);

        if !self.state.is_enabled() {
            if settings.is_enabled && speed_mph >= settings.auto_enable_speed {
                return SpeedAction::AutoEnable;
            }
            return SpeedAction::None;
        }

        match (speed_mph < self.stationary_speed, self.pending_disable) {
            (true, None) => SpeedAction::ArmAutoDisable,
            (false, Some(_)) => SpeedAction::CancelAutoDisable,
            _ => SpeedAction::None,
        }
    }

    pub fn arm_auto_disable(&mut self) -> u64 {
        self.next_generation += 1;
        self.pending_disable = Some(self.next_generation);
        self.next_generation
    }

    pub fn cancel_auto_disable(&mut self) -> Option<u64> {
        self.pending_disable.take()
    }

    /// Called when a timer fires. True only if `generation` is still the
    /// pending one and the state is enabled; the pending slot is consumed.
    pub fn claim_auto_disable(&mut self, generation: u64) -> bool {
        if self.pending_disable == Some(generation) && self.state.is_enabled() {
            self.pending_disable = None;
            return true;
        }
        false
    }
}
