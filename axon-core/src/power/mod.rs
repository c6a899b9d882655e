//! Motor power sequencing
//!
//! Each motor runs a small state machine that decides when to keep the
//! winding energized and when to let it time out after motion stops.
//! [`StepperDriver`](crate::traits::StepperDriver) implementations embed
//! a [`MotorPower`] and drive it from `enable()`, `motion_stopped()` and
//! `periodic_check()`.

use crate::config::PowerMode;

/// Per-motor power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// De-energized
    #[default]
    Off,
    /// Energized and stepping (or about to step)
    Running,
    /// Motion stopped; timeout should be armed on the next check
    TimeoutStart,
    /// Timeout armed and counting down
    TimeoutCountdown,
    /// Timed out and de-energized until the next segment
    Idle,
}

/// What the embedding should do to the winding after a state update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerAction {
    /// Leave the winding as it is
    None,
    /// Energize the winding
    PowerUp,
    /// De-energize the winding
    PowerDown,
}

/// Idle-timeout state machine for one motor
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorPower {
    mode: PowerMode,
    state: PowerState,
    timeout_ms: u32,
    countdown_ms: u32,
}

impl MotorPower {
    /// Create a power sequencer with the given mode and idle timeout
    pub fn new(mode: PowerMode, timeout_seconds: f32) -> Self {
        Self {
            mode,
            state: PowerState::Off,
            timeout_ms: (timeout_seconds * 1000.0) as u32,
            countdown_ms: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Change the power mode
    pub fn set_mode(&mut self, mode: PowerMode) {
        self.mode = mode;
    }

    /// Change the idle timeout
    pub fn set_timeout(&mut self, timeout_seconds: f32) {
        self.timeout_ms = (timeout_seconds * 1000.0) as u32;
    }

    /// The motor was enabled for a segment
    pub fn energized(&mut self) -> PowerAction {
        if self.mode == PowerMode::Disabled {
            return PowerAction::PowerDown;
        }
        self.state = PowerState::Running;
        PowerAction::PowerUp
    }

    /// The motor had no steps in the segment just loaded
    pub fn motion_stopped(&mut self) -> PowerAction {
        match self.mode {
            // In-cycle motors hold torque through the cycle and only
            // start timing out once the whole machine goes quiet.
            PowerMode::InCycle => {
                self.state = PowerState::TimeoutStart;
                PowerAction::PowerUp
            }
            PowerMode::WhenMoving if self.state == PowerState::Running => {
                self.state = PowerState::TimeoutStart;
                PowerAction::None
            }
            _ => PowerAction::None,
        }
    }

    /// Background tick. `have_stopped` is true when the whole runtime is
    /// idle; `elapsed_ms` is the time since the previous tick.
    pub fn periodic_check(&mut self, have_stopped: bool, elapsed_ms: u32) -> PowerAction {
        if have_stopped && self.state == PowerState::Running {
            self.state = PowerState::TimeoutStart;
        }
        if self.state == PowerState::TimeoutStart && self.mode != PowerMode::AlwaysOn {
            self.countdown_ms = self.timeout_ms;
            self.state = PowerState::TimeoutCountdown;
        }
        if self.state == PowerState::TimeoutCountdown {
            self.countdown_ms = self.countdown_ms.saturating_sub(elapsed_ms);
            if self.countdown_ms == 0 {
                self.state = PowerState::Idle;
                return PowerAction::PowerDown;
            }
        }
        PowerAction::None
    }
}
