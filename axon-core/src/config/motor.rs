//! Per-motor configuration
//!
//! Holds the mechanical parameters (step angle, travel per revolution,
//! microsteps, polarity) with their derived step scaling, and the power
//! management settings.

use crate::traits::Polarity;
use crate::MOTORS;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest accepted motor idle timeout, in seconds
pub const MOTOR_TIMEOUT_SECONDS_MIN: f32 = 0.1;

/// Largest accepted motor idle timeout, in seconds
pub const MOTOR_TIMEOUT_SECONDS_MAX: f32 = 4_294_967.0;

/// Microstep settings the driver hardware supports natively
pub const STANDARD_MICROSTEPS: [u8; 6] = [1, 2, 4, 8, 16, 32];

/// Motor power management mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PowerMode {
    /// Motor is never energized
    #[default]
    Disabled,
    /// Motor is always energized
    AlwaysOn,
    /// Motor stays energized for the whole machining cycle, then times out
    InCycle,
    /// Motor is energized only while it is moving, then times out
    WhenMoving,
}

impl PowerMode {
    /// Parse a numeric mode as received from the configuration surface
    pub fn from_u8(value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(PowerMode::Disabled),
            1 => Ok(PowerMode::AlwaysOn),
            2 => Ok(PowerMode::InCycle),
            3 => Ok(PowerMode::WhenMoving),
            _ => Err(ConfigError::UnsupportedPowerMode),
        }
    }
}

/// Configuration input errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Power level outside `[0.0, 1.0]`
    PowerLevelRange,
    /// Power mode value outside the enumerated set
    UnsupportedPowerMode,
}

/// Classification of an applied microstep setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicrostepSetting {
    /// One of the natively supported values
    Standard,
    /// Accepted anyway; the embedding should warn
    NonStandard,
}

/// Following-error nudge correction tunables
///
/// A single scaled correction is injected when the observed following
/// error exceeds `threshold`, then held off for `holdoff` segments to
/// avoid oscillation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectionConfig {
    /// Error magnitude (steps) below which no correction is applied
    pub threshold: f32,
    /// Fraction of the error injected per correction
    pub factor: f32,
    /// Cap on the injected correction, in steps
    pub max: f32,
    /// Segments to wait between corrections
    pub holdoff: i32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            factor: 0.25,
            max: 0.6,
            holdoff: 5,
        }
    }
}

/// Configuration for one motor channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotorConfig {
    /// Step angle in degrees per whole step (1.8 for 200-step motors)
    pub step_angle: f32,
    /// Travel in length units per motor revolution
    pub travel_rev: f32,
    /// Microstep setting
    pub microsteps: u8,
    /// Wiring polarity
    pub polarity: Polarity,
    /// Power management mode
    pub power_mode: PowerMode,
    /// Power level in `[0.0, 1.0]`
    pub power_level: f32,
    /// Derived: length units per microstep
    pub units_per_step: f32,
    /// Derived: microsteps per length unit
    pub steps_per_unit: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        let mut config = Self {
            step_angle: 1.8,
            travel_rev: 40.0,
            microsteps: 8,
            polarity: Polarity::Normal,
            power_mode: PowerMode::WhenMoving,
            power_level: 0.375,
            units_per_step: 0.0,
            steps_per_unit: 0.0,
        };
        config.update_steps_per_unit();
        config
    }
}

impl MotorConfig {
    /// Recompute the derived step scaling
    fn update_steps_per_unit(&mut self) {
        self.units_per_step =
            (self.travel_rev * self.step_angle) / (360.0 * self.microsteps as f32);
        self.steps_per_unit = 1.0 / self.units_per_step;
    }

    /// Set the step angle and refresh the derived scaling
    pub fn set_step_angle(&mut self, degrees: f32) {
        self.step_angle = degrees;
        self.update_steps_per_unit();
    }

    /// Set the travel per revolution and refresh the derived scaling
    pub fn set_travel_rev(&mut self, units: f32) {
        self.travel_rev = units;
        self.update_steps_per_unit();
    }

    /// Set the microstep count and refresh the derived scaling
    ///
    /// Non-standard values are applied anyway and flagged so the caller
    /// can warn the operator.
    pub fn set_microsteps(&mut self, microsteps: u8) -> MicrostepSetting {
        self.microsteps = microsteps;
        self.update_steps_per_unit();
        if STANDARD_MICROSTEPS.contains(&microsteps) {
            MicrostepSetting::Standard
        } else {
            MicrostepSetting::NonStandard
        }
    }

    /// Set the power level, rejecting values outside `[0.0, 1.0]`
    /// without changing state
    pub fn set_power_level(&mut self, level: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&level) {
            return Err(ConfigError::PowerLevelRange);
        }
        self.power_level = level;
        Ok(())
    }
}

/// Machine-wide stepper configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Per-motor configuration
    pub motors: [MotorConfig; MOTORS],
    /// Idle timeout applied when a motor's power mode times out, seconds
    pub motor_power_timeout: f32,
    /// Nudge correction tunables
    pub correction: CorrectionConfig,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            motors: [MotorConfig::default(); MOTORS],
            motor_power_timeout: 2.0,
            correction: CorrectionConfig::default(),
        }
    }
}

impl StepperConfig {
    /// Set the motor idle timeout, clamped to the accepted range
    pub fn set_motor_power_timeout(&mut self, seconds: f32) {
        self.motor_power_timeout =
            seconds.clamp(MOTOR_TIMEOUT_SECONDS_MIN, MOTOR_TIMEOUT_SECONDS_MAX);
    }
}
