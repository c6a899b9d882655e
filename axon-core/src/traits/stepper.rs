//! Stepper motor hardware abstraction
//!
//! One implementation per motor channel. The core calls into this trait
//! from interrupt context (step edges, direction changes) and from the
//! background power-management callback, so every method must be
//! non-blocking and bounded.

use crate::config::PowerMode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Motor rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Clockwise rotation
    #[default]
    Cw,
    /// Counter-clockwise rotation
    Ccw,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Cw => Direction::Ccw,
            Direction::Ccw => Direction::Cw,
        }
    }

    /// Direction implied by the sign of a travel request
    pub fn from_positive_travel(positive: bool) -> Self {
        if positive {
            Direction::Cw
        } else {
            Direction::Ccw
        }
    }

    /// Apply the motor's wiring polarity to a logical direction
    pub fn with_polarity(self, polarity: Polarity) -> Self {
        match polarity {
            Polarity::Normal => self,
            Polarity::Reversed => self.opposite(),
        }
    }
}

/// Motor wiring polarity
///
/// A reversed motor swaps the meaning of CW/CCW at the direction pin
/// without the planner having to know about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    #[default]
    Normal,
    Reversed,
}

/// Trait for per-motor stepper hardware
///
/// Implementations own the step/dir/enable pins (and typically the
/// power-down timing, see [`crate::power::MotorPower`]). Step pulses are
/// produced edge-wise: the DDA engine calls [`step_start`] on the tick
/// that emits a step and [`step_end`] on the following tick, so the
/// pulse width is exactly one DDA period.
///
/// [`step_start`]: StepperDriver::step_start
/// [`step_end`]: StepperDriver::step_end
pub trait StepperDriver {
    /// Energize the motor. Called at load time for every motor that has
    /// steps in the incoming segment.
    fn enable(&mut self);

    /// Remove power from the motor.
    fn disable(&mut self);

    /// Check whether the motor is currently de-energized.
    fn is_disabled(&self) -> bool;

    /// Set the direction output. Only called at load time, never
    /// mid-segment.
    fn set_direction(&mut self, direction: Direction);

    /// Apply a power level in `[0.0, 1.0]` (scaled to the driver's Vref
    /// or current-setting mechanism by the implementation).
    fn set_power_level(&mut self, level: f32);

    /// Apply a power management mode.
    fn set_power_mode(&mut self, mode: PowerMode);

    /// Apply a microstep setting to the driver hardware.
    fn set_microsteps(&mut self, microsteps: u8);

    /// Raise the step line.
    fn step_start(&mut self);

    /// Lower the step line.
    fn step_end(&mut self);

    /// The motor had no steps in the segment just loaded (or no segment
    /// was available). Implementations start or continue their idle
    /// timeout here.
    fn motion_stopped(&mut self);

    /// Background power-management tick, invoked only when the planner
    /// reports slack. `have_stopped` is true when the whole runtime is
    /// idle and no segment is waiting to load. Implementations that
    /// carry an SPI driver chip typically also advance its periodic
    /// register refresh from here.
    fn periodic_check(&mut self, have_stopped: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(Direction::Cw.opposite(), Direction::Ccw);
        assert_eq!(Direction::Ccw.opposite(), Direction::Cw);
    }

    #[test]
    fn test_travel_sign() {
        assert_eq!(Direction::from_positive_travel(true), Direction::Cw);
        assert_eq!(Direction::from_positive_travel(false), Direction::Ccw);
    }

    #[test]
    fn test_polarity() {
        assert_eq!(Direction::Cw.with_polarity(Polarity::Normal), Direction::Cw);
        assert_eq!(Direction::Cw.with_polarity(Polarity::Reversed), Direction::Ccw);
        assert_eq!(Direction::Ccw.with_polarity(Polarity::Reversed), Direction::Cw);
    }
}
