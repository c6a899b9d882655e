//! Pulse timer control
//!
//! The DDA and dwell engines each run off a fixed-frequency hardware
//! timer. The core only starts and stops them; the embedding routes the
//! timer's interrupt to [`dda_interrupt`] or [`dwell_interrupt`].
//!
//! [`dda_interrupt`]: crate::motion::MotionController::dda_interrupt
//! [`dwell_interrupt`]: crate::motion::MotionController::dwell_interrupt

/// Trait for a fixed-frequency interrupt timer
pub trait PulseTimer {
    /// Start the timer. Must be a no-op if it is already running.
    fn start(&mut self);

    /// Stop the timer.
    fn stop(&mut self);

    /// Check whether the timer is running.
    fn is_running(&self) -> bool;
}
