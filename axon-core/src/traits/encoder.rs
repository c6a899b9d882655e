//! Position encoder interface
//!
//! The encoder tracks the step position the core has actually emitted.
//! It is nudged from the DDA interrupt, so all methods must be a handful
//! of instructions at most.

/// Trait for the step-position tracker
pub trait Encoder {
    /// Publish the sign (+1 or -1) that subsequent [`increment`] calls
    /// for this motor should apply. Set at load time from the segment's
    /// travel direction.
    ///
    /// [`increment`]: Encoder::increment
    fn set_step_sign(&mut self, motor: usize, sign: i8);

    /// One step pulse was emitted on `motor`; advance its running count
    /// by the published step sign.
    fn increment(&mut self, motor: usize);

    /// Fold the running count of the segment being retired into the
    /// motor's step position and clear it for the segment being loaded.
    fn accumulate(&mut self, motor: usize);
}
