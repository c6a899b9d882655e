//! Segment preparation
//!
//! Converts the planner's float travel vector into the integer DDA
//! parameters the loader commits to the runtime. Runs in background
//! context (never inside an interrupt) and never blocks.
//!
//! Many of the expressions here are sensitive to rounding. The substep
//! increment is rounded, not truncated; truncation gives the conversion
//! a negative bias that shows up as long-term position drift.

use libm::{fabsf, roundf};

use crate::config::StepperConfig;
use crate::motion::segment::{BlockType, BufferOwner, PrepBuffer};
use crate::motion::{DDA_SUBSTEPS, EPSILON, FREQUENCY_DDA, FREQUENCY_DWELL, MIN_SEGMENT_TIME};
use crate::traits::Direction;
use crate::MOTORS;

/// Fatal prep failures. The embedding should treat these as panics:
/// they indicate a broken pipeline invariant, not bad user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrepError {
    /// `prep_line` was called while the loader owned the buffer
    SyncViolation,
    /// The segment time was infinite
    MoveTimeInfinite,
    /// The segment time was NaN
    MoveTimeNan,
}

/// Non-fatal prep results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrepOutcome {
    /// The segment was staged and the buffer handed to the loader
    Prepped,
    /// The segment was too short to schedule; the caller should skip it
    MinimumTimeMove,
}

/// Write access to the prep buffer, handed to the planner by the exec
/// stage
///
/// Splits the borrow so the planner can stage a segment while the
/// controller retains ownership of everything else.
pub struct PrepHandle<'a, C> {
    pub(crate) buf: &'a mut PrepBuffer<C>,
    pub(crate) cfg: &'a StepperConfig,
}

impl<'a, C> PrepHandle<'a, C> {
    /// Prepare the next line segment for the loader
    ///
    /// # Arguments
    /// - `travel_steps`: signed fractional steps per motor; the sign is
    ///   the direction, zero means the motor sits this segment out
    /// - `following_error`: encoder-observed step error per motor, used
    ///   for nudge correction
    /// - `segment_time`: segment duration in minutes
    pub fn prep_line(
        &mut self,
        mut travel_steps: [f32; MOTORS],
        following_error: [f32; MOTORS],
        segment_time: f32,
    ) -> Result<PrepOutcome, PrepError> {
        // Trap conditions that would prevent queuing the line
        if self.buf.buffer_state != BufferOwner::Exec {
            return Err(PrepError::SyncViolation);
        }
        if segment_time.is_infinite() {
            return Err(PrepError::MoveTimeInfinite);
        }
        if segment_time.is_nan() {
            return Err(PrepError::MoveTimeNan);
        }
        if segment_time < MIN_SEGMENT_TIME {
            return Ok(PrepOutcome::MinimumTimeMove);
        }

        // dda_ticks is the integer number of DDA clock ticks needed to
        // play out the segment; ticks_x_substeps is the working depth of
        // the accumulator. Segment time arrives in minutes.
        self.buf.dda_ticks = roundf(segment_time * 60.0 * FREQUENCY_DDA) as u32;
        self.buf.dda_ticks_x_substeps = self.buf.dda_ticks * DDA_SUBSTEPS;

        let correction_cfg = self.cfg.correction;
        for motor in 0..MOTORS {
            let motor_cfg = &self.cfg.motors[motor];
            let mot = &mut self.buf.mot[motor];

            // Skip this motor if there are no new steps. Leave all other
            // values intact so state comparisons at load time operate on
            // the last segment this motor actually ran.
            if fabsf(travel_steps[motor]) < EPSILON {
                mot.substep_increment = 0;
                continue;
            }

            // Direction, compensated for polarity. The step sign is what
            // the DDA interrupt accumulates into the encoder.
            if travel_steps[motor] >= 0.0 {
                mot.direction = Direction::Cw.with_polarity(motor_cfg.polarity);
                mot.step_sign = 1;
            } else {
                mot.direction = Direction::Ccw.with_polarity(motor_cfg.polarity);
                mot.step_sign = -1;
            }

            // Detect segment time changes and set up the accumulator
            // correction factor. Computing it here (against the last
            // segment time actually used) keeps the factor correct even
            // if the motor was dormant for any number of segments.
            if fabsf(segment_time - mot.prev_segment_time) > 0.0000001 {
                if fabsf(mot.prev_segment_time) > MIN_SEGMENT_TIME {
                    mot.accumulator_correction_flag = true;
                    mot.accumulator_correction = segment_time / mot.prev_segment_time;
                }
                mot.prev_segment_time = segment_time;
            }

            // Nudge correction: inject a single scaled correction toward
            // the observed following error, then hold off.
            mot.correction_holdoff = mot.correction_holdoff.saturating_sub(1);
            if mot.correction_holdoff < 0
                && fabsf(following_error[motor]) > correction_cfg.threshold
            {
                mot.correction_holdoff = correction_cfg.holdoff;
                let mut correction = following_error[motor] * correction_cfg.factor;
                if correction > 0.0 {
                    correction = correction
                        .min(fabsf(travel_steps[motor]))
                        .min(correction_cfg.max);
                } else {
                    correction = correction
                        .max(-fabsf(travel_steps[motor]))
                        .max(-correction_cfg.max);
                }
                mot.corrected_steps += correction;
                travel_steps[motor] -= correction;
            }

            // The increment must be *exactly* the fractional steps times
            // the substep multiplier or positional drift will occur.
            mot.substep_increment =
                roundf(fabsf(travel_steps[motor] * DDA_SUBSTEPS as f32)) as u32;
        }

        self.buf.block_type = BlockType::Aline;
        self.buf.buffer_state = BufferOwner::Loader;
        Ok(PrepOutcome::Prepped)
    }

    /// Stage a dwell of the given length in microseconds
    pub fn prep_dwell(&mut self, microseconds: f32) {
        self.buf.block_type = BlockType::Dwell;
        // Rounded for the same reason as the substep increment: a
        // truncating cast sits right below whole tick counts
        self.buf.dda_ticks = roundf((microseconds / 1_000_000.0) * FREQUENCY_DWELL) as u32;
        self.buf.buffer_state = BufferOwner::Loader;
    }

    /// Stage a synchronous command for the loader to dispatch
    pub fn prep_command(&mut self, command: C) {
        self.buf.block_type = BlockType::Command;
        self.buf.command = Some(command);
        self.buf.buffer_state = BufferOwner::Loader;
    }

    /// Keep the loader happy; performs no action
    pub fn prep_null(&mut self) {
        self.buf.block_type = BlockType::Null;
        self.buf.buffer_state = BufferOwner::Exec;
    }
}
