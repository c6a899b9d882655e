//! Segment execution
//!
//! The prep/exec/load pipeline and the DDA pulse engine. A segment is a
//! short, fixed-duration slice of a motion block with constant per-tick
//! substep increments; the planner preps them, the loader commits them
//! to the runtime, and the DDA interrupt plays them out as step pulses.

pub mod controller;
pub mod prep;
pub mod segment;

pub use controller::MotionController;
pub use prep::{PrepError, PrepHandle, PrepOutcome};
pub use segment::{BlockType, BufferOwner, PrepBuffer, RunBuffer, StructuralFault};

/// DDA clock frequency in Hz. Pulse on-time is one DDA period.
pub const FREQUENCY_DDA: f32 = 200_000.0;

/// Dwell clock frequency in Hz.
pub const FREQUENCY_DWELL: f32 = 1_000.0;

/// Substeps per whole step. Expands the accumulator resolution so that
/// fractional per-tick motion is representable exactly.
pub const DDA_SUBSTEPS: u32 = 100_000;

/// Minimum schedulable segment time, in minutes. Anything shorter is
/// reported back to the caller as a minimum-time move and skipped.
pub const MIN_SEGMENT_TIME: f32 = 1e-8;

/// Floating point noise floor for step counts.
pub const EPSILON: f32 = 0.00001;
