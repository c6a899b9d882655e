//! Prep and run buffers
//!
//! Two plain structs hand segments from the planner to the pulse
//! engine. The prep buffer has exactly one owner at any instant,
//! recorded in [`BufferOwner`]; the run buffer is written only by the
//! loader and read only by the DDA interrupt. Both are bracketed by
//! magic sentinels so memory smashes are caught before they turn into
//! lost steps.

use crate::traits::Direction;
use crate::MOTORS;

/// Structure integrity sentinel value
pub const MAGICNUM: u32 = 0x12EF;

/// Kind of block staged in the prep buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockType {
    /// Nothing staged; the loader skips it
    #[default]
    Null,
    /// An accelerated line segment
    Aline,
    /// A pure delay
    Dwell,
    /// A synchronous planner command
    Command,
}

/// Single-owner token for the prep buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferOwner {
    /// The exec stage may write the buffer
    #[default]
    Exec,
    /// The loader may consume the buffer
    Loader,
}

/// A corrupted sentinel was detected. Fatal; the embedding should halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StructuralFault {
    /// A run buffer sentinel was overwritten
    RunSentinel,
    /// A prep buffer sentinel was overwritten
    PrepSentinel,
}

/// Per-motor prep state
///
/// `prev_direction`, `correction_holdoff` and `prev_segment_time` carry
/// over between segments; everything else is rewritten by each prep.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrepMotor {
    /// Substeps added to the accumulator each DDA tick. Zero marks the
    /// motor idle for the segment.
    pub substep_increment: u32,
    /// Direction for the staged segment (polarity already applied)
    pub direction: Direction,
    /// Direction of the last segment this motor actually ran
    pub prev_direction: Direction,
    /// +1 or -1, published to the encoder at load time
    pub step_sign: i8,
    /// Accumulator scale factor applied once when the segment time changes
    pub accumulator_correction: f32,
    /// True when `accumulator_correction` is pending
    pub accumulator_correction_flag: bool,
    /// Running total of injected correction steps (diagnostic only)
    pub corrected_steps: f32,
    /// Segments remaining before the next nudge correction may fire
    pub correction_holdoff: i32,
    /// Duration of the last segment this motor ran, in minutes
    pub prev_segment_time: f32,
}

/// Per-motor runtime state, touched only by the loader and the DDA tick
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunMotor {
    /// Substeps added to the accumulator each DDA tick
    pub substep_increment: u32,
    /// Bresenham phase, kept in `[-dda_ticks_x_substeps, 0]`
    pub substep_accumulator: i32,
    /// Power level currently applied to the driver
    pub power_level_dynamic: f32,
}

/// The prep buffer: the segment being staged for the loader
///
/// `C` is the planner's command payload type for synchronous command
/// blocks.
#[derive(Debug)]
pub struct PrepBuffer<C> {
    pub magic_start: u32,
    /// Kind of block staged
    pub block_type: BlockType,
    /// Ownership token; see [`BufferOwner`]
    pub buffer_state: BufferOwner,
    /// Segment length in DDA (or dwell) clock ticks
    pub dda_ticks: u32,
    /// `dda_ticks * DDA_SUBSTEPS`, the accumulator working range
    pub dda_ticks_x_substeps: u32,
    /// Per-motor prep state
    pub mot: [PrepMotor; MOTORS],
    /// Payload for a [`BlockType::Command`] block
    pub command: Option<C>,
    pub magic_end: u32,
}

impl<C> PrepBuffer<C> {
    /// Zeroed buffer with sentinels installed and the exec stage owning it
    pub fn new() -> Self {
        Self {
            magic_start: MAGICNUM,
            block_type: BlockType::Null,
            buffer_state: BufferOwner::Exec,
            dda_ticks: 0,
            dda_ticks_x_substeps: 0,
            mot: [PrepMotor::default(); MOTORS],
            command: None,
            magic_end: MAGICNUM,
        }
    }

    /// Check the bracketing sentinels
    pub fn sentinels_intact(&self) -> bool {
        self.magic_start == MAGICNUM && self.magic_end == MAGICNUM
    }
}

impl<C> Default for PrepBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The run buffer: the segment currently being played out
#[derive(Debug, Clone, Copy)]
pub struct RunBuffer {
    pub magic_start: u32,
    /// Ticks remaining in the current segment; zero means the runtime
    /// is idle
    pub dda_ticks_downcount: u32,
    /// Accumulator working range for the current segment
    pub dda_ticks_x_substeps: u32,
    /// Per-motor runtime state
    pub mot: [RunMotor; MOTORS],
    pub magic_end: u32,
}

impl RunBuffer {
    /// Zeroed buffer with sentinels installed
    pub fn new() -> Self {
        Self {
            magic_start: MAGICNUM,
            dda_ticks_downcount: 0,
            dda_ticks_x_substeps: 0,
            mot: [RunMotor::default(); MOTORS],
            magic_end: MAGICNUM,
        }
    }

    /// Check the bracketing sentinels
    pub fn sentinels_intact(&self) -> bool {
        self.magic_start == MAGICNUM && self.magic_end == MAGICNUM
    }
}

impl Default for RunBuffer {
    fn default() -> Self {
        Self::new()
    }
}
