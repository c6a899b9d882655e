//! The motion controller
//!
//! Owns the prep and run buffers, the per-motor stepper drivers, the
//! encoder, the planner, and the two pulse timers, and sequences the
//! prep -> exec -> load -> run pipeline across them.
//!
//! # Interrupt model
//!
//! The original pipeline runs on strictly nested interrupt priorities:
//! DDA/dwell hardware timers above the load software interrupt, above
//! exec, above forward planning, above the main loop. This controller
//! keeps the same structure explicit: `request_*` methods latch pending
//! requests, [`service_pending`] dispatches them highest-first, and the
//! DDA tick calls the loader directly at its own priority. An embedding
//! with real software interrupts maps each pending level onto one
//! vector; a host build just calls [`service_pending`] after each
//! interrupt entry. Either way a higher stage is never preempted by a
//! lower one, which is the only property the lock-free buffer handoff
//! needs.
//!
//! [`service_pending`]: MotionController::service_pending

use crate::config::{ConfigError, MicrostepSetting, PowerMode, StepperConfig};
use crate::motion::prep::{PrepError, PrepHandle, PrepOutcome};
use crate::motion::segment::{BlockType, BufferOwner, PrepBuffer, RunBuffer, StructuralFault};
use crate::traits::{Direction, Encoder, Planner, PlannerStatus, Polarity, PulseTimer, StepperDriver};
use crate::MOTORS;

/// Direction every motor is initialized to at reset
const INITIAL_DIRECTION: Direction = Direction::Cw;

/// Software interrupt levels, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum SoftIrq {
    Load,
    Exec,
    Plan,
}

/// Latched software interrupt requests
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    load: bool,
    exec: bool,
    plan: bool,
}

impl Pending {
    /// Clear and return the highest-priority pending request
    fn take_highest(&mut self) -> Option<SoftIrq> {
        if self.load {
            self.load = false;
            Some(SoftIrq::Load)
        } else if self.exec {
            self.exec = false;
            Some(SoftIrq::Exec)
        } else if self.plan {
            self.plan = false;
            Some(SoftIrq::Plan)
        } else {
            None
        }
    }
}

/// The stepper motion execution core
///
/// Generic over the stepper hardware `S`, the encoder `E`, the planner
/// `P` and the pulse timer `T`. Construct once at startup and route the
/// hardware timer interrupts to [`dda_interrupt`] / [`dwell_interrupt`].
///
/// [`dda_interrupt`]: MotionController::dda_interrupt
/// [`dwell_interrupt`]: MotionController::dwell_interrupt
pub struct MotionController<S, E, P, T>
where
    S: StepperDriver,
    E: Encoder,
    P: Planner,
    T: PulseTimer,
{
    cfg: StepperConfig,
    pre: PrepBuffer<P::Command>,
    run: RunBuffer,
    steppers: [S; MOTORS],
    encoder: E,
    planner: P,
    dda_timer: T,
    dwell_timer: T,
    pending: Pending,
}

impl<S, E, P, T> MotionController<S, E, P, T>
where
    S: StepperDriver,
    E: Encoder,
    P: Planner,
    T: PulseTimer,
{
    /// Initialize the stepper subsystem
    ///
    /// Installs the buffer sentinels, applies the configured power level
    /// to every driver, and resets the runtime to a known idle state.
    pub fn new(
        cfg: StepperConfig,
        mut steppers: [S; MOTORS],
        encoder: E,
        planner: P,
        dda_timer: T,
        dwell_timer: T,
    ) -> Self {
        let mut run = RunBuffer::new();
        for (motor, stepper) in steppers.iter_mut().enumerate() {
            stepper.set_power_level(cfg.motors[motor].power_level);
            run.mot[motor].power_level_dynamic = cfg.motors[motor].power_level;
        }

        let mut controller = Self {
            cfg,
            pre: PrepBuffer::new(),
            run,
            steppers,
            encoder,
            planner,
            dda_timer,
            dwell_timer,
            pending: Pending::default(),
        };
        controller.reset();
        controller
    }

    /// Reset the stepper internals. Also used to halt movement.
    pub fn reset(&mut self) {
        self.dda_timer.stop();
        self.dwell_timer.stop();
        self.run.dda_ticks_downcount = 0; // the runtime is no longer busy
        self.pre.buffer_state = BufferOwner::Exec; // or it won't restart

        for motor in 0..MOTORS {
            self.pre.mot[motor].prev_direction = INITIAL_DIRECTION;
            self.pre.mot[motor].direction = INITIAL_DIRECTION;
            self.run.mot[motor].substep_accumulator = 0;
            self.pre.mot[motor].corrected_steps = 0.0;
        }
        // bring the planner's step position into agreement with the above
        self.planner.set_steps_to_runtime_position();
    }

    /// True while motors are stepping or a dwell is running
    pub fn runtime_is_busy(&self) -> bool {
        self.run.dda_ticks_downcount != 0
    }

    /// Verify the buffer sentinels; a failure is fatal
    pub fn test_assertions(&self) -> Result<(), StructuralFault> {
        if !self.run.sentinels_intact() {
            return Err(StructuralFault::RunSentinel);
        }
        if !self.pre.sentinels_intact() {
            return Err(StructuralFault::PrepSentinel);
        }
        Ok(())
    }

    // === Prep surface (background context) ===

    /// Prepare the next line segment for the loader; see
    /// [`PrepHandle::prep_line`]
    pub fn prep_line(
        &mut self,
        travel_steps: [f32; MOTORS],
        following_error: [f32; MOTORS],
        segment_time: f32,
    ) -> Result<PrepOutcome, PrepError> {
        let mut prep = PrepHandle {
            buf: &mut self.pre,
            cfg: &self.cfg,
        };
        prep.prep_line(travel_steps, following_error, segment_time)
    }

    /// Stage a dwell of `microseconds` for the loader
    pub fn prep_dwell(&mut self, microseconds: f32) {
        let mut prep = PrepHandle {
            buf: &mut self.pre,
            cfg: &self.cfg,
        };
        prep.prep_dwell(microseconds);
    }

    /// Stage a synchronous command for the loader
    pub fn prep_command(&mut self, command: P::Command) {
        let mut prep = PrepHandle {
            buf: &mut self.pre,
            cfg: &self.cfg,
        };
        prep.prep_command(command);
    }

    /// Stage a null block; keeps the loader happy after skipped moves
    pub fn prep_null(&mut self) {
        let mut prep = PrepHandle {
            buf: &mut self.pre,
            cfg: &self.cfg,
        };
        prep.prep_null();
    }

    /// Stage and immediately request a dwell without going through the
    /// planner. Only usable while exec isn't running (feedhold, stopped
    /// states).
    pub fn request_out_of_band_dwell(&mut self, microseconds: f32) {
        self.prep_dwell(microseconds);
        self.request_load_move();
    }

    // === Software interrupt requests ===

    /// Request that exec compute and prep the next segment
    pub fn request_exec_move(&mut self) {
        // only bother interrupting if exec owns the buffer
        if self.pre.buffer_state == BufferOwner::Exec {
            self.pending.exec = true;
        }
    }

    /// Request that the loader commit the prepped segment
    pub fn request_load_move(&mut self) {
        if self.runtime_is_busy() {
            // the DDA tick will load the next segment when this one ends
            return;
        }
        if self.pre.buffer_state == BufferOwner::Loader {
            self.pending.load = true;
        }
    }

    /// Request a forward-planning pass
    pub fn request_plan_move(&mut self) {
        self.pending.plan = true;
    }

    /// Dispatch latched requests, highest priority first, until none
    /// remain. Call after every interrupt entry (or from the software
    /// interrupt trampolines, one level each).
    pub fn service_pending(&mut self) {
        while let Some(irq) = self.pending.take_highest() {
            match irq {
                SoftIrq::Load => self.load_move(),
                SoftIrq::Exec => self.exec_move(),
                SoftIrq::Plan => self.plan_move(),
            }
        }
    }

    // === Interrupt service routines ===

    /// DDA timer tick
    ///
    /// Step pulses are set on tick N and cleared on tick N+1, so the
    /// on-time is exactly one DDA period. When the downcount reaches
    /// zero the loader runs at this interrupt priority so the next
    /// segment is in place before the next tick fires.
    pub fn dda_interrupt(&mut self) {
        // clear the steps that were set during the previous interrupt
        for stepper in self.steppers.iter_mut() {
            stepper.step_end();
        }

        // process the last DDA tick after the end of the segment
        if self.run.dda_ticks_downcount == 0 {
            self.dda_timer.stop(); // or it will keep stepping out the last segment
            return;
        }

        // run the DDA for each channel
        let ticks_x_substeps = self.run.dda_ticks_x_substeps as i32;
        for motor in 0..MOTORS {
            let mot = &mut self.run.mot[motor];
            mot.substep_accumulator += mot.substep_increment as i32;
            if mot.substep_accumulator > 0 {
                mot.substep_accumulator -= ticks_x_substeps;
                self.steppers[motor].step_start();
                self.encoder.increment(motor);
            }
        }

        // process end of segment
        self.run.dda_ticks_downcount -= 1;
        if self.run.dda_ticks_downcount == 0 {
            self.load_move(); // load the next move at this interrupt level
        }
    }

    /// Dwell timer tick. Shares the downcount with the DDA but touches
    /// no step pins.
    pub fn dwell_interrupt(&mut self) {
        if self.run.dda_ticks_downcount == 0 {
            return;
        }
        self.run.dda_ticks_downcount -= 1;
        if self.run.dda_ticks_downcount == 0 {
            self.dwell_timer.stop();
            self.load_move();
        }
    }

    // === Pipeline stages ===

    /// Exec stage: have the planner compute the next segment into the
    /// prep buffer, then hand the buffer to the loader.
    fn exec_move(&mut self) {
        if self.pre.buffer_state != BufferOwner::Exec {
            return;
        }
        let status = {
            let mut prep = PrepHandle {
                buf: &mut self.pre,
                cfg: &self.cfg,
            };
            self.planner.exec_move(&mut prep)
        };
        if status == PlannerStatus::Ok {
            self.pre.buffer_state = BufferOwner::Loader;
            self.request_load_move();
        }
    }

    /// Forward-plan stage
    fn plan_move(&mut self) {
        if self.planner.plan_move() == PlannerStatus::Ok {
            // we now have a move to exec
            self.request_exec_move();
        }
    }

    /// Loader: commit the prepped segment into the run buffer
    ///
    /// Must only run when the runtime is idle; callable from the DDA
    /// and dwell ticks or via [`request_load_move`].
    ///
    /// [`request_load_move`]: MotionController::request_load_move
    fn load_move(&mut self) {
        if self.runtime_is_busy() {
            return;
        }
        if self.pre.buffer_state != BufferOwner::Loader {
            // no moves to load; start the motor power timeouts
            for stepper in self.steppers.iter_mut() {
                stepper.motion_stopped();
            }
            return;
        }

        match self.pre.block_type {
            BlockType::Aline => {
                self.run.dda_ticks_downcount = self.pre.dda_ticks;
                self.run.dda_ticks_x_substeps = self.pre.dda_ticks_x_substeps;
                let ticks_x_substeps = self.run.dda_ticks_x_substeps as i32;

                for motor in 0..MOTORS {
                    let pre_mot = &mut self.pre.mot[motor];
                    let run_mot = &mut self.run.mot[motor];

                    run_mot.substep_increment = pre_mot.substep_increment;
                    if run_mot.substep_increment == 0 {
                        // Motor has 0 steps; the accumulator carries over
                        // untouched so a motor dormant for many segments
                        // resumes phase-coherently.
                        self.steppers[motor].motion_stopped();
                    } else {
                        // Apply the accumulator correction if the time
                        // base changed since the previous segment
                        if pre_mot.accumulator_correction_flag {
                            pre_mot.accumulator_correction_flag = false;
                            run_mot.substep_accumulator = (run_mot.substep_accumulator as f32
                                * pre_mot.accumulator_correction)
                                as i32;
                        }

                        // On a direction change, set the hardware
                        // direction and flip the accumulator about its
                        // midpoint to preserve the Bresenham phase
                        if pre_mot.direction != pre_mot.prev_direction {
                            pre_mot.prev_direction = pre_mot.direction;
                            run_mot.substep_accumulator =
                                -(ticks_x_substeps + run_mot.substep_accumulator);
                            self.steppers[motor].set_direction(pre_mot.direction);
                        }

                        self.steppers[motor].enable();
                        self.encoder.set_step_sign(motor, pre_mot.step_sign);
                    }
                    // fold counted steps into the step position and zero
                    // the count for the segment being loaded
                    self.encoder.accumulate(motor);
                }

                self.dda_timer.start(); // no-op if already running
            }
            BlockType::Dwell => {
                self.run.dda_ticks_downcount = self.pre.dda_ticks;
                self.dwell_timer.start();
            }
            BlockType::Command => {
                if let Some(command) = self.pre.command.take() {
                    self.planner.runtime_command(command);
                }
            }
            BlockType::Null => {}
        }

        // all cases drop to here, including null moves
        self.pre.block_type = BlockType::Null;
        self.pre.buffer_state = BufferOwner::Exec; // done with the prep buffer
        self.request_exec_move(); // exec and prep the next move
    }

    // === Motor power management ===

    fn energize_motor(&mut self, motor: usize, _timeout_seconds: f32) {
        if self.steppers[motor].is_disabled() {
            self.steppers[motor].disable();
            return;
        }
        self.steppers[motor].enable();
    }

    /// Apply power to all motors
    pub fn energize_motors(&mut self, timeout_seconds: f32) {
        for motor in 0..MOTORS {
            self.energize_motor(motor, timeout_seconds);
        }
    }

    /// Remove power from all motors
    pub fn deenergize_motors(&mut self) {
        for stepper in self.steppers.iter_mut() {
            stepper.disable();
        }
    }

    /// Background callback managing motor power sequencing
    ///
    /// Skipped (returns false) while the planner is time-constrained.
    /// Embeddings with SPI driver chips advance each chip's periodic
    /// register refresh in the same slack window.
    pub fn motor_power_callback(&mut self) -> bool {
        if !self.planner.is_phat_city_time() {
            return false;
        }

        let have_actually_stopped =
            !self.runtime_is_busy() && self.pre.buffer_state != BufferOwner::Loader;

        for stepper in self.steppers.iter_mut() {
            stepper.periodic_check(have_actually_stopped);
        }
        true
    }

    // === Configuration application ===

    /// Set a motor's step angle (degrees per whole step)
    pub fn set_step_angle(&mut self, motor: usize, degrees: f32) {
        self.cfg.motors[motor].set_step_angle(degrees);
    }

    /// Set a motor's travel per revolution
    pub fn set_travel_rev(&mut self, motor: usize, units: f32) {
        self.cfg.motors[motor].set_travel_rev(units);
    }

    /// Set a motor's wiring polarity. Takes effect at the next prep.
    pub fn set_polarity(&mut self, motor: usize, polarity: Polarity) {
        self.cfg.motors[motor].polarity = polarity;
    }

    /// Set a motor's microstep count and apply it to the hardware
    pub fn set_microsteps(&mut self, motor: usize, microsteps: u8) -> MicrostepSetting {
        let setting = self.cfg.motors[motor].set_microsteps(microsteps);
        self.steppers[motor].set_microsteps(microsteps);
        setting
    }

    /// Set a motor's power management mode and apply it to the hardware
    pub fn set_power_mode(&mut self, motor: usize, mode: PowerMode) {
        self.cfg.motors[motor].power_mode = mode;
        self.steppers[motor].set_power_mode(mode);
    }

    /// Set a motor's power level and apply it to the hardware.
    /// Values outside `[0.0, 1.0]` are rejected without state change.
    pub fn set_power_level(&mut self, motor: usize, level: f32) -> Result<(), ConfigError> {
        self.cfg.motors[motor].set_power_level(level)?;
        self.run.mot[motor].power_level_dynamic = level;
        self.steppers[motor].set_power_level(level);
        Ok(())
    }

    /// Set the motor idle timeout, clamped to the accepted range
    pub fn set_motor_power_timeout(&mut self, seconds: f32) {
        self.cfg.set_motor_power_timeout(seconds);
    }

    // === Diagnostics (for the text/CLI printer collaborator) ===

    /// Current configuration
    pub fn config(&self) -> &StepperConfig {
        &self.cfg
    }

    /// Total correction steps injected on a motor since reset
    pub fn corrected_steps(&self, motor: usize) -> f32 {
        self.pre.mot[motor].corrected_steps
    }

    /// Ticks remaining in the running segment
    pub fn dda_ticks_downcount(&self) -> u32 {
        self.run.dda_ticks_downcount
    }

    /// A motor's current Bresenham phase
    pub fn substep_accumulator(&self, motor: usize) -> i32 {
        self.run.mot[motor].substep_accumulator
    }

    /// Who currently owns the prep buffer
    pub fn buffer_owner(&self) -> BufferOwner {
        self.pre.buffer_state
    }

    /// A motor's stepper driver
    pub fn stepper(&self, motor: usize) -> &S {
        &self.steppers[motor]
    }

    /// The encoder collaborator
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// The planner collaborator
    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Mutable planner access (for feeding moves in host builds/tests)
    pub fn planner_mut(&mut self) -> &mut P {
        &mut self.planner
    }

    /// The DDA pulse timer
    pub fn dda_timer(&self) -> &T {
        &self.dda_timer
    }

    /// The dwell timer
    pub fn dwell_timer(&self) -> &T {
        &self.dwell_timer
    }

    /// Mutable run buffer access, for board bring-up and fault-injection
    /// tests
    pub fn run_mut(&mut self) -> &mut RunBuffer {
        &mut self.run
    }

    /// Mutable prep buffer access, for board bring-up and fault-injection
    /// tests
    pub fn prep_mut(&mut self) -> &mut PrepBuffer<P::Command> {
        &mut self.pre
    }
}
