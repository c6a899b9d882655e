//! Trajectory planner interface
//!
//! The planner sits above the core: it turns motion blocks into short
//! constant-velocity segments and feeds them into the prep buffer when
//! the exec stage asks for them. All methods are called from interrupt
//! context (exec and load priority) and must be non-blocking and
//! bounded.

use crate::motion::prep::PrepHandle;

/// Result of a planner advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlannerStatus {
    /// The planner made progress (a segment was prepped, or forward
    /// planning produced work for exec).
    Ok,
    /// Nothing to do.
    Noop,
}

/// Trait for the trajectory planner collaborator
pub trait Planner {
    /// Payload of a synchronous command block, dispatched back through
    /// [`runtime_command`] when the loader reaches it.
    ///
    /// [`runtime_command`]: Planner::runtime_command
    type Command;

    /// Compute the next segment and stage it through `prep`
    /// ([`PrepHandle::prep_line`] and friends). Returns
    /// [`PlannerStatus::Noop`] when no move is available.
    fn exec_move(&mut self, prep: &mut PrepHandle<'_, Self::Command>) -> PlannerStatus;

    /// Run forward planning. Returns [`PlannerStatus::Ok`] when a move
    /// became ready for exec.
    fn plan_move(&mut self) -> PlannerStatus;

    /// True when the planner has slack ("phat city") and low-priority
    /// maintenance such as motor power sequencing may run.
    fn is_phat_city_time(&self) -> bool;

    /// Execute a command block synchronously at load priority.
    fn runtime_command(&mut self, command: Self::Command);

    /// Synchronize the planner's step position to the runtime position.
    /// Called from [`reset`](crate::motion::MotionController::reset).
    fn set_steps_to_runtime_position(&mut self);
}
