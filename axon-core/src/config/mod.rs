//! Configuration type definitions
//!
//! Per-motor mechanical and power configuration plus the machine-wide
//! tunables. The embedding persists and edits these; the core consumes
//! them.

pub mod motor;

pub use motor::{
    ConfigError, CorrectionConfig, MicrostepSetting, MotorConfig, PowerMode, StepperConfig,
    MOTOR_TIMEOUT_SECONDS_MAX, MOTOR_TIMEOUT_SECONDS_MIN,
};
