//! Motor driver chip protocol state machines
//!
//! Pure-logic drivers for the SPI-configured stepper driver chips: the
//! crate builds wire frames and consumes completions but never touches
//! a bus, so the same code runs against real SPI peripherals and in
//! host tests.

#![no_std]
#![deny(unsafe_code)]

pub mod tmc2130;
