//! Board-agnostic axis motion core for the telescope mount firmware
//!
//! This crate contains all axis logic that does not depend on specific
//! hardware implementations:
//!
//! - Driver model, microstep table and driver settings validation
//! - The `StepperDriver` trait implemented by the driver crate
//! - The step sequencer run from the axis timer interrupt
//! - Microstep mode switching between tracking and slewing
//! - `StepDirMotor`, tying sequencer, driver and timer together

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod config;
pub mod motion;
pub mod traits;
