//! Stepper driver implementations
//!
//! This crate provides concrete implementations of the `StepperDriver`
//! trait defined in meridian-core:
//!
//! - Generic step/dir carriers configured through M0-M2 and decay GPIOs
//! - Trinamic TMC2130/TMC5160 over SPI
//! - Trinamic TMC2209/TMC2226 over single-wire UART
//!
//! plus the TMC register codec they share and a bit-banged SPI bus for
//! boards that route the driver SPI lines to arbitrary GPIOs.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod bus;
pub mod error;
pub mod stepper;

pub use error::{DriverError, ProtocolError};
