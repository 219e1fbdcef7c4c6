//! RP2040 implementation of the Meridian HAL
//!
//! Wraps embassy-rp peripherals so the axis core and the stepper drivers
//! can run on them:
//!
//! - GPIO outputs and inputs ([`gpio`])
//! - Blocking SPI for TMC2130/TMC5160 ([`spi`])
//! - Buffered single-wire UART for TMC2208/TMC2209/TMC2226 ([`uart`])
//! - Hardware alarms that pace the step tick interrupt ([`timer`])

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod timer;
pub mod uart;

pub use gpio::{RpInput, RpOutput};
pub use spi::RpSpi;
pub use timer::{AlarmTimer, StepAlarm};
pub use uart::RpUart;
