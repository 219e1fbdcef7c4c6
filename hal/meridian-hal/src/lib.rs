//! Meridian Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits the axis core and
//! the stepper-driver implementations are written against. Chip-specific
//! HALs (currently RP2040) implement them; host tests implement them with
//! recording mocks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  meridian-firmware (tasks, tick IRQ)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  meridian-core / meridian-drivers       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  meridian-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!          ┌─────────────────────┐
//!          │ meridian-hal-rp2040 │
//!          └─────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O (step, dir, M0-M2, enable, fault)
//! - [`spi::SpiBus`] - SPI transfers to TMC register-protocol drivers
//! - [`uart::UartTx`], [`uart::UartRx`] - Single-wire UART to TMC drivers
//! - [`timer::StepTimer`] - Hardware tick timer driving the step sequencer

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod timer;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use gpio::{InputPin, OutputPin};
pub use spi::SpiBus;
pub use timer::StepTimer;
pub use uart::{UartRx, UartTx};
