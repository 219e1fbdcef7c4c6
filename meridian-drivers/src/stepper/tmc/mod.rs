//! Trinamic register-configured drivers
//!
//! The TMC2130/TMC5160 (SPI) and TMC2209/TMC2226 (UART) share one driver
//! implementation. What differs is how a register gets to the chip, which
//! is abstracted by [`RegisterTransport`], and the register layouts, which
//! are keyed by [`registers::ChipFamily`].

pub mod current;
pub mod driver;
pub mod registers;
pub mod shadow;
pub mod spi;
pub mod uart;

use meridian_core::config::DriverInterface;

use crate::error::DriverError;

pub use driver::{TmcDriver, TmcSpiDriver, TmcUartDriver};
pub use registers::ChipFamily;
pub use shadow::RegisterShadow;
pub use spi::SpiTransport;
pub use uart::UartTransport;

/// Result of a register read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterRead {
    /// Register contents
    pub value: u32,
    /// Status byte returned alongside the data (SPI only)
    pub status: Option<u8>,
}

/// Moves whole registers between the MCU and a TMC chip
pub trait RegisterTransport {
    /// Error of the underlying bus
    type Error;

    /// Bus this transport speaks
    const INTERFACE: DriverInterface;

    /// Write a 32-bit register
    fn write_register(&mut self, register: u8, value: u32) -> Result<(), DriverError<Self::Error>>;

    /// Read a 32-bit register
    fn read_register(&mut self, register: u8) -> Result<RegisterRead, DriverError<Self::Error>>;

    /// Block for a number of milliseconds
    fn pause_ms(&mut self, ms: u32);
}
