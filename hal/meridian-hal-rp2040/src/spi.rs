//! Blocking SPI master
//!
//! Register traffic to TMC2130/TMC5160 is a handful of 5-byte frames per
//! status poll, so the blocking API is used; the frames are short enough
//! that DMA setup would cost more than the transfer.

use embassy_rp::spi::{self, Blocking, Instance, Spi};
use meridian_hal::spi::{Phase, Polarity, SpiConfig};
use meridian_hal::SpiBus;

/// Translate the HAL configuration into embassy-rp's
pub fn spi_config(config: &SpiConfig) -> spi::Config {
    let mut out = spi::Config::default();
    out.frequency = config.frequency;
    out.polarity = match config.polarity {
        Polarity::IdleLow => spi::Polarity::IdleLow,
        Polarity::IdleHigh => spi::Polarity::IdleHigh,
    };
    out.phase = match config.phase {
        Phase::CaptureOnFirstTransition => spi::Phase::CaptureOnFirstTransition,
        Phase::CaptureOnSecondTransition => spi::Phase::CaptureOnSecondTransition,
    };
    out
}

/// SPI bus backed by one of the two hardware SPI blocks
pub struct RpSpi<'d, T: Instance>(Spi<'d, T, Blocking>);

impl<'d, T: Instance> RpSpi<'d, T> {
    pub fn new(spi: Spi<'d, T, Blocking>) -> Self {
        Self(spi)
    }

    pub fn release(self) -> Spi<'d, T, Blocking> {
        self.0
    }
}

impl<T: Instance> SpiBus for RpSpi<'_, T> {
    type Error = spi::Error;

    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), spi::Error> {
        self.0.blocking_transfer_in_place(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), spi::Error> {
        self.0.blocking_write(data)
    }
}
