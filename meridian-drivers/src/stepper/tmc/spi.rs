//! TMC SPI transport
//!
//! Every transaction is a 40-bit frame: one address byte followed by four
//! data bytes, most significant first. The chip answers each frame with its
//! SPI status byte and the data latched by the *previous* frame, so a read
//! takes two transactions.

use embedded_hal::delay::DelayNs;
use meridian_core::config::DriverInterface;
use meridian_hal::{OutputPin, SpiBus};

use super::registers::{read_address, write_address, SPI_STATUS};
use super::{RegisterRead, RegisterTransport};
use crate::error::DriverError;

/// Length of one SPI frame
pub const FRAME_LEN: usize = 5;

/// CS high time between frames
const INTER_FRAME_US: u32 = 10;

/// Frame writing `value` to `register`
pub fn write_frame(register: u8, value: u32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = write_address(register);
    frame[1..].copy_from_slice(&value.to_be_bytes());
    frame
}

/// Frame requesting `register`
pub fn read_frame(register: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = read_address(register);
    frame
}

/// Split a reply into status byte and data
pub fn parse_reply(reply: &[u8; FRAME_LEN]) -> (SPI_STATUS, u32) {
    (
        SPI_STATUS(reply[0]),
        u32::from_be_bytes([reply[1], reply[2], reply[3], reply[4]]),
    )
}

/// Register transport over SPI with a dedicated chip select
pub struct SpiTransport<B, CS, D> {
    bus: B,
    cs: CS,
    delay: D,
}

impl<B: SpiBus, CS: OutputPin, D: DelayNs> SpiTransport<B, CS, D> {
    /// Create a transport; CS is driven high (deselected)
    pub fn new(bus: B, mut cs: CS, delay: D) -> Self {
        cs.set_high();
        Self { bus, cs, delay }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the bus, chip select and delay
    pub fn release(self) -> (B, CS, D) {
        (self.bus, self.cs, self.delay)
    }

    /// One CS-framed transaction; returns the chip's reply
    pub fn transfer(&mut self, frame: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN], B::Error> {
        let mut buf = frame;
        self.cs.set_low();
        let result = self.bus.transfer_in_place(&mut buf);
        self.cs.set_high();
        self.delay.delay_us(INTER_FRAME_US);
        result.map(|()| buf)
    }
}

impl<B: SpiBus, CS: OutputPin, D: DelayNs> RegisterTransport for SpiTransport<B, CS, D> {
    type Error = B::Error;

    const INTERFACE: DriverInterface = DriverInterface::Spi;

    fn write_register(&mut self, register: u8, value: u32) -> Result<(), DriverError<Self::Error>> {
        self.transfer(write_frame(register, value))
            .map_err(DriverError::Bus)?;
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<RegisterRead, DriverError<Self::Error>> {
        // First frame latches the address, the second clocks the data out
        self.transfer(read_frame(register)).map_err(DriverError::Bus)?;
        let reply = self.transfer(read_frame(register)).map_err(DriverError::Bus)?;

        let (status, value) = parse_reply(&reply);
        trace!(
            "tmc spi read {=u8:#x} = {=u32:#x} (status {=u8:#x})",
            register,
            value,
            status.0
        );
        if status.reset_flag() {
            debug!("tmc spi: driver reported reset");
        }
        Ok(RegisterRead {
            value,
            status: Some(status.0),
        })
    }

    fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
