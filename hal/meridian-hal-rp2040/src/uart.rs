//! Buffered UART for TMC single-wire buses
//!
//! The interrupt-driven ring buffers keep bytes coming in while the driver
//! code is busy; reads poll the buffer until the datagram is complete or
//! the line stays quiet for [`READ_TIMEOUT`].

use embassy_rp::uart::{BufferedUart, Error};
use embassy_time::{Duration, Instant};
use embedded_io::{Read, ReadReady, Write};
use meridian_hal::{UartRx, UartTx};

/// Longest silence tolerated while a reply is expected
///
/// A full 8-byte reply takes under 1 ms at 115200 baud; the driver needs
/// up to 8 bit times of SENDDELAY on top.
pub const READ_TIMEOUT: Duration = Duration::from_millis(5);

pub struct RpUart {
    uart: BufferedUart,
    timeout: Duration,
}

impl RpUart {
    pub fn new(uart: BufferedUart) -> Self {
        Self {
            uart,
            timeout: READ_TIMEOUT,
        }
    }

    pub fn with_timeout(uart: BufferedUart, timeout: Duration) -> Self {
        Self { uart, timeout }
    }

    pub fn release(self) -> BufferedUart {
        self.uart
    }
}

impl UartTx for RpUart {
    type Error = Error;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Error> {
        Write::write_all(&mut self.uart, data)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Write::flush(&mut self.uart)
    }
}

impl UartRx for RpUart {
    type Error = Error;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        let mut deadline = Instant::now() + self.timeout;

        while filled < buf.len() {
            if ReadReady::read_ready(&mut self.uart)? {
                filled += Read::read(&mut self.uart, &mut buf[filled..])?;
                deadline = Instant::now() + self.timeout;
            } else if Instant::now() >= deadline {
                break;
            }
        }
        Ok(filled)
    }
}
