//! UART serial communication abstractions
//!
//! TMC2209/TMC2226 drivers share one half-duplex wire per bus. Every byte
//! the host sends is echoed back on its own receiver, which the driver
//! code must read and discard before the reply arrives.

/// UART transmitter
pub trait UartTx {
    /// Error type for transmit operations
    type Error;

    /// Write data to the UART
    ///
    /// Blocks until all data has been queued or an error occurs.
    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Wait until the last queued byte has left the shift register
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// UART receiver
pub trait UartRx {
    /// Error type for receive operations
    type Error;

    /// Read data from the UART
    ///
    /// Blocks until the buffer is filled, the line goes idle, or an error
    /// occurs. Returns the number of bytes received.
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Combined UART interface
///
/// Both halves must report the same error type so a single driver error
/// variant can carry either.
pub trait Uart: UartTx + UartRx<Error = <Self as UartTx>::Error> {}

// Blanket implementation
impl<T> Uart for T where T: UartTx + UartRx<Error = <T as UartTx>::Error> {}
