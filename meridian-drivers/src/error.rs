//! Driver error types

use meridian_core::config::ConfigError;

/// Malformed or unexpected data from a TMC chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Reply does not start with the sync byte
    InvalidSync,
    /// CRC mismatch
    CrcMismatch,
    /// Single-wire echo differs from what was sent
    EchoMismatch,
    /// Reply is for a different register than requested
    UnexpectedRegister,
    /// Reply shorter than a full datagram
    Truncated,
}

/// Stepper driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError<E> {
    /// SPI/UART transfer failed
    Bus(E),
    /// Transfer completed but the data is invalid
    Protocol(ProtocolError),
    /// Settings cannot be realized by this driver
    Config(ConfigError),
}

impl<E> From<ProtocolError> for DriverError<E> {
    fn from(err: ProtocolError) -> Self {
        DriverError::Protocol(err)
    }
}

impl<E> From<ConfigError> for DriverError<E> {
    fn from(err: ConfigError) -> Self {
        DriverError::Config(err)
    }
}
