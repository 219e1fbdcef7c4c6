//! Hardware configuration types
//!
//! Pin assignments for one mount axis and the bus its driver hangs off.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::driver::{DriverInterface, DriverModel};

/// Number of axes a controller drives (RA/azimuth and Dec/altitude)
pub const MAX_AXES: usize = 2;

/// Pin configuration with optional inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConfig {
    /// GPIO pin number (0-29 for RP2040)
    pub pin: u8,
    /// Pin is active-low (inverted)
    pub inverted: bool,
    /// Enable internal pull-up
    pub pull_up: bool,
}

impl PinConfig {
    /// Create a new pin config
    pub const fn new(pin: u8) -> Self {
        Self {
            pin,
            inverted: false,
            pull_up: false,
        }
    }

    /// Create an inverted (active-low) pin
    pub const fn inverted(pin: u8) -> Self {
        Self {
            pin,
            inverted: true,
            pull_up: false,
        }
    }

    /// Create a pin with pull-up enabled
    pub const fn with_pullup(pin: u8) -> Self {
        Self {
            pin,
            inverted: false,
            pull_up: true,
        }
    }

    /// Electrical level that represents the logical "active" state
    pub const fn active_level(&self) -> bool {
        !self.inverted
    }
}

/// How the driver's configuration interface is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DriverBusPins {
    /// Microstep mode lines and decay line
    Pins {
        m0: Option<PinConfig>,
        m1: Option<PinConfig>,
        m2: Option<PinConfig>,
        decay: Option<PinConfig>,
    },
    /// SPI (hardware or bit-banged), M0 = MOSI, M1 = SCK, M2 = CS, M3 = MISO
    Spi {
        mosi: u8,
        sck: u8,
        cs: u8,
        miso: u8,
    },
    /// Single-wire UART shared by all axes
    Uart { tx: u8, rx: u8, address: u8 },
}

/// Pins of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisPins {
    /// Step pulse pin
    pub step: PinConfig,
    /// Direction pin
    pub dir: PinConfig,
    /// Driver enable pin (active-low on most carriers)
    pub enable: Option<PinConfig>,
    /// Driver fault input
    pub fault: Option<PinConfig>,
    /// Configuration interface
    pub bus: DriverBusPins,
}

impl AxisPins {
    /// Check that the wiring matches the driver model's interface
    pub fn matches(&self, model: DriverModel) -> bool {
        matches!(
            (model.interface(), &self.bus),
            (DriverInterface::Pins, DriverBusPins::Pins { .. })
                | (DriverInterface::Spi, DriverBusPins::Spi { .. })
                | (DriverInterface::Uart, DriverBusPins::Uart { .. })
        )
    }

    /// UART address of the driver, if UART-attached
    pub fn uart_address(&self) -> Option<u8> {
        match self.bus {
            DriverBusPins::Uart { address, .. } => Some(address),
            _ => None,
        }
    }
}
