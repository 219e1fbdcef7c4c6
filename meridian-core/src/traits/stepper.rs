//! Stepper motor driver trait
//!
//! This trait abstracts over the different driver chip families: simple
//! step/dir carriers configured through GPIO lines and Trinamic chips
//! configured through SPI or UART registers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{AxisParameter, ConfigError, DriverSettings};

/// Motor rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Increasing step count
    Forward,
    /// Decreasing step count
    Reverse,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// Direction of a signed quantity, `None` for zero
    pub fn of(value: i64) -> Option<Self> {
        match value {
            v if v > 0 => Some(Direction::Forward),
            v if v < 0 => Some(Direction::Reverse),
            _ => None,
        }
    }

    /// +1 or -1
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// Fault flags of one motor output bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputStatus {
    pub short_to_ground: bool,
    pub open_load: bool,
}

/// Decoded driver status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStatus {
    /// Status reporting is available for this driver
    pub active: bool,
    pub output_a: OutputStatus,
    pub output_b: OutputStatus,
    pub over_temperature_warning: bool,
    pub over_temperature: bool,
    pub standstill: bool,
    /// Any fault, including the generic fault pin
    pub fault: bool,
}

impl DriverStatus {
    /// Status reported when the driver cannot be read
    ///
    /// A dead link is indistinguishable from a dead driver, so every fault
    /// flag is raised.
    pub const fn failsafe() -> Self {
        let faulted = OutputStatus {
            short_to_ground: true,
            open_load: true,
        };
        Self {
            active: true,
            output_a: faulted,
            output_b: faulted,
            over_temperature_warning: true,
            over_temperature: true,
            standstill: true,
            fault: true,
        }
    }

    /// Any hardware fault is flagged
    pub fn has_fault(&self) -> bool {
        self.fault
            || self.over_temperature
            || self.output_a.short_to_ground
            || self.output_b.short_to_ground
    }
}

/// Trait for stepper motor drivers
///
/// Implementations own their configuration and any register shadow state.
/// Bus I/O is blocking; none of these methods may be called from the step
/// tick handler.
pub trait StepperDriver {
    /// Bus or protocol error of the implementation
    type Error;

    /// Configure the chip for tracking mode and power it down
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Active settings
    fn settings(&self) -> &DriverSettings;

    /// Check settings against this driver before they are applied
    fn validate_parameters(&self, settings: &DriverSettings) -> Result<(), ConfigError> {
        settings.validate()
    }

    /// Replace the settings
    ///
    /// Takes effect on the next `mode_*` call.
    fn set_parameters(&mut self, settings: DriverSettings) -> Result<(), ConfigError>;

    /// Select tracking microsteps (and run current)
    fn mode_microstep_tracking(&mut self) -> Result<(), Self::Error>;

    /// Select slewing microsteps (and goto current)
    fn mode_microstep_slewing(&mut self) -> Result<(), Self::Error>;

    /// Select the tracking decay mode
    fn mode_decay_tracking(&mut self) -> Result<(), Self::Error>;

    /// Select the slewing decay mode
    fn mode_decay_slewing(&mut self) -> Result<(), Self::Error>;

    /// Poll the chip for fault flags
    ///
    /// Never fails: a read error is reported through [`DriverStatus::failsafe`].
    fn update_status(&mut self);

    /// Last polled status
    fn get_status(&self) -> DriverStatus;

    /// Enable or disable the power stage
    fn power(&mut self, on: bool);

    /// Check if the power stage is enabled
    fn is_powered(&self) -> bool;

    /// Run chip-specific calibration (no-op for most drivers)
    fn calibrate_driver(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Tracking:slewing microstep ratio
    fn microstep_ratio(&self) -> u16 {
        self.settings().microstep_ratio()
    }

    /// Driver can change resolution on the fly
    fn can_switch_modes(&self) -> bool {
        self.settings().model.can_switch_modes() && self.microstep_ratio() > 1
    }

    /// Read a runtime parameter
    fn get_parameter(&self, parameter: AxisParameter) -> i32 {
        self.settings().get_parameter(parameter)
    }

    /// Change a runtime parameter after validating the resulting settings
    fn set_parameter(&mut self, parameter: AxisParameter, value: i32) -> Result<(), ConfigError> {
        let mut settings = *self.settings();
        settings.set_parameter(parameter, value)?;
        self.validate_parameters(&settings)?;
        self.set_parameters(settings)
    }
}
