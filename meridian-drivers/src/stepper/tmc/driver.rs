//! TMC driver over any register transport
//!
//! Owns the axis' driver settings and a shadow of every register it has
//! written. Mode switches rebuild the affected registers from the settings
//! and only touch the bus for those whose value actually changed.

use meridian_core::config::{ConfigError, Decay, DriverSettings};
use meridian_core::traits::{DriverStatus, OutputStatus, StepperDriver};
use meridian_hal::OutputPin;

use super::current::model_current_to_cs;
use super::registers::{self, reg, ChipFamily, CHOPCONF, DRV_STATUS_SPI, DRV_STATUS_UART};
use super::shadow::RegisterShadow;
use super::spi::SpiTransport;
use super::uart::UartTransport;
use super::RegisterTransport;
use crate::error::DriverError;

/// How long stealthChop automatic tuning holds the motor at run current
pub const CALIBRATION_MS: u32 = 150;

/// Clear all GSTAT flags (write-1-to-clear)
const GSTAT_CLEAR: u32 = 0b111;

/// Full-scale current on the TMC5160 (0 means 256/256)
const GLOBAL_SCALER_FULL: u32 = 0;

/// TMC2130/TMC5160 over SPI
pub type TmcSpiDriver<B, CS, D, EN> = TmcDriver<SpiTransport<B, CS, D>, EN>;

/// TMC2209/TMC2226 over UART
pub type TmcUartDriver<U, D, EN> = TmcDriver<UartTransport<U, D>, EN>;

/// Register-configured Trinamic driver
pub struct TmcDriver<T, EN> {
    transport: T,
    /// ENN pin, active low
    enable: Option<EN>,
    settings: DriverSettings,
    family: ChipFamily,
    chopconf: CHOPCONF,
    shadow: RegisterShadow,
    status: DriverStatus,
    powered: bool,
}

impl<T: RegisterTransport, EN: OutputPin> TmcDriver<T, EN> {
    /// Create a driver for `settings.model`
    ///
    /// The model must be one spoken over this transport's bus.
    pub fn new(transport: T, enable: Option<EN>, settings: DriverSettings) -> Result<Self, ConfigError> {
        let family = Self::family_for(&settings)?;
        settings.validate()?;

        let mut driver = Self {
            transport,
            enable,
            settings,
            family,
            chopconf: registers::chopconf_base(family),
            shadow: RegisterShadow::new(),
            status: DriverStatus::default(),
            powered: true,
        };
        driver.power(false);
        Ok(driver)
    }

    fn family_for(settings: &DriverSettings) -> Result<ChipFamily, ConfigError> {
        let model = settings.model;
        if model.interface() != T::INTERFACE {
            return Err(ConfigError::WrongInterface(model));
        }
        ChipFamily::of(model).ok_or(ConfigError::WrongInterface(model))
    }

    /// Register layout family
    pub fn family(&self) -> ChipFamily {
        self.family
    }

    /// Register shadow, for diagnostics
    pub fn shadow(&self) -> &RegisterShadow {
        &self.shadow
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport and enable pin
    pub fn release(self) -> (T, Option<EN>) {
        (self.transport, self.enable)
    }

    /// Write a register unless the shadow says it already holds `value`
    fn write(&mut self, register: u8, value: u32) -> Result<(), DriverError<T::Error>> {
        if !self.shadow.is_stale(register, value) {
            return Ok(());
        }

        trace!("tmc write {=u8:#x} = {=u32:#x}", register, value);
        if let Err(err) = self.transport.write_register(register, value) {
            // The chip may or may not have taken it
            self.shadow.invalidate(register);
            return Err(err);
        }
        self.shadow.record(register, value);
        Ok(())
    }

    fn current_scale(&self, current_ma: u16) -> Result<u8, ConfigError> {
        model_current_to_cs(self.settings.model, current_ma).ok_or(ConfigError::CurrentNotSupported)
    }

    /// Write IHOLD_IRUN with the given run current
    fn write_currents(&mut self, run_ma: u16) -> Result<(), DriverError<T::Error>> {
        let ihold = self.current_scale(self.settings.hold_current_ma())?;
        let irun = self.current_scale(run_ma)?;
        self.write(reg::IHOLD_IRUN, registers::ihold_irun(ihold, irun))
    }

    fn write_microsteps(&mut self, code: u8) -> Result<(), DriverError<T::Error>> {
        self.write(reg::CHOPCONF, registers::chopconf(self.chopconf, code))
    }

    fn write_decay(&mut self, decay: Decay) -> Result<(), DriverError<T::Error>> {
        self.write(reg::GCONF, registers::gconf(self.family, decay))
    }

    fn decode_status(&self, value: u32, status_byte: Option<u8>) -> DriverStatus {
        match self.family {
            ChipFamily::Tmc2130 | ChipFamily::Tmc5160 => {
                // A missing chip reads as all zeroes, status byte included
                if value == 0 && status_byte == Some(0) {
                    return DriverStatus::failsafe();
                }
                let drv = DRV_STATUS_SPI(value);
                let mut status = DriverStatus {
                    active: true,
                    output_a: OutputStatus {
                        short_to_ground: drv.s2ga(),
                        open_load: drv.ola(),
                    },
                    output_b: OutputStatus {
                        short_to_ground: drv.s2gb(),
                        open_load: drv.olb(),
                    },
                    over_temperature_warning: drv.otpw(),
                    over_temperature: drv.ot(),
                    standstill: drv.stst(),
                    fault: false,
                };
                let driver_error = status_byte
                    .map(|byte| registers::SPI_STATUS(byte).driver_error())
                    .unwrap_or(false);
                status.fault = driver_error || status.has_fault();
                status
            }
            ChipFamily::Tmc2209 => {
                let drv = DRV_STATUS_UART(value);
                let mut status = DriverStatus {
                    active: true,
                    output_a: OutputStatus {
                        short_to_ground: drv.s2ga() || drv.s2vsa(),
                        open_load: drv.ola(),
                    },
                    output_b: OutputStatus {
                        short_to_ground: drv.s2gb() || drv.s2vsb(),
                        open_load: drv.olb(),
                    },
                    over_temperature_warning: drv.otpw(),
                    over_temperature: drv.ot(),
                    standstill: drv.stst(),
                    fault: false,
                };
                status.fault = status.has_fault();
                status
            }
        }
    }
}

impl<T: RegisterTransport, EN: OutputPin> StepperDriver for TmcDriver<T, EN> {
    type Error = DriverError<T::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.power(false);
        self.shadow.clear();
        self.chopconf = registers::chopconf_base(self.family);

        self.transport.write_register(reg::GSTAT, GSTAT_CLEAR)?;
        self.write_decay(self.settings.decay)?;
        if self.family == ChipFamily::Tmc5160 {
            self.write(reg::GLOBAL_SCALER, GLOBAL_SCALER_FULL)?;
        }
        self.mode_microstep_tracking()?;
        self.write(reg::TPOWERDOWN, registers::TPOWERDOWN_VALUE)?;
        // stealthChop (when selected) at every velocity
        self.write(reg::TPWMTHRS, 0)?;
        self.write(reg::PWMCONF, registers::pwmconf(self.family))?;
        self.write(self.family.coolconf_address(), registers::coolconf())?;

        debug!(
            "tmc init: {} registers written",
            self.shadow.len() as u32
        );
        Ok(())
    }

    fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn validate_parameters(&self, settings: &DriverSettings) -> Result<(), ConfigError> {
        if Self::family_for(settings)? != self.family {
            return Err(ConfigError::WrongInterface(settings.model));
        }
        settings.validate()
    }

    fn set_parameters(&mut self, settings: DriverSettings) -> Result<(), ConfigError> {
        self.validate_parameters(&settings)?;
        self.settings = settings;
        Ok(())
    }

    fn mode_microstep_tracking(&mut self) -> Result<(), Self::Error> {
        let code = self
            .settings
            .microstep_code()
            .ok_or(ConfigError::UnsupportedMicrosteps(self.settings.microsteps))?;
        self.write_microsteps(code)?;
        self.write_currents(self.settings.run_current_ma())
    }

    fn mode_microstep_slewing(&mut self) -> Result<(), Self::Error> {
        let code = match self.settings.microsteps_slewing {
            Some(microsteps) => self
                .settings
                .microstep_code_slewing()
                .ok_or(ConfigError::UnsupportedMicrosteps(microsteps))?,
            None => self
                .settings
                .microstep_code()
                .ok_or(ConfigError::UnsupportedMicrosteps(self.settings.microsteps))?,
        };
        self.write_microsteps(code)?;
        self.write_currents(self.settings.goto_current_ma())
    }

    fn mode_decay_tracking(&mut self) -> Result<(), Self::Error> {
        self.write_decay(self.settings.decay)
    }

    fn mode_decay_slewing(&mut self) -> Result<(), Self::Error> {
        self.write_decay(self.settings.decay_slewing)
    }

    fn update_status(&mut self) {
        self.status = match self.transport.read_register(reg::DRV_STATUS) {
            Ok(read) => self.decode_status(read.value, read.status),
            Err(_) => {
                warn!("tmc status read failed");
                DriverStatus::failsafe()
            }
        };
    }

    fn get_status(&self) -> DriverStatus {
        self.status
    }

    fn power(&mut self, on: bool) {
        if let Some(enable) = self.enable.as_mut() {
            enable.set_state(!on);
        }
        self.powered = on;
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    /// stealthChop automatic tuning
    ///
    /// Holds the motor at run current for the tuning interval so the chip
    /// can measure the coil resistance, then restores the hold current.
    fn calibrate_driver(&mut self) -> Result<(), Self::Error> {
        if self.settings.decay != Decay::StealthChop {
            return Ok(());
        }

        let irun = self.current_scale(self.settings.run_current_ma())?;
        let was_powered = self.powered;
        self.power(true);

        let result = self
            .write(reg::IHOLD_IRUN, registers::ihold_irun(irun, irun))
            .and_then(|()| {
                self.transport.pause_ms(CALIBRATION_MS);
                self.write_currents(self.settings.run_current_ma())
            });

        self.power(was_powered);
        result
    }
}
