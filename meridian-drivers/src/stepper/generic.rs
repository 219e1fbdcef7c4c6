//! Generic step/dir carriers
//!
//! A4988, DRV8825, LV8729 and similar boards select their microstep mode
//! through three mode pins and their decay through one more. Current is set
//! by the board's reference trimmer and cannot be changed from here.

use core::convert::Infallible;

use meridian_core::config::{ConfigError, Decay, DriverInterface, DriverSettings};
use meridian_core::traits::{DriverStatus, StepperDriver};
use meridian_hal::{InputPin, OutputPin};

use crate::error::DriverError;

/// Pins of a generic driver; every one is optional
pub struct GenericPins<P, F> {
    pub m0: Option<P>,
    pub m1: Option<P>,
    pub m2: Option<P>,
    pub decay: Option<P>,
    pub enable: Option<P>,
    /// Level that turns the power stage on (low on most carriers)
    pub enable_active_high: bool,
    pub fault: Option<F>,
    /// Level the fault output shows while faulted
    pub fault_active_high: bool,
}

impl<P, F> Default for GenericPins<P, F> {
    fn default() -> Self {
        Self {
            m0: None,
            m1: None,
            m2: None,
            decay: None,
            enable: None,
            enable_active_high: false,
            fault: None,
            fault_active_high: false,
        }
    }
}

/// Pin-configured stepper driver
pub struct GenericDriver<P, F> {
    pins: GenericPins<P, F>,
    settings: DriverSettings,
    /// Decay pin level the board came up with, used for mixed decay
    decay_default: bool,
    status: DriverStatus,
    powered: bool,
}

impl<P: OutputPin, F: InputPin> GenericDriver<P, F> {
    pub fn new(pins: GenericPins<P, F>, settings: DriverSettings) -> Result<Self, ConfigError> {
        if settings.model.interface() != DriverInterface::Pins {
            return Err(ConfigError::WrongInterface(settings.model));
        }
        settings.validate()?;

        let decay_default = pins
            .decay
            .as_ref()
            .map(|pin| pin.is_set_high())
            .unwrap_or(false);

        let mut driver = Self {
            pins,
            settings,
            decay_default,
            status: DriverStatus::default(),
            powered: true,
        };
        driver.power(false);
        Ok(driver)
    }

    pub fn pins(&self) -> &GenericPins<P, F> {
        &self.pins
    }

    pub fn release(self) -> GenericPins<P, F> {
        self.pins
    }

    /// Every mode line whose level differs between the two codes is wired
    fn can_drive_codes(&self, tracking: u8, slewing: u8) -> bool {
        let lines = [&self.pins.m0, &self.pins.m1, &self.pins.m2];
        let differing = tracking ^ slewing;
        lines
            .iter()
            .enumerate()
            .all(|(bit, pin)| differing & (1 << bit) == 0 || pin.is_some())
    }

    fn write_code(&mut self, code: u8) {
        let lines = [&mut self.pins.m0, &mut self.pins.m1, &mut self.pins.m2];
        for (bit, pin) in lines.into_iter().enumerate() {
            if let Some(pin) = pin {
                pin.set_state(code & (1 << bit) != 0);
            }
        }
    }

    fn write_decay(&mut self, decay: Decay) -> Result<(), ConfigError> {
        let level = match decay {
            Decay::Fast => true,
            Decay::Slow => false,
            Decay::Mixed => self.decay_default,
            other => return Err(ConfigError::UnsupportedDecay(other)),
        };
        if let Some(pin) = self.pins.decay.as_mut() {
            pin.set_state(level);
        }
        Ok(())
    }
}

impl<P: OutputPin, F: InputPin> StepperDriver for GenericDriver<P, F> {
    type Error = DriverError<Infallible>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.power(false);
        self.mode_microstep_tracking()?;
        self.mode_decay_tracking()
    }

    fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn validate_parameters(&self, settings: &DriverSettings) -> Result<(), ConfigError> {
        if settings.model.interface() != DriverInterface::Pins {
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
        self.write_code(code);
        Ok(())
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
        self.write_code(code);
        Ok(())
    }

    fn mode_decay_tracking(&mut self) -> Result<(), Self::Error> {
        Ok(self.write_decay(self.settings.decay)?)
    }

    fn mode_decay_slewing(&mut self) -> Result<(), Self::Error> {
        Ok(self.write_decay(self.settings.decay_slewing)?)
    }

    fn update_status(&mut self) {
        self.status = match self.pins.fault.as_ref() {
            Some(pin) => DriverStatus {
                active: true,
                fault: pin.is_high() == self.pins.fault_active_high,
                ..DriverStatus::default()
            },
            None => DriverStatus::default(),
        };
    }

    fn get_status(&self) -> DriverStatus {
        self.status
    }

    fn power(&mut self, on: bool) {
        let level = on == self.pins.enable_active_high;
        if let Some(pin) = self.pins.enable.as_mut() {
            pin.set_state(level);
        }
        self.powered = on;
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    fn can_switch_modes(&self) -> bool {
        if !self.settings.model.can_switch_modes() || self.microstep_ratio() <= 1 {
            return false;
        }
        match (
            self.settings.microstep_code(),
            self.settings.microstep_code_slewing(),
        ) {
            (Some(tracking), Some(slewing)) => self.can_drive_codes(tracking, slewing),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::config::{AxisParameter, DriverModel};

    #[derive(Default, Debug)]
    struct Pin {
        high: bool,
    }

    impl OutputPin for Pin {
        fn set_high(&mut self) {
            self.high = true;
        }

        fn set_low(&mut self) {
            self.high = false;
        }

        fn is_set_high(&self) -> bool {
            self.high
        }
    }

    struct Fault {
        high: bool,
    }

    impl InputPin for Fault {
        fn is_high(&self) -> bool {
            self.high
        }
    }

    fn pins() -> GenericPins<Pin, Fault> {
        GenericPins {
            m0: Some(Pin::default()),
            m1: Some(Pin::default()),
            m2: Some(Pin::default()),
            decay: Some(Pin { high: true }),
            enable: Some(Pin::default()),
            ..GenericPins::default()
        }
    }

    fn code(driver: &GenericDriver<Pin, Fault>) -> u8 {
        let pins = driver.pins();
        [&pins.m0, &pins.m1, &pins.m2]
            .iter()
            .enumerate()
            .map(|(bit, pin)| (pin.as_ref().unwrap().high as u8) << bit)
            .sum()
    }

    fn drv8825() -> GenericDriver<Pin, Fault> {
        let settings = DriverSettings {
            microsteps: 32,
            microsteps_slewing: Some(4),
            decay: Decay::Slow,
            decay_slewing: Decay::Fast,
            ..DriverSettings::new(DriverModel::Drv8825)
        };
        GenericDriver::new(pins(), settings).unwrap()
    }

    #[test]
    fn test_rejects_register_models() {
        let result = GenericDriver::new(pins(), DriverSettings::new(DriverModel::Tmc2130));
        assert!(matches!(
            result,
            Err(ConfigError::WrongInterface(DriverModel::Tmc2130))
        ));
    }

    #[test]
    fn test_microstep_codes() {
        let mut driver = drv8825();
        driver.init().unwrap();
        // DRV8825 32x is code 5
        assert_eq!(code(&driver), 5);

        driver.mode_microstep_slewing().unwrap();
        assert_eq!(code(&driver), 2);

        driver.mode_microstep_tracking().unwrap();
        assert_eq!(code(&driver), 5);
    }

    #[test]
    fn test_decay_pin() {
        let mut driver = drv8825();
        driver.init().unwrap();
        assert!(!driver.pins().decay.as_ref().unwrap().high);

        driver.mode_decay_slewing().unwrap();
        assert!(driver.pins().decay.as_ref().unwrap().high);
    }

    #[test]
    fn test_mixed_decay_restores_board_level() {
        let settings = DriverSettings {
            decay: Decay::Slow,
            decay_slewing: Decay::Mixed,
            ..DriverSettings::new(DriverModel::A4988)
        };
        let mut driver = GenericDriver::new(pins(), settings).unwrap();
        driver.init().unwrap();
        assert!(!driver.pins().decay.as_ref().unwrap().high);

        driver.mode_decay_slewing().unwrap();
        assert!(driver.pins().decay.as_ref().unwrap().high);
    }

    #[test]
    fn test_enable_polarity() {
        let mut driver = drv8825();
        assert!(!driver.is_powered());
        assert!(driver.pins().enable.as_ref().unwrap().high);

        driver.power(true);
        assert!(driver.is_powered());
        assert!(!driver.pins().enable.as_ref().unwrap().high);

        let mut pins = pins();
        pins.enable_active_high = true;
        let mut driver = GenericDriver::new(pins, DriverSettings::new(DriverModel::A4988)).unwrap();
        driver.power(true);
        assert!(driver.pins().enable.as_ref().unwrap().high);
    }

    #[test]
    fn test_fault_pin() {
        let mut pins = pins();
        pins.fault = Some(Fault { high: false });
        let mut driver = GenericDriver::new(pins, DriverSettings::new(DriverModel::Drv8825)).unwrap();

        driver.update_status();
        let status = driver.get_status();
        assert!(status.active);
        assert!(status.fault);
        assert!(status.has_fault());
        assert!(!status.over_temperature);
    }

    #[test]
    fn test_no_fault_pin_is_inactive() {
        let mut driver = drv8825();
        driver.update_status();
        assert_eq!(driver.get_status(), DriverStatus::default());
        assert!(driver.calibrate_driver().is_ok());
    }

    #[test]
    fn test_tmc2100_cannot_switch() {
        let settings = DriverSettings {
            microsteps: 16,
            microsteps_slewing: Some(2),
            ..DriverSettings::new(DriverModel::Tmc2100)
        };
        let driver = GenericDriver::new(pins(), settings).unwrap();
        assert!(!driver.can_switch_modes());
        assert_eq!(driver.microstep_ratio(), 1);
    }

    #[test]
    fn test_switching_needs_mode_pins() {
        assert!(drv8825().can_switch_modes());

        // 32x and 4x differ on all three lines
        let settings = *drv8825().settings();
        let bare = GenericDriver::new(GenericPins::<Pin, Fault>::default(), settings).unwrap();
        assert!(!bare.can_switch_modes());

        let mut pins = pins();
        pins.m1 = None;
        let partial = GenericDriver::new(pins, settings).unwrap();
        assert!(!partial.can_switch_modes());
    }

    #[test]
    fn test_current_parameters_rejected() {
        let mut driver = drv8825();
        assert_eq!(
            driver.set_parameter(AxisParameter::CurrentRun, 500),
            Err(ConfigError::ParameterOutOfRange(AxisParameter::CurrentRun))
        );
        driver.set_parameter(AxisParameter::Microsteps, 16).unwrap();
        driver.mode_microstep_tracking().unwrap();
        assert_eq!(code(&driver), 4);
    }
}
