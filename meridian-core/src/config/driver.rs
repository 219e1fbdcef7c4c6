//! Stepper driver configuration
//!
//! Per-axis driver settings in human units (microsteps, milliamps, decay
//! mode) and the rules that decide whether a driver model can realize
//! them. Settings are validated as a whole before any driver applies them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::microsteps::{self, MICROSTEP_COUNTS};

/// Driver chip model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DriverModel {
    /// Allegro A4988 (MS1-MS3 pins)
    A4988,
    /// TI DRV8825 (MODE0-MODE2 pins)
    Drv8825,
    /// S109 carrier board
    S109,
    /// ON Semi LV8729
    Lv8729,
    /// RAPS128 carrier board
    Raps128,
    /// TMC2100 in standalone mode
    Tmc2100,
    /// TMC2208 in standalone mode (MS1/MS2 pins)
    Tmc2208,
    /// TMC2209 in standalone mode (MS1/MS2 pins)
    Tmc2209,
    /// ST Micro ST820
    St820,
    /// TMC2130 over SPI
    Tmc2130,
    /// TMC5160 over SPI
    Tmc5160,
    /// TMC2209 over single-wire UART
    Tmc2209Uart,
    /// TMC2226 over single-wire UART
    Tmc2226Uart,
}

/// How a driver model is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverInterface {
    /// Microstep code on M0-M2 GPIO lines, decay on one GPIO
    Pins,
    /// TMC register protocol over SPI
    Spi,
    /// TMC register protocol over addressed UART
    Uart,
}

impl DriverModel {
    /// Every supported model
    pub const ALL: [DriverModel; 13] = [
        DriverModel::A4988,
        DriverModel::Drv8825,
        DriverModel::S109,
        DriverModel::Lv8729,
        DriverModel::Raps128,
        DriverModel::Tmc2100,
        DriverModel::Tmc2208,
        DriverModel::Tmc2209,
        DriverModel::St820,
        DriverModel::Tmc2130,
        DriverModel::Tmc5160,
        DriverModel::Tmc2209Uart,
        DriverModel::Tmc2226Uart,
    ];

    /// Configuration interface for this model
    pub fn interface(self) -> DriverInterface {
        match self {
            DriverModel::Tmc2130 | DriverModel::Tmc5160 => DriverInterface::Spi,
            DriverModel::Tmc2209Uart | DriverModel::Tmc2226Uart => DriverInterface::Uart,
            _ => DriverInterface::Pins,
        }
    }

    /// Model is configured through TMC registers (SPI or UART)
    pub fn is_tmc_register(self) -> bool {
        self.interface() != DriverInterface::Pins
    }

    /// Model can change microstep resolution while powered
    ///
    /// The TMC2100 samples its CFG pins only at power-up.
    pub fn can_switch_modes(self) -> bool {
        !matches!(self, DriverModel::Tmc2100)
    }

    /// Sense resistor in milliohms, for models with register current control
    pub fn rsense_milliohms(self) -> Option<u32> {
        match self {
            // 0.11 ohm board resistor plus 20 mohm of internal/trace resistance
            DriverModel::Tmc2130 | DriverModel::Tmc2209Uart | DriverModel::Tmc2226Uart => {
                Some(130)
            }
            DriverModel::Tmc5160 => Some(75),
            _ => None,
        }
    }

    /// Highest current the model is rated for, in mA
    ///
    /// `None` for models whose current is set by a reference resistor.
    pub fn max_current_ma(self) -> Option<u16> {
        match self {
            DriverModel::Tmc2130 => Some(1500),
            DriverModel::Tmc5160 => Some(3000),
            DriverModel::Tmc2209Uart | DriverModel::Tmc2226Uart => Some(2000),
            _ => None,
        }
    }

    /// Check whether the model implements a decay mode
    pub fn supports_decay(self, decay: Decay) -> bool {
        if self.is_tmc_register() {
            matches!(decay, Decay::SpreadCycle | Decay::StealthChop)
        } else {
            matches!(decay, Decay::Mixed | Decay::Fast | Decay::Slow)
        }
    }

    /// Decay mode used when none is configured
    pub fn default_decay(self) -> Decay {
        if self.is_tmc_register() {
            Decay::SpreadCycle
        } else {
            Decay::Mixed
        }
    }
}

/// Chopper decay mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Decay {
    /// Mixed decay (simple drivers, decay pin left at board default)
    Mixed,
    /// Fast decay (decay pin high)
    Fast,
    /// Slow decay (decay pin low)
    Slow,
    /// TMC spreadCycle chopper
    SpreadCycle,
    /// TMC stealthChop voltage PWM mode
    StealthChop,
}

impl Decay {
    /// Numeric code used by the runtime parameter interface
    pub fn code(self) -> i32 {
        match self {
            Decay::Mixed => 1,
            Decay::Fast => 2,
            Decay::Slow => 3,
            Decay::SpreadCycle => 4,
            Decay::StealthChop => 5,
        }
    }

    /// Decode a runtime parameter value
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Decay::Mixed),
            2 => Some(Decay::Fast),
            3 => Some(Decay::Slow),
            4 => Some(Decay::SpreadCycle),
            5 => Some(Decay::StealthChop),
            _ => None,
        }
    }
}

/// Named driver parameters settable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisParameter {
    /// Tracking microsteps
    Microsteps,
    /// Slewing microsteps (0 = no mode switching)
    MicrostepsSlewing,
    /// Hold current in mA (0 = off)
    CurrentHold,
    /// Run current in mA (0 = off)
    CurrentRun,
    /// Slewing run current in mA (0 = off)
    CurrentGoto,
    /// Tracking decay mode code
    Decay,
    /// Slewing decay mode code
    DecaySlewing,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Model has no code for this microstep count
    UnsupportedMicrosteps(u16),
    /// Slewing microsteps finer than tracking microsteps
    SlewingFinerThanTracking,
    /// Current above the model maximum
    CurrentTooHigh { requested_ma: u16, max_ma: u16 },
    /// Model current is fixed by hardware
    CurrentNotSupported,
    /// Model does not implement this decay mode
    UnsupportedDecay(Decay),
    /// Runtime parameter value outside its bounds
    ParameterOutOfRange(AxisParameter),
    /// Driver implementation does not handle this model
    WrongInterface(DriverModel),
    /// Negative backlash amount
    InvalidBacklash,
    /// Backlash take-up rate not a positive finite frequency
    InvalidBacklashFrequency,
}

/// Run current applied to TMC drivers when none is configured
pub const DEFAULT_RUN_CURRENT_MA: u16 = 300;

/// Per-axis driver settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverSettings {
    /// Driver chip model
    pub model: DriverModel,
    /// Microsteps while tracking
    pub microsteps: u16,
    /// Microsteps while slewing (None = stay at tracking resolution)
    pub microsteps_slewing: Option<u16>,
    /// Standstill current in mA (None = half of run current)
    pub current_hold: Option<u16>,
    /// Tracking current in mA
    pub current_run: Option<u16>,
    /// Slewing current in mA (None = same as run current)
    pub current_goto: Option<u16>,
    /// Decay mode while tracking
    pub decay: Decay,
    /// Decay mode while slewing
    pub decay_slewing: Decay,
}

impl DriverSettings {
    /// Settings with model defaults: 16x microstepping, no mode switching
    pub fn new(model: DriverModel) -> Self {
        Self {
            model,
            microsteps: 16,
            microsteps_slewing: None,
            current_hold: None,
            current_run: None,
            current_goto: None,
            decay: model.default_decay(),
            decay_slewing: model.default_decay(),
        }
    }

    /// Check the settings against the model's capabilities
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = self.model;

        if !microsteps::is_supported(model, self.microsteps) {
            return Err(ConfigError::UnsupportedMicrosteps(self.microsteps));
        }

        if let Some(slewing) = self.microsteps_slewing {
            if !microsteps::is_supported(model, slewing) {
                return Err(ConfigError::UnsupportedMicrosteps(slewing));
            }
            if slewing > self.microsteps {
                return Err(ConfigError::SlewingFinerThanTracking);
            }
        }

        for current in [self.current_hold, self.current_run, self.current_goto]
            .into_iter()
            .flatten()
        {
            match model.max_current_ma() {
                None => return Err(ConfigError::CurrentNotSupported),
                Some(max_ma) if current > max_ma => {
                    return Err(ConfigError::CurrentTooHigh {
                        requested_ma: current,
                        max_ma,
                    })
                }
                Some(_) => {}
            }
        }

        for decay in [self.decay, self.decay_slewing] {
            if !model.supports_decay(decay) {
                return Err(ConfigError::UnsupportedDecay(decay));
            }
        }

        Ok(())
    }

    /// Tracking microstep code, `None` if the model cannot do it
    pub fn microstep_code(&self) -> Option<u8> {
        microsteps::subdivisions_to_code(self.model, self.microsteps)
    }

    /// Slewing microstep code, `None` if unset or unsupported
    pub fn microstep_code_slewing(&self) -> Option<u8> {
        microsteps::subdivisions_to_code(self.model, self.microsteps_slewing?)
    }

    /// Tracking:slewing microstep ratio
    ///
    /// 1 when no slewing resolution is configured or switching is impossible.
    pub fn microstep_ratio(&self) -> u16 {
        match self.microsteps_slewing {
            Some(slewing)
                if self.model.can_switch_modes() && slewing > 0 && slewing < self.microsteps =>
            {
                self.microsteps / slewing
            }
            _ => 1,
        }
    }

    /// Effective run current in mA (register-current models only)
    pub fn run_current_ma(&self) -> u16 {
        self.current_run.unwrap_or(DEFAULT_RUN_CURRENT_MA)
    }

    /// Effective hold current in mA, defaulting to half the run current
    pub fn hold_current_ma(&self) -> u16 {
        self.current_hold.unwrap_or(self.run_current_ma() / 2)
    }

    /// Effective slewing current in mA, defaulting to the run current
    pub fn goto_current_ma(&self) -> u16 {
        self.current_goto.unwrap_or(self.run_current_ma())
    }

    /// Bounds of a runtime parameter as (min, max)
    pub fn parameter_range(&self, parameter: AxisParameter) -> (i32, i32) {
        let max_current = self.model.max_current_ma().unwrap_or(0) as i32;
        let finest = MICROSTEP_COUNTS[MICROSTEP_COUNTS.len() - 1] as i32;
        match parameter {
            AxisParameter::Microsteps => (1, finest),
            AxisParameter::MicrostepsSlewing => (0, finest),
            AxisParameter::CurrentHold | AxisParameter::CurrentRun | AxisParameter::CurrentGoto => {
                (0, max_current)
            }
            AxisParameter::Decay | AxisParameter::DecaySlewing => {
                (Decay::Mixed.code(), Decay::StealthChop.code())
            }
        }
    }

    /// Read a runtime parameter (0 encodes an unset value)
    pub fn get_parameter(&self, parameter: AxisParameter) -> i32 {
        let unset = |value: Option<u16>| value.map(i32::from).unwrap_or(0);
        match parameter {
            AxisParameter::Microsteps => self.microsteps as i32,
            AxisParameter::MicrostepsSlewing => unset(self.microsteps_slewing),
            AxisParameter::CurrentHold => unset(self.current_hold),
            AxisParameter::CurrentRun => unset(self.current_run),
            AxisParameter::CurrentGoto => unset(self.current_goto),
            AxisParameter::Decay => self.decay.code(),
            AxisParameter::DecaySlewing => self.decay_slewing.code(),
        }
    }

    /// Change one runtime parameter
    ///
    /// The value is bounds-checked, then the resulting settings are
    /// validated as a whole. On error the settings are left untouched.
    pub fn set_parameter(&mut self, parameter: AxisParameter, value: i32) -> Result<(), ConfigError> {
        let (min, max) = self.parameter_range(parameter);
        if value < min || value > max {
            return Err(ConfigError::ParameterOutOfRange(parameter));
        }

        let optional = |value: i32| if value == 0 { None } else { Some(value as u16) };
        let decay = |value: i32| Decay::from_code(value).ok_or(ConfigError::ParameterOutOfRange(parameter));

        let mut candidate = *self;
        match parameter {
            AxisParameter::Microsteps => candidate.microsteps = value as u16,
            AxisParameter::MicrostepsSlewing => candidate.microsteps_slewing = optional(value),
            AxisParameter::CurrentHold => candidate.current_hold = optional(value),
            AxisParameter::CurrentRun => candidate.current_run = optional(value),
            AxisParameter::CurrentGoto => candidate.current_goto = optional(value),
            AxisParameter::Decay => candidate.decay = decay(value)?,
            AxisParameter::DecaySlewing => candidate.decay_slewing = decay(value)?,
        }

        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::new(DriverModel::Tmc2209Uart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmc_settings() -> DriverSettings {
        DriverSettings {
            microsteps: 64,
            microsteps_slewing: Some(8),
            current_run: Some(800),
            ..DriverSettings::new(DriverModel::Tmc2130)
        }
    }

    #[test]
    fn test_valid_tmc_settings() {
        let settings = tmc_settings();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.microstep_ratio(), 8);
        assert_eq!(settings.microstep_code(), Some(2));
        assert_eq!(settings.microstep_code_slewing(), Some(5));
    }

    #[test]
    fn test_slewing_must_be_coarser() {
        let settings = DriverSettings {
            microsteps_slewing: Some(128),
            ..tmc_settings()
        };
        assert_eq!(settings.validate(), Err(ConfigError::SlewingFinerThanTracking));

        let equal = DriverSettings {
            microsteps_slewing: Some(64),
            ..tmc_settings()
        };
        assert_eq!(equal.validate(), Ok(()));
        assert_eq!(equal.microstep_ratio(), 1);
    }

    #[test]
    fn test_unsupported_microsteps() {
        let settings = DriverSettings {
            microsteps: 32,
            ..DriverSettings::new(DriverModel::A4988)
        };
        assert_eq!(settings.validate(), Err(ConfigError::UnsupportedMicrosteps(32)));

        let odd = DriverSettings {
            microsteps: 12,
            ..tmc_settings()
        };
        assert_eq!(odd.validate(), Err(ConfigError::UnsupportedMicrosteps(12)));
    }

    #[test]
    fn test_current_limits() {
        let too_high = DriverSettings {
            current_goto: Some(1600),
            ..tmc_settings()
        };
        assert_eq!(
            too_high.validate(),
            Err(ConfigError::CurrentTooHigh {
                requested_ma: 1600,
                max_ma: 1500
            })
        );

        let pins = DriverSettings {
            current_run: Some(500),
            ..DriverSettings::new(DriverModel::Drv8825)
        };
        assert_eq!(pins.validate(), Err(ConfigError::CurrentNotSupported));
    }

    #[test]
    fn test_decay_support() {
        let settings = DriverSettings {
            decay: Decay::Fast,
            ..tmc_settings()
        };
        assert_eq!(settings.validate(), Err(ConfigError::UnsupportedDecay(Decay::Fast)));

        let pins = DriverSettings {
            decay_slewing: Decay::StealthChop,
            ..DriverSettings::new(DriverModel::A4988)
        };
        assert_eq!(
            pins.validate(),
            Err(ConfigError::UnsupportedDecay(Decay::StealthChop))
        );
    }

    #[test]
    fn test_current_defaults() {
        let settings = tmc_settings();
        assert_eq!(settings.run_current_ma(), 800);
        assert_eq!(settings.hold_current_ma(), 400);
        assert_eq!(settings.goto_current_ma(), 800);

        let unset = DriverSettings::new(DriverModel::Tmc5160);
        assert_eq!(unset.run_current_ma(), DEFAULT_RUN_CURRENT_MA);
    }

    #[test]
    fn test_ratio_without_switching_support() {
        let settings = DriverSettings {
            microsteps: 16,
            microsteps_slewing: Some(2),
            ..DriverSettings::new(DriverModel::Tmc2100)
        };
        assert_eq!(settings.microstep_ratio(), 1);
    }

    #[test]
    fn test_set_parameter() {
        let mut settings = tmc_settings();

        assert_eq!(settings.set_parameter(AxisParameter::CurrentRun, 1000), Ok(()));
        assert_eq!(settings.get_parameter(AxisParameter::CurrentRun), 1000);

        assert_eq!(settings.set_parameter(AxisParameter::CurrentHold, 0), Ok(()));
        assert_eq!(settings.current_hold, None);

        assert_eq!(
            settings.set_parameter(AxisParameter::Decay, Decay::StealthChop.code()),
            Ok(())
        );
        assert_eq!(settings.decay, Decay::StealthChop);
    }

    #[test]
    fn test_set_parameter_rejects_and_keeps_settings() {
        let mut settings = tmc_settings();
        let before = settings;

        assert_eq!(
            settings.set_parameter(AxisParameter::CurrentRun, 5000),
            Err(ConfigError::ParameterOutOfRange(AxisParameter::CurrentRun))
        );
        assert_eq!(
            settings.set_parameter(AxisParameter::MicrostepsSlewing, 256),
            Err(ConfigError::SlewingFinerThanTracking)
        );
        assert_eq!(
            settings.set_parameter(AxisParameter::Decay, Decay::Slow.code()),
            Err(ConfigError::UnsupportedDecay(Decay::Slow))
        );
        assert_eq!(settings, before);
    }

    #[test]
    fn test_decay_codes() {
        for decay in [
            Decay::Mixed,
            Decay::Fast,
            Decay::Slow,
            Decay::SpreadCycle,
            Decay::StealthChop,
        ] {
            assert_eq!(Decay::from_code(decay.code()), Some(decay));
        }
        assert_eq!(Decay::from_code(0), None);
    }
}
