//! Per-axis motion configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::driver::{ConfigError, DriverSettings};

/// Shape of the step signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StepWaveform {
    /// One short pulse per tick, the timer runs at the step rate
    #[default]
    Pulse,
    /// 50% duty square wave, the timer runs at twice the step rate
    Square,
}

/// Motion settings for one mount axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisConfig {
    /// Driver chip settings
    pub driver: DriverSettings,
    /// Backlash travel in (tracking) steps
    pub backlash_steps: i32,
    /// Step rate used while taking up backlash, in steps/s
    pub backlash_frequency: f32,
    /// Invert the direction pin
    pub reverse: bool,
    /// Step signal shape
    pub waveform: StepWaveform,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            driver: DriverSettings::default(),
            backlash_steps: 0,
            backlash_frequency: 500.0,
            reverse: false,
            waveform: StepWaveform::Pulse,
        }
    }
}

impl AxisConfig {
    /// Validate the axis and its driver settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlash_steps < 0 {
            return Err(ConfigError::InvalidBacklash);
        }
        if !self.backlash_frequency.is_finite() || self.backlash_frequency <= 0.0 {
            return Err(ConfigError::InvalidBacklashFrequency);
        }
        self.driver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(AxisConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_backlash() {
        let config = AxisConfig {
            backlash_steps: -1,
            ..AxisConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBacklash));

        let config = AxisConfig {
            backlash_frequency: f32::NAN,
            ..AxisConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBacklashFrequency));
    }
}
