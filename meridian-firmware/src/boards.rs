//! Board definition
//!
//! Two TMC2209 axes on a Pico carrier board, each driver on its own UART
//! with TX and RX joined through 1k (single-wire, address 0). The pin
//! numbers here must match the peripherals taken in `main`.

use meridian_core::config::{
    AxisConfig, AxisPins, Decay, DriverBusPins, DriverModel, DriverSettings, PinConfig,
    StepWaveform, MAX_AXES,
};

/// Axis 0: right ascension / azimuth
pub const RA_PINS: AxisPins = AxisPins {
    step: PinConfig::new(11),
    dir: PinConfig::new(10),
    enable: Some(PinConfig::inverted(12)),
    fault: None,
    bus: DriverBusPins::Uart {
        tx: 0,
        rx: 1,
        address: 0,
    },
};

/// Axis 1: declination / altitude
pub const DEC_PINS: AxisPins = AxisPins {
    step: PinConfig::new(6),
    dir: PinConfig::new(7),
    enable: Some(PinConfig::inverted(13)),
    fault: None,
    bus: DriverBusPins::Uart {
        tx: 8,
        rx: 9,
        address: 0,
    },
};

pub const AXIS_PINS: [AxisPins; MAX_AXES] = [RA_PINS, DEC_PINS];

/// TMC UART baud rate
pub const DRIVER_BAUDRATE: u32 = 115_200;

/// Sidereal tracking rate of the RA axis in steps/s
///
/// 200-step motor, 64 microsteps, 144:1 worm and 3:1 belt reduction:
/// 5_529_600 steps per sidereal day of 86_164.09 s.
pub const SIDEREAL_RATE: f32 = 64.175_23;

/// Motion settings of an axis
pub fn axis_config(axis: usize) -> AxisConfig {
    let driver = DriverSettings {
        microsteps: 64,
        microsteps_slewing: Some(8),
        current_run: Some(600),
        current_goto: Some(900),
        decay: Decay::StealthChop,
        decay_slewing: Decay::SpreadCycle,
        ..DriverSettings::new(DriverModel::Tmc2209Uart)
    };

    AxisConfig {
        driver,
        // Dec gears carry more play than the RA worm
        backlash_steps: if axis == 0 { 64 } else { 256 },
        backlash_frequency: 2_000.0,
        reverse: axis == 1,
        waveform: StepWaveform::Pulse,
    }
}
