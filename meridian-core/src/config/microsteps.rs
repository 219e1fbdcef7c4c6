//! Microstep code lookup
//!
//! Converts a microstep count (1, 2, 4 ... 256) into the code a given
//! driver model expects: the 3-bit M0/M1/M2 pattern for step/dir chips,
//! or the CHOPCONF.MRES field for TMC register-protocol chips.
//!
//! A missing code means the model cannot run at that resolution. The
//! lookup returns `None` in that case and never a placeholder value.

use super::driver::DriverModel;

/// Microstep counts every table is indexed by, finest last
pub const MICROSTEP_COUNTS: [u16; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

/// Largest code any table can contain (MRES = 8 selects full steps)
pub const MAX_CODE: u8 = 8;

const OFF: Option<u8> = None;

//                                      1x        2x        4x        8x       16x       32x       64x      128x      256x
const A4988_CODES: [Option<u8>; 9] = [Some(0), Some(1), Some(2), Some(3), Some(7), OFF, OFF, OFF, OFF];
const DRV8825_CODES: [Option<u8>; 9] = [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), OFF, OFF, OFF];
const S109_CODES: [Option<u8>; 9] = [OFF, Some(1), Some(2), OFF, Some(3), Some(7), OFF, OFF, OFF];
const LV8729_CODES: [Option<u8>; 9] = [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(7), OFF];
const RAPS128_CODES: [Option<u8>; 9] = [Some(0), Some(1), Some(2), Some(3), Some(7), Some(6), Some(5), Some(4), OFF];
const TMC2100_CODES: [Option<u8>; 9] = [Some(0), Some(1), OFF, OFF, Some(3), OFF, OFF, OFF, OFF];
const TMC2208_CODES: [Option<u8>; 9] = [OFF, Some(1), Some(2), Some(0), Some(3), OFF, OFF, OFF, OFF];
const TMC2209_CODES: [Option<u8>; 9] = [OFF, OFF, OFF, Some(0), Some(3), Some(1), Some(2), OFF, OFF];
const ST820_CODES: [Option<u8>; 9] = [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), OFF, Some(6), Some(7)];

/// Index of a microstep count in [`MICROSTEP_COUNTS`]
///
/// Only exact powers of two from 1 to 256 have an index.
pub fn microstep_index(microsteps: u16) -> Option<usize> {
    if microsteps == 0 || !microsteps.is_power_of_two() || microsteps > 256 {
        return None;
    }
    Some(microsteps.trailing_zeros() as usize)
}

/// Convert a microstep count to the model-specific code
///
/// Returns `None` when the model has no code for this count, including
/// counts that are not a power of two.
pub fn subdivisions_to_code(model: DriverModel, microsteps: u16) -> Option<u8> {
    let index = microstep_index(microsteps)?;

    match model {
        DriverModel::A4988 => A4988_CODES[index],
        DriverModel::Drv8825 => DRV8825_CODES[index],
        DriverModel::S109 => S109_CODES[index],
        DriverModel::Lv8729 => LV8729_CODES[index],
        DriverModel::Raps128 => RAPS128_CODES[index],
        DriverModel::Tmc2100 => TMC2100_CODES[index],
        DriverModel::Tmc2208 => TMC2208_CODES[index],
        DriverModel::Tmc2209 => TMC2209_CODES[index],
        DriverModel::St820 => ST820_CODES[index],
        // MRES counts down from 256x (0) to full step (8)
        DriverModel::Tmc2130
        | DriverModel::Tmc5160
        | DriverModel::Tmc2209Uart
        | DriverModel::Tmc2226Uart => Some(MAX_CODE - index as u8),
    }
}

/// Check whether a model has a code for the given microstep count
pub fn is_supported(model: DriverModel, microsteps: u16) -> bool {
    subdivisions_to_code(model, microsteps).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_microstep_index() {
        assert_eq!(microstep_index(1), Some(0));
        assert_eq!(microstep_index(16), Some(4));
        assert_eq!(microstep_index(256), Some(8));
        assert_eq!(microstep_index(0), None);
        assert_eq!(microstep_index(3), None);
        assert_eq!(microstep_index(512), None);
    }

    #[test]
    fn test_tmc_mres_codes() {
        for model in [DriverModel::Tmc2130, DriverModel::Tmc5160, DriverModel::Tmc2209Uart] {
            assert_eq!(subdivisions_to_code(model, 256), Some(0));
            assert_eq!(subdivisions_to_code(model, 16), Some(4));
            assert_eq!(subdivisions_to_code(model, 1), Some(8));
        }
    }

    #[test]
    fn test_step_dir_codes() {
        assert_eq!(subdivisions_to_code(DriverModel::A4988, 16), Some(7));
        assert_eq!(subdivisions_to_code(DriverModel::A4988, 32), None);
        assert_eq!(subdivisions_to_code(DriverModel::Drv8825, 32), Some(5));
        assert_eq!(subdivisions_to_code(DriverModel::Tmc2209, 64), Some(2));
        assert_eq!(subdivisions_to_code(DriverModel::Tmc2209, 4), None);
    }

    #[test]
    fn test_pin_codes_fit_three_bits() {
        for model in DriverModel::ALL {
            if model.is_tmc_register() {
                continue;
            }
            for microsteps in MICROSTEP_COUNTS {
                if let Some(code) = subdivisions_to_code(model, microsteps) {
                    assert!(code <= 0b111, "{:?} {}x -> {}", model, microsteps, code);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn code_is_valid_or_unsupported(model_index in 0usize..DriverModel::ALL.len(), microsteps in 0u16..=1024) {
            let model = DriverModel::ALL[model_index];
            match subdivisions_to_code(model, microsteps) {
                Some(code) => {
                    prop_assert!(code <= MAX_CODE);
                    prop_assert!(MICROSTEP_COUNTS.contains(&microsteps));
                }
                None => prop_assert!(!is_supported(model, microsteps)),
            }
        }
    }
}
