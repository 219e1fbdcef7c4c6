//! Current scale conversion
//!
//! The TMC current scale registers take a 5-bit value `CS` such that the RMS
//! coil current is `(CS + 1) / 32 * Ifs` with `Ifs = 0.325 V / Rsense`.

use meridian_core::config::DriverModel;

/// Sense voltage of the internal reference in microvolts
const VSENSE_UV: u32 = 325_000;

/// Largest current scale value
pub const CS_MAX: u8 = 31;

/// Convert a current in mA to a current scale value for the given sense resistor
///
/// `round(mA * Rsense * 32 / 0.325) - 1`, clamped to `[0, 31]`.
pub fn current_to_cs(current_ma: u16, rsense_milliohms: u32) -> u8 {
    let scaled = current_ma as u32 * rsense_milliohms * 32;
    let cs = ((scaled + VSENSE_UV / 2) / VSENSE_UV).saturating_sub(1);
    cs.min(CS_MAX as u32) as u8
}

/// Current scale value for a driver model's sense resistor
///
/// `None` for models without register current control.
pub fn model_current_to_cs(model: DriverModel, current_ma: u16) -> Option<u8> {
    Some(current_to_cs(current_ma, model.rsense_milliohms()?))
}
