//! Configuration types
//!
//! Board-agnostic axis and driver configuration with validation.

pub mod axis;
pub mod driver;
pub mod hardware;
pub mod microsteps;

pub use axis::*;
pub use driver::*;
pub use hardware::*;
pub use microsteps::{is_supported, subdivisions_to_code, MICROSTEP_COUNTS};
