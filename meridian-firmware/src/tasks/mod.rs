//! Embassy async tasks and interrupt glue

pub mod axis;
pub mod tick;

pub use axis::{axis_task, AxisMotor};
pub use tick::StepLines;
