//! Axis motion
//!
//! Step sequencing with backlash compensation, microstep mode switching
//! and the step/dir motor that ties them to a driver and a timer.

pub mod mode;
pub mod motor;
pub mod sequencer;

pub use mode::{MicrostepMode, ModeSwitchRequest};
pub use motor::{MotorError, MotorState, StepDirMotor};
pub use sequencer::{park_offset, StepEdge, StepSequencer, TickAction, TickHandler, MAX_PERIOD_US};
