//! Hardware abstraction traits
//!
//! These traits define the interface between the motion logic and
//! driver-chip implementations.

pub mod stepper;

pub use stepper::{Direction, DriverStatus, OutputStatus, StepperDriver};
