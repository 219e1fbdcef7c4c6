//! GPIO pin abstractions
//!
//! Step/dir drivers are almost entirely GPIO: step, direction, enable,
//! the M0-M2 microstep mode lines, the decay line and the fault input.

/// Digital output pin
///
/// Writes are infallible; chip HALs that can fail must handle it internally.
pub trait OutputPin {
    /// Drive the pin high (logic 1)
    fn set_high(&mut self);

    /// Drive the pin low (logic 0)
    fn set_low(&mut self);

    /// Drive the pin to a level
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Last level written to the pin
    fn is_set_high(&self) -> bool;
}

/// Digital input pin
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}
