//! Step tick timer abstraction
//!
//! Each axis owns one hardware timer whose interrupt runs the step
//! sequencer. Periods are expressed in sub-microseconds (1/16 µs) so slow
//! tracking rates keep their fractional precision.

/// Number of timer sub-microsecond units per microsecond
pub const SUB_MICROS_PER_MICRO: u32 = 16;

/// Hardware timer that invokes the step tick handler
pub trait StepTimer {
    /// Program the tick period in sub-microseconds
    ///
    /// A period of zero stops the timer. A running timer picks up the new
    /// period at its next expiry; a stopped timer is restarted.
    fn set_period(&mut self, sub_micros: u32);

    /// Currently programmed period in sub-microseconds (0 when stopped)
    fn period(&self) -> u32;
}
