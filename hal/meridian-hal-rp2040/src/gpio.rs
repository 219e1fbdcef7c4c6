//! GPIO wrappers
//!
//! Step, direction, enable and the mode lines are plain push-pull outputs;
//! the fault line is an input with the pull the board config asks for.

use embassy_rp::gpio::{AnyPin, Input, Level, Output, Pull};
use embassy_rp::Peri;
use meridian_hal::{InputPin, OutputPin};

/// Push-pull output
pub struct RpOutput<'d>(Output<'d>);

impl<'d> RpOutput<'d> {
    pub fn new(pin: Peri<'d, AnyPin>, initial_high: bool) -> Self {
        Self(Output::new(pin, Level::from(initial_high)))
    }

    pub fn inner(&mut self) -> &mut Output<'d> {
        &mut self.0
    }
}

impl From<Output<'_>> for RpOutput<'_> {
    fn from(output: Output<'_>) -> Self {
        Self(output)
    }
}

impl OutputPin for RpOutput<'_> {
    #[inline]
    fn set_high(&mut self) {
        self.0.set_high();
    }

    #[inline]
    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}

/// Digital input
pub struct RpInput<'d>(Input<'d>);

impl<'d> RpInput<'d> {
    pub fn new(pin: Peri<'d, AnyPin>, pull_up: bool) -> Self {
        let pull = if pull_up { Pull::Up } else { Pull::None };
        Self(Input::new(pin, pull))
    }
}

impl InputPin for RpInput<'_> {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}
