//! Bit-banged SPI master
//!
//! Some boards route the driver SPI lines to pins without a hardware SPI
//! peripheral. This clocks SPI mode 3 (clock idle high, data changed on the
//! falling edge and sampled on the rising edge), MSB first.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use meridian_hal::{InputPin, OutputPin, SpiBus};

/// Software SPI over three GPIOs
pub struct SoftSpi<MOSI, SCK, MISO, D> {
    mosi: MOSI,
    sck: SCK,
    miso: MISO,
    delay: D,
    half_period_ns: u32,
}

impl<MOSI, SCK, MISO, D> SoftSpi<MOSI, SCK, MISO, D>
where
    MOSI: OutputPin,
    SCK: OutputPin,
    MISO: InputPin,
    D: DelayNs,
{
    /// Create a bus clocking at roughly `frequency` Hz
    pub fn new(mosi: MOSI, mut sck: SCK, miso: MISO, delay: D, frequency: u32) -> Self {
        sck.set_high();
        let half_period_ns = 500_000_000 / frequency.max(1);
        Self {
            mosi,
            sck,
            miso,
            delay,
            half_period_ns,
        }
    }

    pub fn release(self) -> (MOSI, SCK, MISO, D) {
        (self.mosi, self.sck, self.miso, self.delay)
    }

    fn transfer_byte(&mut self, out: u8) -> u8 {
        let mut input = 0u8;
        for bit in (0..8).rev() {
            self.sck.set_low();
            self.mosi.set_state(out & (1 << bit) != 0);
            self.delay.delay_ns(self.half_period_ns);

            self.sck.set_high();
            if self.miso.is_high() {
                input |= 1 << bit;
            }
            self.delay.delay_ns(self.half_period_ns);
        }
        input
    }
}

impl<MOSI, SCK, MISO, D> SpiBus for SoftSpi<MOSI, SCK, MISO, D>
where
    MOSI: OutputPin,
    SCK: OutputPin,
    MISO: InputPin,
    D: DelayNs,
{
    type Error = Infallible;

    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), Infallible> {
        for byte in data.iter_mut() {
            *byte = self.transfer_byte(*byte);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Infallible> {
        for &byte in data {
            self.transfer_byte(byte);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Shared line state seen by all three mock pins
    #[derive(Default)]
    struct Wire {
        sck: bool,
        mosi: bool,
        /// MOSI level at each rising clock edge
        latched: Vec<bool>,
        /// Levels the slave drives, one per bit
        miso: VecDeque<bool>,
        mosi_changed_while_high: bool,
    }

    type Shared = Rc<RefCell<Wire>>;

    struct Mosi(Shared);
    struct Sck(Shared);
    struct Miso(Shared);

    impl OutputPin for Mosi {
        fn set_high(&mut self) {
            self.set_level(true);
        }

        fn set_low(&mut self) {
            self.set_level(false);
        }

        fn is_set_high(&self) -> bool {
            self.0.borrow().mosi
        }
    }

    impl Mosi {
        fn set_level(&mut self, level: bool) {
            let mut wire = self.0.borrow_mut();
            if wire.sck && wire.mosi != level {
                wire.mosi_changed_while_high = true;
            }
            wire.mosi = level;
        }
    }

    impl OutputPin for Sck {
        fn set_high(&mut self) {
            let mut wire = self.0.borrow_mut();
            if !wire.sck {
                let mosi = wire.mosi;
                wire.latched.push(mosi);
            }
            wire.sck = true;
        }

        fn set_low(&mut self) {
            self.0.borrow_mut().sck = false;
        }

        fn is_set_high(&self) -> bool {
            self.0.borrow().sck
        }
    }

    impl InputPin for Miso {
        fn is_high(&self) -> bool {
            self.0.borrow_mut().miso.pop_front().unwrap_or(false)
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn bits(byte: u8) -> Vec<bool> {
        (0..8).rev().map(|bit| byte & (1 << bit) != 0).collect()
    }

    fn bus(wire: &Shared) -> SoftSpi<Mosi, Sck, Miso, NoDelay> {
        SoftSpi::new(
            Mosi(wire.clone()),
            Sck(wire.clone()),
            Miso(wire.clone()),
            NoDelay,
            1_000_000,
        )
    }

    #[test]
    fn test_clock_idles_high() {
        let wire = Shared::default();
        let mut spi = bus(&wire);
        assert!(wire.borrow().sck);

        spi.write(&[0x00]).unwrap();
        assert!(wire.borrow().sck);
    }

    #[test]
    fn test_msb_first_on_rising_edge() {
        let wire = Shared::default();
        let mut spi = bus(&wire);
        spi.write(&[0xA5, 0x0F]).unwrap();

        let wire = wire.borrow();
        let mut expected = bits(0xA5);
        expected.extend(bits(0x0F));
        assert_eq!(wire.latched, expected);
        assert!(!wire.mosi_changed_while_high);
    }

    #[test]
    fn test_transfer_reads_miso() {
        let wire = Shared::default();
        wire.borrow_mut().miso.extend(bits(0x3C));
        wire.borrow_mut().miso.extend(bits(0x81));
        let mut spi = bus(&wire);

        let mut data = [0xEC, 0x00];
        spi.transfer_in_place(&mut data).unwrap();
        assert_eq!(data, [0x3C, 0x81]);
        assert_eq!(wire.borrow().latched.len(), 16);
    }
}
