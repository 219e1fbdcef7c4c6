//! Step tick alarms
//!
//! The RP2040 timer counts microseconds and has four compare alarms.
//! embassy-time owns alarm 0; each axis takes one of the others. Periods
//! arrive in sub-microseconds and the fraction is carried from tick to
//! tick, so slow tracking rates do not drift.
//!
//! Targets are advanced from the previous target, not from "now", which
//! keeps interrupt latency from accumulating into the step rate.

use embassy_rp::pac;
use meridian_hal::timer::{StepTimer, SUB_MICROS_PER_MICRO};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Alarm used by the embassy-time driver
pub const TIME_DRIVER_ALARM: usize = 0;

/// Smallest distance into the future an alarm is armed at
const MIN_LEAD_US: u32 = 2;

/// Split a sub-microsecond period into whole microseconds plus the carry
fn split_period(carry: u32, period: u32) -> (u32, u32) {
    let total = carry + period;
    (total / SUB_MICROS_PER_MICRO, total % SUB_MICROS_PER_MICRO)
}

/// `target` is too close to `now` (or already behind it) to arm
fn is_late(target: u32, now: u32) -> bool {
    (target.wrapping_sub(now) as i32) < MIN_LEAD_US as i32
}

fn now_us() -> u32 {
    pac::TIMER.timerawl().read()
}

/// One hardware alarm pacing an axis tick interrupt
///
/// Lives in a `static`; the interrupt handler calls [`acknowledge`] and
/// [`rearm`], the axis task reaches it through an [`AlarmTimer`].
///
/// [`acknowledge`]: StepAlarm::acknowledge
/// [`rearm`]: StepAlarm::rearm
pub struct StepAlarm {
    alarm: usize,
    period: AtomicU32,
    target: AtomicU32,
    carry: AtomicU32,
    running: AtomicBool,
}

impl StepAlarm {
    /// Alarm `alarm` (1 to 3)
    pub const fn new(alarm: usize) -> Self {
        Self {
            alarm,
            period: AtomicU32::new(0),
            target: AtomicU32::new(0),
            carry: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn alarm(&self) -> usize {
        self.alarm
    }

    /// Handle implementing [`StepTimer`] for the axis motor
    pub fn timer(&'static self) -> AlarmTimer {
        AlarmTimer { alarm: self }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Clear the alarm's interrupt flag; call first thing in the handler
    pub fn acknowledge(&self) {
        pac::TIMER.intr().write(|w| w.set_alarm(self.alarm, true));
    }

    /// Schedule the next tick `period` sub-microseconds after the last one
    ///
    /// Called from the interrupt handler with the period the tick returned.
    /// Zero stops the alarm. Does nothing if the alarm was stopped while the
    /// tick ran.
    pub fn rearm(&self, period: u32) {
        critical_section::with(|_| {
            if !self.is_running() {
                return;
            }
            if period == 0 {
                self.stop();
                return;
            }
            self.period.store(period, Ordering::Relaxed);
            let base = self.target.load(Ordering::Relaxed);
            self.schedule(base, period);
        });
    }

    fn start(&self, period: u32) {
        self.period.store(period, Ordering::Relaxed);
        self.carry.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);

        pac::TIMER.intr().write(|w| w.set_alarm(self.alarm, true));
        pac::TIMER.inte().modify(|w| w.set_alarm(self.alarm, true));
        self.schedule(now_us(), period);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.period.store(0, Ordering::Relaxed);
        pac::TIMER.inte().modify(|w| w.set_alarm(self.alarm, false));
    }

    fn schedule(&self, base: u32, period: u32) {
        let (micros, carry) = split_period(self.carry.load(Ordering::Relaxed), period);
        self.carry.store(carry, Ordering::Relaxed);

        let mut target = base.wrapping_add(micros);
        let now = now_us();
        if is_late(target, now) {
            target = now.wrapping_add(MIN_LEAD_US);
        }
        self.target.store(target, Ordering::Relaxed);
        pac::TIMER.alarm(self.alarm).write_value(target);
    }
}

/// [`StepTimer`] handle onto a static [`StepAlarm`]
#[derive(Clone, Copy)]
pub struct AlarmTimer {
    alarm: &'static StepAlarm,
}

impl StepTimer for AlarmTimer {
    fn set_period(&mut self, sub_micros: u32) {
        critical_section::with(|_| {
            if sub_micros == 0 {
                if self.alarm.is_running() {
                    self.alarm.stop();
                }
            } else if self.alarm.is_running() {
                // Picked up by the next rearm
                self.alarm.period.store(sub_micros, Ordering::Relaxed);
            } else {
                self.alarm.start(sub_micros);
            }
        });
    }

    fn period(&self) -> u32 {
        self.alarm.period.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_period_carries_fraction() {
        // 62.5 µs: alternates 62 and 63
        let (first, carry) = split_period(0, 1000);
        assert_eq!((first, carry), (62, 8));
        let (second, carry) = split_period(carry, 1000);
        assert_eq!((second, carry), (63, 0));
    }

    #[test]
    fn test_is_late_handles_wrap() {
        assert!(!is_late(100, 50));
        assert!(is_late(50, 100));
        assert!(is_late(101, 100));
        assert!(!is_late(5, u32::MAX - 5));
    }
}
