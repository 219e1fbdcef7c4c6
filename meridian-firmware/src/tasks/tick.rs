//! Step tick interrupt glue
//!
//! Each axis alarm interrupt runs one sequencer tick and drives the step
//! and direction lines from the resulting action. Nothing here awaits;
//! mode-switch work is handed to the axis task through the motor state's
//! request signal.

use core::cell::RefCell;

use embassy_rp::gpio::Output;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use meridian_core::motion::{MotorState, StepEdge, TickAction};
use meridian_core::traits::Direction;
use meridian_hal_rp2040::StepAlarm;

/// Step pulse width at 125 MHz (2 µs, enough for DRV8825)
const PULSE_CYCLES: u32 = 250;

/// Direction setup time before a step edge (~650 ns)
const DIR_SETUP_CYCLES: u32 = 82;

/// Step and direction outputs of one axis
pub struct StepLines {
    step: Output<'static>,
    dir: Output<'static>,
}

impl StepLines {
    pub fn new(step: Output<'static>, dir: Output<'static>) -> Self {
        Self { step, dir }
    }

    fn apply(&mut self, action: &TickAction) {
        if let Some(direction) = action.direction {
            let forward = direction == Direction::Forward;
            if self.dir.is_set_high() != forward {
                self.dir.set_level(forward.into());
                cortex_m::asm::delay(DIR_SETUP_CYCLES);
            }
        }

        match action.step {
            StepEdge::None => {}
            StepEdge::Pulse => {
                self.step.set_high();
                cortex_m::asm::delay(PULSE_CYCLES);
                self.step.set_low();
            }
            StepEdge::Rise => self.step.set_high(),
            StepEdge::Fall => self.step.set_low(),
        }
    }
}

/// Everything the alarm interrupt of one axis touches
pub struct Axis {
    pub state: MotorState,
    pub alarm: StepAlarm,
    lines: Mutex<CriticalSectionRawMutex, RefCell<Option<StepLines>>>,
}

impl Axis {
    pub const fn new(alarm: usize) -> Self {
        Self {
            state: MotorState::new(),
            alarm: StepAlarm::new(alarm),
            lines: Mutex::new(RefCell::new(None)),
        }
    }

    /// Hand the step lines to the interrupt
    pub fn attach(&self, lines: StepLines) {
        self.lines.lock(|cell| *cell.borrow_mut() = Some(lines));
    }

    /// Alarm interrupt body
    pub fn on_alarm(&self) {
        self.alarm.acknowledge();
        let action = self.state.tick();
        self.lines.lock(|cell| {
            if let Some(lines) = cell.borrow_mut().as_mut() {
                lines.apply(&action);
            }
        });
        self.alarm.rearm(action.period);
    }
}
