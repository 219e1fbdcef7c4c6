//! Step sequencer
//!
//! Position bookkeeping for one axis and the tick handler that moves the
//! motor one step (or one slewing step) toward its target per timer tick.
//!
//! All counters are in tracking microsteps:
//!
//! - `motor` is where the motor is, excluding backlash
//! - `target` is where the control loop wants it
//! - `index` maps motor steps to the instrument coordinate
//! - `backlash` is how far into the backlash travel the gears are,
//!   `0..=backlash_amount`
//!
//! The physically commanded position is `motor + backlash`, which changes by
//! at most one step per standard tick. The sequencer itself is plain data;
//! [`MotorState`](super::MotorState) puts it behind a critical-section mutex.

use meridian_hal::timer::SUB_MICROS_PER_MICRO;

use super::mode::{MicrostepMode, ModeSwitchRequest};
use crate::config::StepWaveform;
use crate::traits::Direction;

/// Longest step period the timer can represent, in microseconds
///
/// 130 s at 16 sub-micros per micro is just under 2^31 timer units.
pub const MAX_PERIOD_US: f32 = 130_000_000.0;

/// Step line activity for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepEdge {
    /// Leave the step line alone
    None,
    /// Emit one complete pulse
    Pulse,
    /// Square wave: drive the step line high
    Rise,
    /// Square wave: drive the step line low
    Fall,
}

/// Tick handler variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickHandler {
    /// One microstep per tick, with backlash and direction handling
    Standard,
    /// One slewing step (`home_steps` microsteps) per tick
    Fast,
}

/// What the timer interrupt must do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickAction {
    /// New direction pin level (already corrected for reversal), written
    /// before the step edge
    pub direction: Option<Direction>,
    /// Step line activity
    pub step: StepEdge,
    /// Period until the next tick in sub-microseconds, 0 to stop the timer
    pub period: u32,
    /// Work to hand to the main loop
    pub request: Option<ModeSwitchRequest>,
}

/// Nearest multiple of `4 * modulo`, minus `2 * modulo`
///
/// Park positions are placed on this grid so the motor is de-energized at a
/// fixed electrical phase. Results outside the `i32` range wrap like the
/// position counters do.
pub fn park_offset(offset: i32, modulo: i32) -> i32 {
    let modulo = i64::from(modulo.max(1));
    let span = 4 * modulo;
    let snapped = (i64::from(offset) + span / 2).div_euclid(span) * span - 2 * modulo;
    snapped as i32
}

fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Position counters and tick handler for one axis
#[derive(Debug, Clone)]
pub struct StepSequencer {
    motor: i32,
    target: i32,
    index: i32,
    origin: i32,
    backlash: i32,
    backlash_amount: i32,
    /// (backlash, backlash_amount) folded away by `disable_backlash`
    backlash_saved: Option<(i32, i32)>,
    in_backlash: bool,
    synchronized: bool,

    /// Logical direction last written to the direction pin
    direction: Option<Direction>,
    reverse: bool,
    /// Target advance per tick while synchronized
    step: i32,
    /// Step restored after a direction change pause
    armed_step: i32,

    frequency: f32,
    period: u32,
    backlash_frequency: f32,
    backlash_period: u32,
    waveform: StepWaveform,
    /// Square wave: step line is high, next tick is a falling half
    step_high: bool,

    handler: TickHandler,
    home_steps: i32,
    mode: MicrostepMode,
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepSequencer {
    /// Stopped sequencer at position zero
    pub const fn new() -> Self {
        Self {
            motor: 0,
            target: 0,
            index: 0,
            origin: 0,
            backlash: 0,
            backlash_amount: 0,
            backlash_saved: None,
            in_backlash: false,
            synchronized: true,
            direction: None,
            reverse: false,
            step: 0,
            armed_step: 0,
            frequency: 0.0,
            period: 0,
            backlash_frequency: 0.0,
            backlash_period: 0,
            waveform: StepWaveform::Pulse,
            step_high: false,
            handler: TickHandler::Standard,
            home_steps: 1,
            mode: MicrostepMode::Tracking,
        }
    }

    // ---- frequency and timing -------------------------------------------

    /// Set the signed step rate in steps/s
    ///
    /// Positive moves forward, negative backward, zero stops. Rates whose
    /// period would exceed [`MAX_PERIOD_US`] (or are not finite) also stop.
    /// Returns the period to program into the timer now.
    pub fn set_frequency(&mut self, frequency: f32) -> u32 {
        let new_step = match self.period_for(frequency, true) {
            Some(period) => {
                self.frequency = frequency;
                self.period = period;
                if frequency > 0.0 {
                    1
                } else {
                    -1
                }
            }
            None => {
                self.frequency = 0.0;
                self.period = 0;
                0
            }
        };

        self.armed_step = new_step;
        let reversing = match (Direction::of(new_step as i64), self.direction) {
            (Some(new), Some(latched)) => new != latched,
            _ => false,
        };
        // Hold the target for one tick so the direction pin settles first
        self.step = if reversing { 0 } else { new_step };

        self.next_period()
    }

    /// Signed step rate last accepted (0 when stopped or clamped)
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Step rate used while taking up backlash (0 = same as motion rate)
    ///
    /// Returns the period to program into the timer now.
    pub fn set_backlash_frequency(&mut self, frequency: f32) -> u32 {
        match self.period_for(frequency, false) {
            Some(period) => {
                self.backlash_frequency = frequency;
                self.backlash_period = period;
            }
            None => {
                self.backlash_frequency = 0.0;
                self.backlash_period = 0;
            }
        }
        self.next_period()
    }

    /// Select pulse or square-wave stepping
    pub fn set_waveform(&mut self, waveform: StepWaveform) -> u32 {
        self.waveform = waveform;
        self.step_high = false;
        self.refresh_periods()
    }

    /// Period of the next tick in sub-microseconds (0 = stopped)
    pub fn next_period(&self) -> u32 {
        if self.period == 0 {
            0
        } else if self.in_backlash && self.backlash_period > 0 {
            self.backlash_period
        } else {
            self.period
        }
    }

    fn period_for(&self, frequency: f32, motion: bool) -> Option<u32> {
        if !frequency.is_finite() || frequency == 0.0 {
            return None;
        }
        let magnitude = if frequency < 0.0 { -frequency } else { frequency };
        let period_us = 1_000_000.0 / magnitude;
        if !period_us.is_finite() || period_us > MAX_PERIOD_US {
            return None;
        }

        let mut sub_micros = period_us * SUB_MICROS_PER_MICRO as f32;
        if motion && self.handler == TickHandler::Fast {
            sub_micros *= self.home_steps as f32;
        }
        if self.waveform == StepWaveform::Square {
            sub_micros /= 2.0;
        }
        // Saturating float-to-int cast
        Some(((sub_micros + 0.5) as u32).max(1))
    }

    fn refresh_periods(&mut self) -> u32 {
        self.period = self.period_for(self.frequency, true).unwrap_or(0);
        self.backlash_period = self.period_for(self.backlash_frequency, false).unwrap_or(0);
        self.next_period()
    }

    // ---- tick handlers ---------------------------------------------------

    /// Run one timer tick
    pub fn tick(&mut self) -> TickAction {
        if self.step_high {
            self.step_high = false;
            return TickAction {
                direction: None,
                step: StepEdge::Fall,
                period: self.next_period(),
                request: None,
            };
        }

        match self.handler {
            TickHandler::Standard => self.standard_tick(),
            TickHandler::Fast => self.fast_tick(),
        }
    }

    fn standard_tick(&mut self) -> TickAction {
        let mut action = TickAction {
            direction: None,
            step: StepEdge::None,
            period: 0,
            request: None,
        };

        match self.mode {
            MicrostepMode::TrackingReady => self.mode = MicrostepMode::Tracking,
            MicrostepMode::SlewingRequest
                if !self.in_backlash && self.is_aligned() && self.heading_settled() =>
            {
                self.mode = MicrostepMode::SlewingPause;
                action.request = Some(ModeSwitchRequest::EnterSlewing);
                return self.finish(action);
            }
            mode if mode.holds_position(false) => return self.finish(action),
            _ => {}
        }

        if self.synchronized && !self.in_backlash {
            self.target = self.target.wrapping_add(self.step);
        }

        if self.motor > self.target {
            action.direction = self.latch(Direction::Reverse);
            if self.backlash > 0 {
                self.backlash -= 1;
                self.in_backlash = true;
            } else {
                self.motor -= 1;
                self.in_backlash = false;
            }
            action.step = self.step_edge();
        } else if self.motor < self.target {
            action.direction = self.latch(Direction::Forward);
            if self.backlash < self.backlash_amount {
                self.backlash += 1;
                self.in_backlash = true;
            } else {
                self.motor += 1;
                self.in_backlash = false;
            }
            action.step = self.step_edge();
        } else {
            self.in_backlash = false;
        }

        self.finish(action)
    }

    fn fast_tick(&mut self) -> TickAction {
        let mut action = TickAction {
            direction: None,
            step: StepEdge::None,
            period: 0,
            request: None,
        };

        if self.mode == MicrostepMode::SlewingReady {
            self.mode = MicrostepMode::Slewing;
        }

        let size = self.home_steps;
        if self.synchronized {
            self.target = self.target.wrapping_add(self.step.wrapping_mul(size));
        }

        // The pin and the backlash are only correct for the latched
        // direction. Travel the other way waits for the standard handler.
        let distance = self.distance();
        let heading = Direction::of(distance);
        if let Some(direction) = heading.filter(|&d| Some(d) == self.direction) {
            if distance.abs() >= i64::from(size) {
                self.motor = self.motor.wrapping_add(direction.sign() * size);
                action.step = self.step_edge();
            }
        }

        self.finish(action)
    }

    fn finish(&mut self, mut action: TickAction) -> TickAction {
        self.step = self.armed_step;
        action.period = self.next_period();
        action
    }

    fn step_edge(&mut self) -> StepEdge {
        match self.waveform {
            StepWaveform::Pulse => StepEdge::Pulse,
            StepWaveform::Square => {
                self.step_high = true;
                StepEdge::Rise
            }
        }
    }

    /// Latch a logical direction, returning the pin level if it changed
    fn latch(&mut self, direction: Direction) -> Option<Direction> {
        if self.direction == Some(direction) {
            return None;
        }
        self.direction = Some(direction);
        Some(self.pin_direction(direction))
    }

    fn pin_direction(&self, direction: Direction) -> Direction {
        if self.reverse {
            direction.opposite()
        } else {
            direction
        }
    }

    // ---- mode switching --------------------------------------------------

    /// Tracking:slewing microstep ratio used as the fast step size
    pub fn set_home_steps(&mut self, home_steps: u16) {
        self.home_steps = i32::from(home_steps.max(1));
    }

    /// Tracking:slewing microstep ratio
    pub fn home_steps(&self) -> i32 {
        self.home_steps
    }

    /// Commanded position sits on a whole slewing step
    pub fn is_aligned(&self) -> bool {
        (i64::from(self.motor) + i64::from(self.backlash)).rem_euclid(i64::from(self.home_steps))
            == 0
    }

    /// Latched direction points at the target, or the axis is on target
    fn heading_settled(&self) -> bool {
        match Direction::of(self.distance()) {
            None => true,
            heading => heading == self.direction,
        }
    }

    fn distance(&self) -> i64 {
        i64::from(self.target) - i64::from(self.motor)
    }

    /// Current mode-control state
    pub fn mode(&self) -> MicrostepMode {
        self.mode
    }

    /// Installed tick handler
    pub fn handler(&self) -> TickHandler {
        self.handler
    }

    /// Ask the tick handler to stop on the next aligned position
    ///
    /// Returns false (and changes nothing) if the ratio is 1 or the axis is
    /// already on its way to slewing.
    pub fn request_slewing(&mut self) -> bool {
        if self.home_steps <= 1 {
            return false;
        }
        match self.mode {
            MicrostepMode::Tracking | MicrostepMode::TrackingReady => {
                self.mode = MicrostepMode::SlewingRequest;
                true
            }
            _ => false,
        }
    }

    /// Drop a pending slewing request and resume tracking
    pub fn cancel_slewing(&mut self) {
        if matches!(
            self.mode,
            MicrostepMode::SlewingRequest | MicrostepMode::SlewingPause
        ) {
            self.mode = MicrostepMode::Tracking;
        }
    }

    /// Install the fast handler after the driver switched to slewing
    ///
    /// Only legal from an aligned [`MicrostepMode::SlewingPause`]. Returns
    /// the period to program, `None` if the state changed meanwhile.
    pub fn install_fast_handler(&mut self) -> Option<u32> {
        if self.mode != MicrostepMode::SlewingPause || !self.is_aligned() {
            return None;
        }
        self.handler = TickHandler::Fast;
        self.mode = MicrostepMode::SlewingReady;
        Some(self.refresh_periods())
    }

    /// Swap back to the standard handler, holding until tracking resumes
    ///
    /// Returns the period to program, `None` if the axis was not slewing.
    pub fn install_standard_handler(&mut self) -> Option<u32> {
        if !self.mode.uses_fast_handler() {
            return None;
        }
        self.handler = TickHandler::Standard;
        Some(self.refresh_periods())
    }

    /// Release the hold after the driver switched back to tracking
    pub fn finish_tracking(&mut self) -> u32 {
        if self.handler == TickHandler::Standard && self.mode.uses_fast_handler() {
            self.mode = MicrostepMode::TrackingReady;
        }
        self.next_period()
    }

    // ---- positions ---------------------------------------------------------

    /// Set motor, target and origin to `value`, clearing backlash and index
    pub fn reset_position(&mut self, value: i32) {
        self.motor = value;
        self.target = value;
        self.origin = value;
        self.backlash = 0;
        self.index = 0;
        self.in_backlash = false;
        if let Some((_, amount)) = self.backlash_saved {
            self.backlash_saved = Some((0, amount));
        }
    }

    /// Motor position in steps, excluding backlash
    pub fn motor_position(&self) -> i32 {
        self.motor
    }

    /// Externally visible axis position
    pub fn instrument_coordinate(&self) -> i32 {
        self.motor.wrapping_add(self.index)
    }

    /// Offset the index so the instrument coordinate reads `value`
    pub fn set_instrument_coordinate(&mut self, value: i32) {
        self.index = value.wrapping_sub(self.motor);
    }

    /// Like [`set_instrument_coordinate`](Self::set_instrument_coordinate)
    /// with the index snapped to the park grid
    pub fn set_instrument_coordinate_park(&mut self, value: i32, modulo: i32) {
        self.index = park_offset(value.wrapping_sub(self.motor), modulo);
    }

    /// Target in instrument coordinates
    pub fn target_coordinate(&self) -> i32 {
        self.target.wrapping_add(self.index)
    }

    /// Move the target to an instrument coordinate
    pub fn set_target_coordinate(&mut self, value: i32) {
        self.target = value.wrapping_sub(self.index);
    }

    /// Like [`set_target_coordinate`](Self::set_target_coordinate) with the
    /// target snapped to the park grid
    pub fn set_target_coordinate_park(&mut self, value: i32, modulo: i32) {
        self.target = park_offset(value.wrapping_sub(self.index), modulo);
    }

    /// Index offset between motor steps and instrument coordinate
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Record the current motor position as the start of a slew
    pub fn mark_origin(&mut self) {
        self.origin = self.motor;
    }

    /// Set the slew start point in instrument coordinates
    pub fn set_origin_coordinate(&mut self, value: i32) {
        self.origin = value.wrapping_sub(self.index);
    }

    /// Steps left to the target, saturating at `i32::MAX`
    pub fn target_distance(&self) -> i32 {
        saturate(self.distance().abs())
    }

    /// Distance to whichever of slew start and target is nearer
    pub fn origin_or_target_distance(&self) -> i32 {
        let from_origin = saturate((i64::from(self.motor) - i64::from(self.origin)).abs());
        from_origin.min(self.target_distance())
    }

    /// Direction toward the target, `None` when on target
    pub fn ramp_direction(&self) -> Option<Direction> {
        Direction::of(self.distance())
    }

    /// Logical direction last latched by the tick handler
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Let the target follow the step rate
    ///
    /// Enabling snaps the target to the motor so a stale target cannot cause
    /// a jump.
    pub fn set_synchronized(&mut self, synchronized: bool) {
        if synchronized {
            self.target = self.motor;
        }
        self.synchronized = synchronized;
    }

    /// Target follows the step rate
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Invert the direction pin
    ///
    /// The latch is cleared so the next step rewrites the pin.
    pub fn set_reverse(&mut self, reverse: bool) {
        if reverse != self.reverse {
            self.reverse = reverse;
            self.direction = None;
        }
    }

    // ---- backlash ----------------------------------------------------------

    /// Steps currently inside the backlash travel
    pub fn backlash(&self) -> i32 {
        self.backlash
    }

    /// Configured backlash travel
    pub fn backlash_amount(&self) -> i32 {
        match self.backlash_saved {
            Some((_, amount)) => amount,
            None => self.backlash_amount,
        }
    }

    /// Change the backlash travel, clamping the current backlash into range
    pub fn set_backlash_amount(&mut self, amount: i32) {
        let amount = amount.max(0);
        match &mut self.backlash_saved {
            Some((steps, saved)) => {
                *saved = amount;
                *steps = (*steps).min(amount);
            }
            None => {
                self.backlash_amount = amount;
                self.backlash = self.backlash.min(amount);
            }
        }
    }

    /// Fold the backlash into the motor position and stop compensating
    ///
    /// Must be paired with [`enable_backlash`](Self::enable_backlash).
    pub fn disable_backlash(&mut self) {
        if self.backlash_saved.is_some() {
            return;
        }
        self.backlash_saved = Some((self.backlash, self.backlash_amount));
        self.motor = self.motor.wrapping_add(self.backlash);
        self.target = self.target.wrapping_add(self.backlash);
        self.backlash = 0;
        self.backlash_amount = 0;
        self.in_backlash = false;
    }

    /// Undo [`disable_backlash`](Self::disable_backlash)
    pub fn enable_backlash(&mut self) {
        if let Some((steps, amount)) = self.backlash_saved.take() {
            self.motor = self.motor.wrapping_sub(steps);
            self.target = self.target.wrapping_sub(steps);
            self.backlash = steps;
            self.backlash_amount = amount;
        }
    }
}
