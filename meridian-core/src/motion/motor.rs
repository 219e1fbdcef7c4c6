//! Step/dir motor
//!
//! [`MotorState`] is the part of an axis shared between the timer interrupt
//! and the main loop: the [`StepSequencer`] behind a critical-section mutex
//! plus the single-slot mode-switch signal. It is `Sync` and const
//! constructible so it can live in a `static`.
//!
//! [`StepDirMotor`] is the main-loop side. It owns the stepper driver and a
//! handle to the axis timer, and performs everything that needs bus I/O:
//! mode switches, parameter changes and status polling.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use meridian_hal::StepTimer;

use super::mode::{MicrostepMode, ModeSwitchRequest};
use super::sequencer::{StepSequencer, TickAction};
use crate::config::{AxisConfig, AxisParameter, ConfigError};
use crate::traits::{Direction, DriverStatus, StepperDriver};

/// Motor operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorError<E> {
    /// Rejected configuration
    Config(ConfigError),
    /// Driver bus or protocol failure
    Driver(E),
    /// Operation needs a stopped axis in tracking mode
    Busy,
    /// Motor is not initialized or not enabled
    Disabled,
}

impl<E> From<ConfigError> for MotorError<E> {
    fn from(err: ConfigError) -> Self {
        MotorError::Config(err)
    }
}

/// Axis state shared with the step timer interrupt
pub struct MotorState {
    sequencer: Mutex<CriticalSectionRawMutex, RefCell<StepSequencer>>,
    requests: Signal<CriticalSectionRawMutex, ModeSwitchRequest>,
}

impl Default for MotorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorState {
    pub const fn new() -> Self {
        Self {
            sequencer: Mutex::new(RefCell::new(StepSequencer::new())),
            requests: Signal::new(),
        }
    }

    /// Run one tick; called from the axis timer interrupt
    pub fn tick(&self) -> TickAction {
        let action = self.with(|seq| seq.tick());
        if let Some(request) = action.request {
            self.requests.signal(request);
        }
        action
    }

    /// Run `f` on the sequencer inside a critical section
    pub fn with<R>(&self, f: impl FnOnce(&mut StepSequencer) -> R) -> R {
        self.sequencer.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Wait for the tick handler to ask for a mode switch
    pub async fn wait_request(&self) -> ModeSwitchRequest {
        self.requests.wait().await
    }

    pub fn reset_position(&self, value: i32) {
        self.with(|seq| seq.reset_position(value))
    }

    pub fn motor_position(&self) -> i32 {
        self.with(|seq| seq.motor_position())
    }

    pub fn instrument_coordinate(&self) -> i32 {
        self.with(|seq| seq.instrument_coordinate())
    }

    pub fn set_instrument_coordinate(&self, value: i32) {
        self.with(|seq| seq.set_instrument_coordinate(value))
    }

    pub fn set_instrument_coordinate_park(&self, value: i32, modulo: i32) {
        self.with(|seq| seq.set_instrument_coordinate_park(value, modulo))
    }

    pub fn target_coordinate(&self) -> i32 {
        self.with(|seq| seq.target_coordinate())
    }

    pub fn set_target_coordinate(&self, value: i32) {
        self.with(|seq| seq.set_target_coordinate(value))
    }

    pub fn set_target_coordinate_park(&self, value: i32, modulo: i32) {
        self.with(|seq| seq.set_target_coordinate_park(value, modulo))
    }

    pub fn mark_origin(&self) {
        self.with(|seq| seq.mark_origin())
    }

    pub fn set_origin_coordinate(&self, value: i32) {
        self.with(|seq| seq.set_origin_coordinate(value))
    }

    pub fn backlash(&self) -> i32 {
        self.with(|seq| seq.backlash())
    }

    pub fn backlash_amount(&self) -> i32 {
        self.with(|seq| seq.backlash_amount())
    }

    pub fn set_backlash_amount(&self, amount: i32) {
        self.with(|seq| seq.set_backlash_amount(amount))
    }

    pub fn disable_backlash(&self) {
        self.with(|seq| seq.disable_backlash())
    }

    pub fn enable_backlash(&self) {
        self.with(|seq| seq.enable_backlash())
    }

    pub fn target_distance(&self) -> i32 {
        self.with(|seq| seq.target_distance())
    }

    pub fn origin_or_target_distance(&self) -> i32 {
        self.with(|seq| seq.origin_or_target_distance())
    }

    pub fn ramp_direction(&self) -> Option<Direction> {
        self.with(|seq| seq.ramp_direction())
    }

    pub fn direction(&self) -> Option<Direction> {
        self.with(|seq| seq.direction())
    }

    pub fn set_synchronized(&self, synchronized: bool) {
        self.with(|seq| seq.set_synchronized(synchronized))
    }

    pub fn frequency(&self) -> f32 {
        self.with(|seq| seq.frequency())
    }

    pub fn mode(&self) -> MicrostepMode {
        self.with(|seq| seq.mode())
    }
}

/// Main-loop side of a step/dir axis
pub struct StepDirMotor<'a, D: StepperDriver, T: StepTimer> {
    state: &'a MotorState,
    driver: D,
    timer: T,
    ready: bool,
    enabled: bool,
}

impl<'a, D: StepperDriver, T: StepTimer> StepDirMotor<'a, D, T> {
    pub fn new(state: &'a MotorState, driver: D, timer: T) -> Self {
        Self {
            state,
            driver,
            timer,
            ready: false,
            enabled: false,
        }
    }

    /// Validate and apply the axis configuration, then initialize the driver
    ///
    /// A motor whose configuration was rejected never arms motion.
    pub fn init(&mut self, config: &AxisConfig) -> Result<(), MotorError<D::Error>> {
        self.ready = false;
        config.validate()?;
        self.driver.validate_parameters(&config.driver)?;
        self.driver.set_parameters(config.driver)?;
        self.driver.init().map_err(MotorError::Driver)?;

        let home_steps = self.home_steps();
        self.state.with(|seq| {
            seq.set_backlash_amount(config.backlash_steps);
            seq.set_backlash_frequency(config.backlash_frequency);
            seq.set_reverse(config.reverse);
            seq.set_waveform(config.waveform);
            seq.set_home_steps(home_steps);
        });

        self.ready = true;
        debug!("motor ready, home steps {}", home_steps);
        Ok(())
    }

    fn home_steps(&self) -> u16 {
        if self.driver.can_switch_modes() {
            self.driver.microstep_ratio()
        } else {
            1
        }
    }

    /// Shared state, for position access from other tasks
    pub fn state(&self) -> &'a MotorState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Power the driver stage
    ///
    /// Disabling also stops motion.
    pub fn enable(&mut self, on: bool) -> Result<(), MotorError<D::Error>> {
        if on && !self.ready {
            return Err(MotorError::Disabled);
        }
        if !on {
            let period = self.state.with(|seq| seq.set_frequency(0.0));
            self.timer.set_period(period);
        }
        self.driver.power(on);
        self.enabled = on;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the signed step rate in steps/s (0 stops)
    pub fn set_frequency(&mut self, frequency: f32) -> Result<(), MotorError<D::Error>> {
        if frequency != 0.0 && !self.enabled {
            return Err(MotorError::Disabled);
        }
        let period = self.state.with(|seq| seq.set_frequency(frequency));
        self.timer.set_period(period);
        Ok(())
    }

    /// Signed step rate last accepted
    pub fn frequency(&self) -> f32 {
        self.state.frequency()
    }

    /// Step rate while taking up backlash
    pub fn set_backlash_frequency(&mut self, frequency: f32) -> Result<(), MotorError<D::Error>> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(MotorError::Config(ConfigError::InvalidBacklashFrequency));
        }
        let period = self.state.with(|seq| seq.set_backlash_frequency(frequency));
        if self.timer.period() != 0 {
            self.timer.set_period(period);
        }
        Ok(())
    }

    pub fn set_reverse(&mut self, reverse: bool) {
        self.state.with(|seq| seq.set_reverse(reverse))
    }

    /// Tracking:slewing microstep ratio
    pub fn microstep_ratio(&self) -> u16 {
        self.driver.microstep_ratio()
    }

    /// Request slewing (`true`) or tracking (`false`) resolution
    ///
    /// Entering slewing only arms the request; the switch happens once the
    /// tick handler parks on an aligned position and
    /// [`handle_mode_switch`](Self::handle_mode_switch) runs. Leaving slewing
    /// reconfigures the driver right away. Drivers that cannot switch ignore
    /// both.
    pub fn set_slewing(&mut self, slewing: bool) -> Result<(), MotorError<D::Error>> {
        if !self.driver.can_switch_modes() {
            return Ok(());
        }

        if slewing {
            if self.state.with(|seq| seq.request_slewing()) {
                debug!("slewing requested");
            }
            return Ok(());
        }

        match self.state.mode() {
            MicrostepMode::SlewingRequest | MicrostepMode::SlewingPause => {
                self.state.with(|seq| seq.cancel_slewing());
                self.state.requests.reset();
                Ok(())
            }
            MicrostepMode::SlewingReady | MicrostepMode::Slewing => {
                if let Some(period) = self.state.with(|seq| seq.install_standard_handler()) {
                    self.timer.set_period(period);
                }
                let result = self.configure_tracking();
                let period = self.state.with(|seq| seq.finish_tracking());
                self.timer.set_period(period);
                debug!("back to tracking resolution");
                result.map_err(MotorError::Driver)
            }
            _ => Ok(()),
        }
    }

    /// Handle a pending mode-switch request without waiting
    pub fn poll_mode_switch(&mut self) -> Result<bool, MotorError<D::Error>> {
        match self.state.requests.try_take() {
            Some(request) => self.handle_mode_switch(request),
            None => Ok(false),
        }
    }

    /// Reconfigure the driver for a request raised by the tick handler
    ///
    /// Returns true if the fast handler was installed. On driver failure the
    /// axis falls back to tracking. If the driver cannot be restored to
    /// tracking resolution either, the axis is stopped and stays disabled
    /// until the next [`init`](Self::init).
    pub fn handle_mode_switch(
        &mut self,
        request: ModeSwitchRequest,
    ) -> Result<bool, MotorError<D::Error>> {
        match request {
            ModeSwitchRequest::EnterSlewing => {
                if self.state.mode() != MicrostepMode::SlewingPause {
                    return Ok(false);
                }

                let result = self
                    .driver
                    .mode_microstep_slewing()
                    .and_then(|()| self.driver.mode_decay_slewing());
                if let Err(err) = result {
                    warn!("slewing reconfiguration failed, staying in tracking");
                    self.state.with(|seq| seq.cancel_slewing());
                    if self.configure_tracking().is_err() {
                        warn!("driver resolution unknown, axis faulted");
                        self.fault();
                    }
                    return Err(MotorError::Driver(err));
                }

                match self.state.with(|seq| seq.install_fast_handler()) {
                    Some(period) => {
                        self.timer.set_period(period);
                        debug!("slewing resolution active");
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    /// Stop stepping and refuse motion until re-initialized
    fn fault(&mut self) {
        let period = self.state.with(|seq| seq.set_frequency(0.0));
        self.timer.set_period(period);
        self.ready = false;
        self.enabled = false;
    }

    fn configure_tracking(&mut self) -> Result<(), D::Error> {
        self.driver.mode_microstep_tracking()?;
        self.driver.mode_decay_tracking()
    }

    fn ensure_idle(&self) -> Result<(), MotorError<D::Error>> {
        let idle = self
            .state
            .with(|seq| seq.frequency() == 0.0 && seq.mode() == MicrostepMode::Tracking);
        if idle {
            Ok(())
        } else {
            Err(MotorError::Busy)
        }
    }

    /// Read a named driver parameter
    pub fn get_parameter(&self, parameter: AxisParameter) -> i32 {
        self.driver.get_parameter(parameter)
    }

    /// Change a named driver parameter
    ///
    /// Only allowed while stopped at tracking resolution; the new settings
    /// are applied to the driver immediately.
    pub fn set_parameter(
        &mut self,
        parameter: AxisParameter,
        value: i32,
    ) -> Result<(), MotorError<D::Error>> {
        self.ensure_idle()?;
        self.driver.set_parameter(parameter, value)?;
        self.configure_tracking().map_err(MotorError::Driver)?;

        let home_steps = self.home_steps();
        self.state.with(|seq| seq.set_home_steps(home_steps));
        Ok(())
    }

    /// Run driver calibration (stopped axis only)
    pub fn calibrate(&mut self) -> Result<(), MotorError<D::Error>> {
        self.ensure_idle()?;
        self.driver.calibrate_driver().map_err(MotorError::Driver)
    }

    /// Poll driver fault flags
    pub fn update_status(&mut self) -> DriverStatus {
        self.driver.update_status();
        self.driver.get_status()
    }

    pub fn status(&self) -> DriverStatus {
        self.driver.get_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Decay, DriverModel, DriverSettings, StepWaveform};
    use crate::motion::sequencer::StepEdge;

    #[derive(Debug, Default)]
    struct MockDriver {
        settings: DriverSettings,
        powered: bool,
        slewing_microsteps: bool,
        slewing_decay: bool,
        mode_calls: usize,
        fail_slewing: bool,
        fail_tracking: bool,
    }

    impl MockDriver {
        fn new(model: DriverModel, microsteps: u16, slewing: Option<u16>) -> Self {
            Self {
                settings: DriverSettings {
                    microsteps,
                    microsteps_slewing: slewing,
                    ..DriverSettings::new(model)
                },
                ..Default::default()
            }
        }
    }

    impl StepperDriver for MockDriver {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            self.mode_microstep_tracking()?;
            self.mode_decay_tracking()
        }

        fn settings(&self) -> &DriverSettings {
            &self.settings
        }

        fn set_parameters(&mut self, settings: DriverSettings) -> Result<(), ConfigError> {
            settings.validate()?;
            self.settings = settings;
            Ok(())
        }

        fn mode_microstep_tracking(&mut self) -> Result<(), ()> {
            self.mode_calls += 1;
            if self.fail_tracking {
                return Err(());
            }
            self.slewing_microsteps = false;
            Ok(())
        }

        fn mode_microstep_slewing(&mut self) -> Result<(), ()> {
            self.mode_calls += 1;
            if self.fail_slewing {
                return Err(());
            }
            self.slewing_microsteps = true;
            Ok(())
        }

        fn mode_decay_tracking(&mut self) -> Result<(), ()> {
            self.slewing_decay = false;
            Ok(())
        }

        fn mode_decay_slewing(&mut self) -> Result<(), ()> {
            self.slewing_decay = true;
            Ok(())
        }

        fn update_status(&mut self) {}

        fn get_status(&self) -> DriverStatus {
            DriverStatus::default()
        }

        fn power(&mut self, on: bool) {
            self.powered = on;
        }

        fn is_powered(&self) -> bool {
            self.powered
        }
    }

    #[derive(Debug, Default)]
    struct MockTimer {
        period: u32,
        writes: usize,
    }

    impl StepTimer for MockTimer {
        fn set_period(&mut self, sub_micros: u32) {
            self.period = sub_micros;
            self.writes += 1;
        }

        fn period(&self) -> u32 {
            self.period
        }
    }

    fn config(driver: DriverSettings) -> AxisConfig {
        AxisConfig {
            driver,
            backlash_steps: 0,
            backlash_frequency: 500.0,
            reverse: false,
            waveform: StepWaveform::Pulse,
        }
    }

    fn ready_motor(state: &MotorState, driver: MockDriver) -> StepDirMotor<'_, MockDriver, MockTimer> {
        let settings = driver.settings;
        let mut motor = StepDirMotor::new(state, driver, MockTimer::default());
        motor.init(&config(settings)).unwrap();
        motor.enable(true).unwrap();
        motor
    }

    fn tick_until_request(state: &MotorState, limit: usize) -> Option<ModeSwitchRequest> {
        for _ in 0..limit {
            if let Some(request) = state.tick().request {
                return Some(request);
            }
        }
        None
    }

    #[test]
    fn test_rejected_config_refuses_motion() {
        let state = MotorState::new();
        let driver = MockDriver::new(DriverModel::A4988, 32, None);
        let settings = driver.settings;
        let mut motor = StepDirMotor::new(&state, driver, MockTimer::default());

        assert_eq!(
            motor.init(&config(settings)),
            Err(MotorError::Config(ConfigError::UnsupportedMicrosteps(32)))
        );
        assert_eq!(motor.enable(true), Err(MotorError::Disabled));
        assert_eq!(motor.set_frequency(100.0), Err(MotorError::Disabled));
    }

    #[test]
    fn test_frequency_programs_timer() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2130, 16, None));

        motor.set_frequency(1000.0).unwrap();
        assert_eq!(motor.timer.period, 16_000);
        assert_eq!(motor.frequency(), 1000.0);

        motor.enable(false).unwrap();
        assert_eq!(motor.timer.period, 0);
        assert!(!motor.driver().powered);
    }

    #[test]
    fn test_full_mode_switch_cycle() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2130, 64, Some(8)));
        assert_eq!(state.with(|seq| seq.home_steps()), 8);

        state.reset_position(5);
        state.set_synchronized(false);
        state.set_target_coordinate(10_000);
        motor.set_frequency(2000.0).unwrap();
        motor.set_slewing(true).unwrap();
        assert_eq!(state.mode(), MicrostepMode::SlewingRequest);

        let request = tick_until_request(&state, 20);
        assert_eq!(request, Some(ModeSwitchRequest::EnterSlewing));
        assert_eq!(state.motor_position() % 8, 0);
        assert!(!motor.driver().slewing_microsteps);

        assert_eq!(motor.poll_mode_switch(), Ok(true));
        assert!(motor.driver().slewing_microsteps);
        assert!(motor.driver().slewing_decay);
        assert_eq!(motor.timer.period, 8_000 * 8);

        let before = state.motor_position();
        let action = state.tick();
        assert_eq!(action.step, StepEdge::Pulse);
        assert_eq!(state.motor_position(), before + 8);
        assert_eq!(state.mode(), MicrostepMode::Slewing);

        motor.set_slewing(false).unwrap();
        assert!(!motor.driver().slewing_microsteps);
        assert_eq!(state.mode(), MicrostepMode::TrackingReady);
        assert_eq!(motor.timer.period, 8_000);

        state.tick();
        assert_eq!(state.mode(), MicrostepMode::Tracking);
    }

    #[test]
    fn test_driver_reconfigured_only_on_boundary() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2130, 16, Some(4)));
        let calls = motor.driver().mode_calls;

        state.reset_position(1);
        state.set_synchronized(false);
        state.set_target_coordinate(100);
        motor.set_frequency(100.0).unwrap();
        motor.set_slewing(true).unwrap();

        // Not aligned yet: nothing pending, driver untouched
        state.tick();
        assert_eq!(motor.poll_mode_switch(), Ok(false));
        assert_eq!(motor.driver().mode_calls, calls);

        tick_until_request(&state, 10);
        assert_eq!(state.motor_position(), 4);
        assert_eq!(motor.poll_mode_switch(), Ok(true));
        assert_eq!(motor.driver().mode_calls, calls + 1);
    }

    #[test]
    fn test_failed_switch_falls_back_to_tracking() {
        let state = MotorState::new();
        let mut driver = MockDriver::new(DriverModel::Tmc2209Uart, 32, Some(4));
        driver.fail_slewing = true;
        let mut motor = ready_motor(&state, driver);

        state.set_synchronized(false);
        state.set_target_coordinate(100);
        motor.set_frequency(100.0).unwrap();
        motor.set_slewing(true).unwrap();
        tick_until_request(&state, 10);

        assert_eq!(motor.poll_mode_switch(), Err(MotorError::Driver(())));
        assert_eq!(state.mode(), MicrostepMode::Tracking);
        assert!(!motor.driver().slewing_microsteps);

        let before = state.motor_position();
        state.tick();
        assert_eq!(state.motor_position(), before + 1);
    }

    #[test]
    fn test_failed_fallback_faults_axis() {
        let state = MotorState::new();
        let mut driver = MockDriver::new(DriverModel::Tmc2209Uart, 32, Some(4));
        driver.fail_slewing = true;
        let mut motor = ready_motor(&state, driver);
        motor.driver_mut().fail_tracking = true;

        state.set_synchronized(false);
        state.set_target_coordinate(100);
        motor.set_frequency(100.0).unwrap();
        motor.set_slewing(true).unwrap();
        tick_until_request(&state, 10);

        assert_eq!(motor.poll_mode_switch(), Err(MotorError::Driver(())));
        assert_eq!(state.mode(), MicrostepMode::Tracking);
        assert_eq!(motor.timer.period, 0);
        assert_eq!(state.frequency(), 0.0);
        assert!(!motor.is_enabled());
        assert_eq!(motor.set_frequency(100.0), Err(MotorError::Disabled));
        assert_eq!(motor.enable(true), Err(MotorError::Disabled));

        motor.driver_mut().fail_tracking = false;
        let settings = motor.driver().settings;
        motor.init(&config(settings)).unwrap();
        motor.enable(true).unwrap();
        motor.set_frequency(100.0).unwrap();
    }

    #[test]
    fn test_switching_is_noop_without_support() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2100, 16, Some(2)));

        motor.set_slewing(true).unwrap();
        assert_eq!(state.mode(), MicrostepMode::Tracking);

        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2130, 16, Some(16)));
        motor.set_slewing(true).unwrap();
        assert_eq!(state.mode(), MicrostepMode::Tracking);
    }

    #[test]
    fn test_cancel_pending_request() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc5160, 16, Some(4)));

        state.set_synchronized(false);
        state.set_target_coordinate(100);
        motor.set_frequency(100.0).unwrap();
        motor.set_slewing(true).unwrap();
        tick_until_request(&state, 10);
        assert_eq!(state.mode(), MicrostepMode::SlewingPause);

        motor.set_slewing(false).unwrap();
        assert_eq!(state.mode(), MicrostepMode::Tracking);
        assert_eq!(motor.poll_mode_switch(), Ok(false));
    }

    #[test]
    fn test_parameters_need_idle_axis() {
        let state = MotorState::new();
        let mut motor = ready_motor(&state, MockDriver::new(DriverModel::Tmc2130, 16, None));

        motor.set_frequency(50.0).unwrap();
        assert_eq!(
            motor.set_parameter(AxisParameter::CurrentRun, 700),
            Err(MotorError::Busy)
        );

        motor.set_frequency(0.0).unwrap();
        motor
            .set_parameter(AxisParameter::MicrostepsSlewing, 4)
            .unwrap();
        assert_eq!(motor.get_parameter(AxisParameter::MicrostepsSlewing), 4);
        assert_eq!(state.with(|seq| seq.home_steps()), 4);

        assert_eq!(
            motor.set_parameter(AxisParameter::Decay, Decay::Fast.code()),
            Err(MotorError::Config(ConfigError::UnsupportedDecay(Decay::Fast)))
        );
    }
}
