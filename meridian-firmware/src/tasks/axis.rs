//! Axis task
//!
//! Owns the motor of one axis: initializes the driver, executes queued
//! commands, reconfigures the driver when the tick interrupt asks for a
//! microstep mode switch and polls the driver status.

use defmt::*;
use embassy_futures::select::{select3, Either3};
use embassy_time::{Delay, Duration, Ticker, Timer};

use meridian_core::config::AxisConfig;
use meridian_core::motion::{MotorError, StepDirMotor};
use meridian_core::traits::{DriverStatus, StepperDriver};
use meridian_drivers::stepper::TmcUartDriver;
use meridian_hal_rp2040::{AlarmTimer, RpOutput, RpUart};

use crate::channels::{AxisCommand, AXIS_COMMANDS, AXIS_STATUS};

/// TMC2209 on a buffered UART, enable on a GPIO
pub type AxisDriver = TmcUartDriver<RpUart, Delay, RpOutput<'static>>;

pub type AxisMotor = StepDirMotor<'static, AxisDriver, AlarmTimer>;

type AxisError = MotorError<<AxisDriver as StepperDriver>::Error>;

/// Time for the driver's charge pump and internal regulator to come up
const POWER_UP_DELAY: Duration = Duration::from_millis(100);

/// Driver status poll interval
const STATUS_INTERVAL: Duration = Duration::from_millis(200);

#[embassy_executor::task(pool_size = 2)]
pub async fn axis_task(index: usize, mut motor: AxisMotor, config: AxisConfig) {
    info!("axis {}: task started", index);

    Timer::after(POWER_UP_DELAY).await;
    match motor.init(&config) {
        Ok(()) => info!(
            "axis {}: {} ready, {}x tracking, ratio {}",
            index,
            config.driver.model,
            config.driver.microsteps,
            motor.microstep_ratio()
        ),
        // Motion stays disarmed; status polling continues so the fault is visible
        Err(e) => error!("axis {}: init failed: {}", index, e),
    }

    let state = motor.state();
    let commands = &AXIS_COMMANDS[index];
    let mut ticker = Ticker::every(STATUS_INTERVAL);
    let mut last_status = DriverStatus::default();

    loop {
        match select3(ticker.next(), state.wait_request(), commands.receive()).await {
            Either3::First(()) => {
                let status = motor.update_status();
                if status.has_fault() && status != last_status {
                    warn!("axis {}: driver fault {}", index, status);
                }
                last_status = status;
                AXIS_STATUS[index].signal(status);
            }
            Either3::Second(request) => match motor.handle_mode_switch(request) {
                Ok(true) => debug!("axis {}: slewing", index),
                Ok(false) => {}
                Err(e) => warn!("axis {}: mode switch failed: {}", index, e),
            },
            Either3::Third(command) => {
                trace!("axis {}: {}", index, command);
                if let Err(e) = execute(&mut motor, command) {
                    warn!("axis {}: {} rejected: {}", index, command, e);
                }
            }
        }
    }
}

fn execute(motor: &mut AxisMotor, command: AxisCommand) -> Result<(), AxisError> {
    match command {
        AxisCommand::Enable(on) => motor.enable(on),
        AxisCommand::SetFrequency(frequency) => motor.set_frequency(frequency),
        AxisCommand::SetBacklashFrequency(frequency) => motor.set_backlash_frequency(frequency),
        AxisCommand::SetSlewing(slewing) => motor.set_slewing(slewing),
        AxisCommand::SetParameter(parameter, value) => motor.set_parameter(parameter, value),
        AxisCommand::Calibrate => motor.calibrate(),
    }
}
