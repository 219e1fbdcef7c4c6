//! Meridian - Telescope Mount Axis Firmware
//!
//! Firmware binary for RP2040 mount controllers. Each axis runs its step
//! sequencer from a hardware alarm interrupt; an async task per axis owns
//! the stepper driver and executes motion commands.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{UART0, UART1};
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig, Uart};
use embassy_time::{Delay, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use meridian_drivers::stepper::{TmcUartDriver, UartTransport};
use meridian_hal_rp2040::{RpOutput, RpUart};

use crate::channels::{AxisCommand, AXES, AXIS_COMMANDS};
use crate::tasks::{AxisMotor, StepLines};

mod boards;
mod channels;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
});

// Driver replies are 8 bytes; a write plus its echo is 16
const UART_BUF_SIZE: usize = 32;

static RA_TX_BUF: StaticCell<[u8; UART_BUF_SIZE]> = StaticCell::new();
static RA_RX_BUF: StaticCell<[u8; UART_BUF_SIZE]> = StaticCell::new();
static DEC_TX_BUF: StaticCell<[u8; UART_BUF_SIZE]> = StaticCell::new();
static DEC_RX_BUF: StaticCell<[u8; UART_BUF_SIZE]> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Meridian firmware starting...");

    let p = embassy_rp::init(Default::default());

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = boards::DRIVER_BAUDRATE;

    // Pins below follow boards::RA_PINS and boards::DEC_PINS
    let ra_uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config.clone()).into_buffered(
        Irqs,
        RA_TX_BUF.init([0; UART_BUF_SIZE]),
        RA_RX_BUF.init([0; UART_BUF_SIZE]),
    );
    let dec_uart = Uart::new_blocking(p.UART1, p.PIN_8, p.PIN_9, uart_config).into_buffered(
        Irqs,
        DEC_TX_BUF.init([0; UART_BUF_SIZE]),
        DEC_RX_BUF.init([0; UART_BUF_SIZE]),
    );

    AXES[0].attach(StepLines::new(
        Output::new(p.PIN_11, Level::Low),
        Output::new(p.PIN_10, Level::Low),
    ));
    AXES[1].attach(StepLines::new(
        Output::new(p.PIN_6, Level::Low),
        Output::new(p.PIN_7, Level::Low),
    ));

    // Enable is active low: start with the power stages off
    let ra_enable = Output::new(p.PIN_12, Level::High);
    let dec_enable = Output::new(p.PIN_13, Level::High);

    interrupt::TIMER_IRQ_1.set_priority(Priority::P0);
    interrupt::TIMER_IRQ_2.set_priority(Priority::P0);
    unsafe {
        interrupt::TIMER_IRQ_1.enable();
        interrupt::TIMER_IRQ_2.enable();
    }
    info!("Step alarms armed");

    let axes = [(ra_uart, ra_enable), (dec_uart, dec_enable)];
    for (index, (uart, enable)) in axes.into_iter().enumerate() {
        let config = boards::axis_config(index);
        match axis_motor(index, uart, enable) {
            Some(motor) => spawner
                .spawn(tasks::axis_task(index, motor, config))
                .unwrap(),
            None => error!("axis {}: not started", index),
        }
    }
    info!("All tasks spawned, firmware running");

    // Power up tracking at the sidereal rate
    AXIS_COMMANDS[0].send(AxisCommand::Enable(true)).await;
    AXIS_COMMANDS[0]
        .send(AxisCommand::SetFrequency(boards::SIDEREAL_RATE))
        .await;

    loop {
        Timer::after_secs(60).await;
        trace!(
            "RA at {}, Dec at {}",
            AXES[0].state.motor_position(),
            AXES[1].state.motor_position()
        );
    }
}

/// Build the motor of one axis from its board definition
fn axis_motor(index: usize, uart: BufferedUart, enable: Output<'static>) -> Option<AxisMotor> {
    let pins = &boards::AXIS_PINS[index];
    let config = boards::axis_config(index);
    if !pins.matches(config.driver.model) {
        error!("axis {}: wiring does not match {}", index, config.driver.model);
        return None;
    }

    let address = pins.uart_address().unwrap_or(0);
    let transport = UartTransport::new(RpUart::new(uart), Delay, address);
    let driver = match TmcUartDriver::new(transport, Some(RpOutput::from(enable)), config.driver) {
        Ok(driver) => driver,
        Err(e) => {
            error!("axis {}: driver rejected settings: {}", index, e);
            return None;
        }
    };

    let axis = &AXES[index];
    Some(AxisMotor::new(&axis.state, driver, axis.alarm.timer()))
}

#[interrupt]
unsafe fn TIMER_IRQ_1() {
    AXES[0].on_alarm();
}

#[interrupt]
unsafe fn TIMER_IRQ_2() {
    AXES[1].on_alarm();
}
