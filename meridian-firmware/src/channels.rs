//! Per-axis shared state and inter-task channels
//!
//! The motor state and step lines are shared with the alarm interrupts,
//! the command channels and status signals with whatever task issues
//! motion commands.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use meridian_core::config::{AxisParameter, MAX_AXES};
use meridian_core::traits::DriverStatus;

use crate::tasks::tick::Axis;

/// Queued commands per axis
const COMMAND_QUEUE_SIZE: usize = 4;

/// Axis command, executed by the axis task
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub enum AxisCommand {
    /// Power the driver stage on or off
    Enable(bool),
    /// Signed step rate in steps/s
    SetFrequency(f32),
    /// Step rate used while taking up backlash
    SetBacklashFrequency(f32),
    /// Switch to slewing (`true`) or tracking resolution
    SetSlewing(bool),
    /// Change a driver parameter on a stopped axis
    SetParameter(AxisParameter, i32),
    /// Run driver calibration on a stopped axis
    Calibrate,
}

/// Axis 0 (RA/azimuth) on alarm 1, axis 1 (Dec/altitude) on alarm 2
pub static AXES: [Axis; MAX_AXES] = [Axis::new(1), Axis::new(2)];

pub static AXIS_COMMANDS: [Channel<CriticalSectionRawMutex, AxisCommand, COMMAND_QUEUE_SIZE>;
    MAX_AXES] = [Channel::new(), Channel::new()];

/// Latest driver status per axis, refreshed by the status poll
pub static AXIS_STATUS: [Signal<CriticalSectionRawMutex, DriverStatus>; MAX_AXES] =
    [Signal::new(), Signal::new()];
