//! Microstep mode switching between tracking and slewing resolution
//!
//! The tick handler decides *when* a switch may happen (the motor must sit
//! on a full slewing step), the main loop does the slow part (driver bus
//! writes, handler swap). [`MicrostepMode`] tracks where in that hand-off
//! an axis is.

/// Microstep mode-control state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicrostepMode {
    /// Standard handler, tracking resolution
    #[default]
    Tracking,
    /// Fast handler, slewing resolution
    Slewing,
    /// Slewing wanted, waiting for an aligned position
    SlewingRequest,
    /// Aligned and holding, waiting for the main loop to reconfigure
    SlewingPause,
    /// Fast handler installed, first fast tick pending
    SlewingReady,
    /// Standard handler reinstalled, first standard tick pending
    TrackingReady,
}

impl MicrostepMode {
    /// Mode runs on the fast tick handler
    pub fn uses_fast_handler(self) -> bool {
        matches!(self, MicrostepMode::SlewingReady | MicrostepMode::Slewing)
    }

    /// Mode is on the way to or at slewing resolution
    pub fn is_slewing(self) -> bool {
        !matches!(self, MicrostepMode::Tracking | MicrostepMode::TrackingReady)
    }

    /// Tick handler holds position instead of stepping
    ///
    /// Both cases mean the driver is being reconfigured by the main loop.
    pub fn holds_position(self, fast_handler: bool) -> bool {
        match self {
            MicrostepMode::SlewingPause => true,
            MicrostepMode::SlewingReady | MicrostepMode::Slewing => !fast_handler,
            _ => false,
        }
    }
}

/// Work the tick handler defers to the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeSwitchRequest {
    /// Axis paused on an aligned position: reconfigure for slewing
    EnterSlewing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_selection() {
        assert!(MicrostepMode::Slewing.uses_fast_handler());
        assert!(MicrostepMode::SlewingReady.uses_fast_handler());
        assert!(!MicrostepMode::SlewingPause.uses_fast_handler());
        assert!(!MicrostepMode::TrackingReady.uses_fast_handler());
    }

    #[test]
    fn test_holds_position() {
        assert!(MicrostepMode::SlewingPause.holds_position(false));
        assert!(MicrostepMode::Slewing.holds_position(false));
        assert!(!MicrostepMode::Slewing.holds_position(true));
        assert!(!MicrostepMode::SlewingRequest.holds_position(false));
        assert!(!MicrostepMode::TrackingReady.holds_position(false));
    }

    #[test]
    fn test_is_slewing() {
        assert!(!MicrostepMode::Tracking.is_slewing());
        assert!(!MicrostepMode::TrackingReady.is_slewing());
        assert!(MicrostepMode::SlewingRequest.is_slewing());
    }
}
