//! Board capabilities
//!
//! Everything device-specific (sensor and LED paths, key hooks, power control,
//! the automatic boot hand-off) sits behind [`Board`], so the console core
//! never names a concrete path or command.

pub mod sysfs;

use tracing::error;

use crate::error::UiError;
use crate::input::keys::KeyCode;
use crate::input::queue::{KeyTable, WaitConditions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Red,
    Green,
}

pub trait Board: Send + Sync {
    /// Battery charge in percent.
    fn battery_level(&self) -> Result<u32, UiError>;

    fn charging_usb(&self) -> Result<bool, UiError>;

    fn charging_ac(&self) -> Result<bool, UiError>;

    fn set_led(&self, led: Led, brightness: u8) -> Result<(), UiError>;

    /// Mounted volumes changed since the previous call.
    fn volumes_changed(&self) -> bool;

    /// A host is attached over USB.
    fn usb_connected(&self) -> bool;

    /// Key-down hook: return true to flip log visibility.
    fn toggle_display(&self, _keys: &KeyTable, _code: KeyCode) -> bool {
        false
    }

    /// Key-down hook: return true to restart immediately.
    fn reboot_now(&self, _keys: &KeyTable, _code: KeyCode) -> bool {
        false
    }

    /// Restart the device. Only returns if the restart could not be issued.
    fn restart(&self) -> Result<(), UiError>;

    fn power_off(&self) -> Result<(), UiError>;

    /// Startup check of the board environment.
    fn verify_environment(&self) -> Result<(), UiError>;

    /// A boot target is configured, so the countdown may run.
    fn autoboot_enabled(&self) -> bool;

    /// Hand the device off to the configured boot target.
    fn boot_handoff(&self) -> Result<(), UiError>;
}

impl<B: Board + ?Sized> WaitConditions for B {
    fn volumes_changed(&self) -> bool {
        Board::volumes_changed(self)
    }

    fn usb_connected(&self) -> bool {
        Board::usb_connected(self)
    }
}

/// Run the board's integrity check; on failure restart the device.
///
/// Returns the check error if the restart itself could not be issued, in
/// which case the caller must not continue.
pub fn enforce_integrity(board: &dyn Board) -> Result<(), UiError> {
    let Err(e) = board.verify_environment() else {
        return Ok(());
    };
    error!("{}; restarting", e);
    if let Err(restart) = board.restart() {
        error!("{}", restart);
    }
    Err(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBoard;

    #[test]
    fn passing_check_does_not_restart() {
        let board = FakeBoard::default();
        enforce_integrity(&board).unwrap();
        assert_eq!(board.restarts(), 0);
    }

    #[test]
    fn failing_check_restarts() {
        let board = FakeBoard { integrity_ok: false, ..FakeBoard::default() };
        let err = enforce_integrity(&board).unwrap_err();
        assert!(matches!(err, UiError::Integrity(_)));
        assert_eq!(board.restarts(), 1);
    }
}
