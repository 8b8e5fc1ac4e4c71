//! Which logical devices belong to a board.

use tracing::trace;

use crate::device::{Board, LogicalDevice};

/// The devices linked to `board`, in the order they appear in `devices`.
///
/// A device is linked when its [`crate::device::ARDUINO_LINKED`] parameter
/// is the board's selector, it has a function type set,
/// and it is not a [`crate::device::CARD_MODEL`] record.
pub fn linked_devices(devices: &[LogicalDevice], board: &Board) -> Vec<LogicalDevice> {
    devices
        .iter()
        .filter(|device| is_linked(device, board))
        .cloned()
        .collect()
}

fn is_linked(device: &LogicalDevice, board: &Board) -> bool {
    if device.is_card() {
        trace!(%device, "Skipping card");
        return false;
    }

    device.linked_to() == Some(board.selector.as_str()) && device.function().is_some()
}
