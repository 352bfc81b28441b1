// ── Scan button events ──

use std::net::SocketAddr;

use super::category::ActionCategory;

/// A validated button-press notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Menu class selected on the device.
    pub function: ActionCategory,
    /// Menu label shown on the device, quotes stripped.
    pub user: String,
    /// Dispatcher address the device believes it is talking to.
    pub target: SocketAddr,
    /// Opaque per-press token used for duplicate suppression.
    pub sequence: String,
}
