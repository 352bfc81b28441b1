// ── Device domain types ──

use std::net::IpAddr;

use super::category::ActionCategory;

/// A scanner known to the dispatcher. Identity is the network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: IpAddr,
    pub identifier: String,
}

/// Composite key of a configured menu action.
///
/// Ordered by address, then category, then label, so all actions of one
/// device and category form a contiguous range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    pub address: IpAddr,
    pub category: ActionCategory,
    pub label: String,
}

impl ActionKey {
    pub fn new(address: IpAddr, category: ActionCategory, label: impl Into<String>) -> Self {
        Self {
            address,
            category,
            label: label.into(),
        }
    }
}
