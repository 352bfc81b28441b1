// ── Resolved dispatcher configuration ──
//
// These types describe *what* the dispatcher serves and *where* it listens.
// They are fully resolved (addresses parsed, durations typed) and never
// touch disk. `skeyd-config` builds a `DispatcherConfig` and hands it in.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::ActionCategory;

/// Default UDP port scanners send button notifications to.
pub const DEFAULT_PORT: u16 = 54925;

/// Label → argument vector (`argv[0]` is the absolute executable path).
pub type ActionTable = BTreeMap<String, Vec<String>>;

/// One configured scanner and its menu entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Network address the scanner sends notifications from.
    pub address: IpAddr,
    /// Vendor device identifier, passed to every script as its first argument.
    pub identifier: String,
    /// Menu entries per action category.
    pub actions: BTreeMap<ActionCategory, ActionTable>,
}

/// Everything the reactor needs to run.
///
/// Built by the config crate, passed to [`Reactor::start`](crate::Reactor::start)
/// -- core never reads config files.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Address the notification socket binds to. Also advertised to devices,
    /// so it must be a concrete (non-wildcard) address.
    pub bind: SocketAddr,
    /// Delay before the first registration round.
    pub initial_delay: Duration,
    /// Interval between registration rounds; also the requested renewal duration.
    pub cycle: Duration,
    /// Receive buffer size for a single datagram.
    pub buffer_size: usize,
    /// Pause between accepting a notification and launching its script.
    pub script_delay: Duration,
    /// Registration tool (`snmpset` or a compatible wrapper).
    pub registration_tool: PathBuf,
    /// Liveness marker written after bind and removed on clean shutdown.
    pub liveness_marker: PathBuf,
    /// Configured scanners.
    pub devices: Vec<DeviceConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            initial_delay: Duration::from_secs(5),
            cycle: Duration::from_secs(300),
            buffer_size: 2048,
            script_delay: Duration::from_secs(1),
            registration_tool: PathBuf::from("snmpset"),
            liveness_marker: PathBuf::from("/run/skeyd.pid"),
            devices: Vec::new(),
        }
    }
}
