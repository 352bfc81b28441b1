// ── Registration requests ──
//
// A registration request tells one device that this dispatcher is the
// notification target for one menu entry. It is delivered as an SNMPv1 set
// of a single string OID, executed by an external tool so the reactor never
// blocks on the management protocol.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use super::BUTTON_SCAN;
use crate::model::ActionCategory;

/// Community string the devices accept registrations on.
pub const COMMUNITY: &str = "internal";

/// SNMP protocol version of the request.
pub const SNMP_VERSION: &str = "1";

/// Scan-key registration table entry.
pub const REGISTRATION_OID: &str = "1.3.6.1.4.1.2435.2.3.9.2.11.1.1.0";

/// One (device, category, label) registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Device management endpoint.
    pub device: IpAddr,
    pub category: ActionCategory,
    /// Menu label shown on the device.
    pub label: String,
    /// Our notification address, as the device should send to it.
    pub advertised: SocketAddr,
    /// Requested renewal duration.
    pub duration: Duration,
}

impl RegistrationRequest {
    /// The string value written to [`REGISTRATION_OID`].
    pub fn payload(&self) -> String {
        format!(
            "TYPE=BR;BUTTON={BUTTON_SCAN};USER=\"{label}\";FUNC={func};HOST={ip}:{port};APPNUM={app};DURATION={secs};BRID=;",
            label = self.label,
            func = self.category.as_wire(),
            ip = self.advertised.ip(),
            port = self.advertised.port(),
            app = self.category.app_num(),
            secs = self.duration.as_secs(),
        )
    }

    /// Full argument vector for `tool`, ready for the process supervisor.
    pub fn command(&self, tool: &Path) -> Vec<String> {
        vec![
            tool.to_string_lossy().into_owned(),
            "-v".into(),
            SNMP_VERSION.into(),
            "-c".into(),
            COMMUNITY.into(),
            self.device.to_string(),
            REGISTRATION_OID.into(),
            "s".into(),
            self.payload(),
        ]
    }
}

// ── Tests ────────────────────────────────────────────────────────────
