//! Configuration for the skeyd dispatcher.
//!
//! TOML file + `SKEYD_*` environment, merged with figment, then resolved
//! into `skeyd_core::DispatcherConfig`. Per-entry action checks (absolute
//! executable, 7-bit label) stay in the core registry; this crate only
//! validates what the reactor cannot run without.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use skeyd_core::config::{ActionTable, DEFAULT_PORT};
use skeyd_core::{ActionCategory, DeviceConfig, DispatcherConfig};

/// System-wide configuration file, preferred when present.
pub const SYSTEM_CONFIG: &str = "/etc/skeyd/config.toml";

/// Smallest receive buffer that still fits a realistic notification.
pub const MIN_BUFFER_SIZE: usize = 64;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Address the dispatcher binds to and advertises to devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Registration renewal period.
    #[serde(default = "default_cycle")]
    pub cycle_secs: u64,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Pause between a button press and its script.
    #[serde(default = "default_script_delay")]
    pub script_delay_ms: u64,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Registration tool.
    #[serde(default = "default_snmpset")]
    pub snmpset: PathBuf,

    /// Unprivileged account to switch to before binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            initial_delay_secs: default_initial_delay(),
            cycle_secs: default_cycle(),
            buffer_size: default_buffer_size(),
            script_delay_ms: default_script_delay(),
            pid_file: default_pid_file(),
            snmpset: default_snmpset(),
            user: None,
            group: None,
            devices: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_initial_delay() -> u64 {
    5
}
fn default_cycle() -> u64 {
    300
}
fn default_buffer_size() -> usize {
    2048
}
fn default_script_delay() -> u64 {
    1000
}
fn default_pid_file() -> PathBuf {
    PathBuf::from("/run/skeyd.pid")
}
fn default_snmpset() -> PathBuf {
    PathBuf::from("snmpset")
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceEntry {
    /// IP literal or resolvable hostname.
    pub address: String,

    /// Vendor device identifier, handed to every script.
    pub identifier: String,

    /// Menu label → command line, per category.
    #[serde(default)]
    pub actions: BTreeMap<ActionCategory, ActionTable>,
}

/// Resolved configuration: what the reactor runs with, plus the account
/// the process should switch to first.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dispatcher: DispatcherConfig,
    pub user: Option<String>,
    pub group: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Pick the config file: explicit path, else the system file when it
/// exists, else the per-user config directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let system = PathBuf::from(SYSTEM_CONFIG);
    if system.exists() {
        return system;
    }
    ProjectDirs::from("org", "skeyd", "skeyd").map_or(system, |dirs| {
        dirs.config_dir().join("config.toml")
    })
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config file at `path`, layered over defaults and under
/// `SKEYD_*` environment overrides (`__` separates nested keys).
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let figment = Figment::new()
        .merge(Serialized::defaults(ConfigFile::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SKEYD_").ignore(&["config"]).split("__"));

    let config: ConfigFile = figment.extract()?;
    debug!(path = %path.display(), devices = config.devices.len(), "configuration loaded");
    Ok(config)
}

// ── Resolution ──────────────────────────────────────────────────────

/// Turn a loaded document into the reactor's typed configuration.
///
/// Unresolvable device addresses are skipped with a warning; everything
/// else wrong here is an error.
pub fn resolve(file: &ConfigFile) -> Result<Settings, ConfigError> {
    let host = file
        .host
        .as_deref()
        .ok_or_else(|| ConfigError::invalid("host", "required"))?;
    let ip: IpAddr = host
        .parse()
        .map_err(|_| ConfigError::invalid("host", format!("'{host}' is not an IP address")))?;
    if ip.is_unspecified() {
        return Err(ConfigError::invalid(
            "host",
            format!("'{host}' is a wildcard; devices must be told a concrete address"),
        ));
    }

    if file.cycle_secs == 0 {
        return Err(ConfigError::invalid("cycle_secs", "must be greater than zero"));
    }
    if file.buffer_size < MIN_BUFFER_SIZE {
        return Err(ConfigError::invalid(
            "buffer_size",
            format!("must be at least {MIN_BUFFER_SIZE}"),
        ));
    }

    let devices = file
        .devices
        .iter()
        .filter_map(|entry| match resolve_address(&entry.address) {
            Some(address) => Some(DeviceConfig {
                address,
                identifier: entry.identifier.clone(),
                actions: entry.actions.clone(),
            }),
            None => {
                warn!(address = %entry.address, identifier = %entry.identifier, "cannot resolve device address, skipping");
                None
            }
        })
        .collect();

    Ok(Settings {
        dispatcher: DispatcherConfig {
            bind: SocketAddr::new(ip, file.port),
            initial_delay: Duration::from_secs(file.initial_delay_secs),
            cycle: Duration::from_secs(file.cycle_secs),
            buffer_size: file.buffer_size,
            script_delay: Duration::from_millis(file.script_delay_ms),
            registration_tool: file.snmpset.clone(),
            liveness_marker: file.pid_file.clone(),
            devices,
        },
        user: file.user.clone(),
        group: file.group.clone(),
    })
}

fn resolve_address(address: &str) -> Option<IpAddr> {
    if let Ok(ip) = address.parse() {
        return Some(ip);
    }
    let mut candidates = (address, 0).to_socket_addrs().ok()?.map(|addr| addr.ip());
    let first = candidates.next()?;
    // Prefer IPv4: scanners of this class rarely speak IPv6.
    Some(
        std::iter::once(first)
            .chain(candidates)
            .find(IpAddr::is_ipv4)
            .unwrap_or(first),
    )
}

// ── Example document ────────────────────────────────────────────────

const EXAMPLE_HEADER: &str = "\
# skeyd configuration
#
# Every key may be overridden from the environment: SKEYD_PORT=54926,
# SKEYD_CYCLE_SECS=600, ...
#
# Each action runs as: <command> <device identifier> <arguments...>
# Commands must be absolute paths to existing executables.

";

/// A commented, ready-to-edit configuration document.
pub fn example_config() -> Result<String, ConfigError> {
    let example = ConfigFile {
        host: Some("192.0.2.1".into()),
        user: Some("scanner".into()),
        group: Some("scanner".into()),
        devices: vec![DeviceEntry {
            address: "192.0.2.10".into(),
            identifier: "MFC-L2700DW".into(),
            actions: BTreeMap::from([
                (
                    ActionCategory::File,
                    BTreeMap::from([(
                        "PDF".to_owned(),
                        vec!["/usr/local/bin/scan-to-pdf".to_owned(), "--duplex".to_owned()],
                    )]),
                ),
                (
                    ActionCategory::Image,
                    BTreeMap::from([(
                        "Photo".to_owned(),
                        vec!["/usr/local/bin/scan-to-jpeg".to_owned()],
                    )]),
                ),
            ]),
        }],
        ..ConfigFile::default()
    };
    Ok(format!("{EXAMPLE_HEADER}{}", toml::to_string_pretty(&example)?))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"
host = "192.0.2.1"

[[devices]]
address = "192.0.2.10"
identifier = "MFC-1"

[devices.actions.file]
PDF = ["/usr/local/bin/scan-to-pdf", "--duplex"]
"#;

    /// Load `doc` inside a jail so concurrent env tests cannot leak in.
    fn parse(doc: &str) -> ConfigFile {
        let mut loaded = None;
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", doc)?;
            loaded = Some(load_config(Path::new("config.toml")).unwrap());
            Ok(())
        });
        loaded.unwrap()
    }

    #[test]
    fn minimal_document_gets_defaults() {
        let settings = resolve(&parse(MINIMAL)).unwrap();
        let config = settings.dispatcher;

        assert_eq!(config.bind, "192.0.2.1:54925".parse().unwrap());
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.cycle, Duration::from_secs(300));
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.script_delay, Duration::from_millis(1000));
        assert_eq!(config.liveness_marker, PathBuf::from("/run/skeyd.pid"));
        assert_eq!(config.registration_tool, PathBuf::from("snmpset"));
        assert_eq!(settings.user, None);

        assert_eq!(config.devices.len(), 1);
        let device = &config.devices[0];
        assert_eq!(device.identifier, "MFC-1");
        assert_eq!(
            device.actions[&ActionCategory::File]["PDF"],
            vec!["/usr/local/bin/scan-to-pdf", "--duplex"]
        );
    }

    #[test]
    fn host_is_required_and_concrete() {
        let mut file = parse(MINIMAL);

        file.host = None;
        assert!(matches!(resolve(&file), Err(ConfigError::Validation { field, .. }) if field == "host"));

        file.host = Some("0.0.0.0".into());
        assert!(matches!(resolve(&file), Err(ConfigError::Validation { field, .. }) if field == "host"));

        file.host = Some("scanner-gateway".into());
        assert!(matches!(resolve(&file), Err(ConfigError::Validation { field, .. }) if field == "host"));
    }

    #[test]
    fn rejects_zero_cycle_and_tiny_buffer() {
        let mut file = parse(MINIMAL);
        file.cycle_secs = 0;
        assert!(matches!(resolve(&file), Err(ConfigError::Validation { field, .. }) if field == "cycle_secs"));

        let mut file = parse(MINIMAL);
        file.buffer_size = 16;
        assert!(matches!(resolve(&file), Err(ConfigError::Validation { field, .. }) if field == "buffer_size"));
    }

    #[test]
    fn unresolvable_device_is_skipped() {
        let mut file = parse(MINIMAL);
        file.devices.push(DeviceEntry {
            address: "no-such-scanner.invalid".into(),
            identifier: "MFC-2".into(),
            actions: BTreeMap::new(),
        });
        let settings = resolve(&file).unwrap();
        assert_eq!(settings.dispatcher.devices.len(), 1);
        assert_eq!(settings.dispatcher.devices[0].identifier, "MFC-1");
    }

    #[test]
    fn unknown_category_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL.replace("actions.file", "actions.fax")).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Figment(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_config(Path::new("/nonexistent/skeyd/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", MINIMAL)?;
            jail.set_env("SKEYD_PORT", "6000");
            jail.set_env("SKEYD_CYCLE_SECS", "60");
            jail.set_env("SKEYD_CONFIG", "ignored.toml");

            let file = load_config(Path::new("config.toml")).unwrap();
            assert_eq!(file.port, 6000);
            assert_eq!(file.cycle_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/tmp/skeyd.toml"))),
            PathBuf::from("/tmp/skeyd.toml")
        );
    }

    #[test]
    fn example_config_loads_and_resolves() {
        let example = example_config().unwrap();
        assert!(example.starts_with("# skeyd configuration"));

        let file = parse(&example);
        assert_eq!(file.user.as_deref(), Some("scanner"));
        let settings = resolve(&file).unwrap();
        assert_eq!(settings.dispatcher.devices.len(), 1);
        assert_eq!(settings.dispatcher.devices[0].actions.len(), 2);
    }
}
