//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text
//! and a stable exit code.

use std::net::SocketAddr;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use skeyd_config::ConfigError;
use skeyd_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const ALREADY_RUNNING: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const STARTUP: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(skeyd::no_config),
        help(
            "Create one with: skeyd example-config --output {path}\n\
             or point --config / SKEYD_CONFIG at an existing file."
        )
    )]
    NoConfig { path: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(skeyd::config))]
    Config(ConfigError),

    #[error("No usable devices configured")]
    #[diagnostic(
        code(skeyd::no_devices),
        help("Every [[devices]] entry was skipped; run with -v to see why.")
    )]
    NoDevices,

    #[error("No usable menu actions configured")]
    #[diagnostic(
        code(skeyd::no_actions),
        help(
            "Actions need an absolute path to an existing executable and a 7-bit \
             label without ';' or '\"'. Run: skeyd check -v"
        )
    )]
    NoActions,

    // ── Startup ──────────────────────────────────────────────────────
    #[error("skeyd is already running (pid {pid})")]
    #[diagnostic(
        code(skeyd::already_running),
        help("Liveness marker: {path}. Stop the running instance first.")
    )]
    AlreadyRunning { pid: i32, path: String },

    #[error("Cannot switch to {account}: {reason}")]
    #[diagnostic(
        code(skeyd::privilege_drop),
        help("Check the `user` and `group` settings; switching accounts requires starting as root.")
    )]
    PrivilegeDrop { account: String, reason: String },

    #[error("Cannot bind notification socket on {addr}")]
    #[diagnostic(
        code(skeyd::bind),
        help("`host` must be an address of this machine and the port must be free.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Liveness marker {}", path.display())]
    #[diagnostic(code(skeyd::liveness_marker), help("Check that the pid_file directory is writable."))]
    LivenessMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Startup failed: {message}")]
    #[diagnostic(code(skeyd::startup))]
    Startup { message: String },

    #[error("Cannot open log file {}: {reason}", path.display())]
    #[diagnostic(code(skeyd::log_file))]
    LogFile { path: PathBuf, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Dispatcher stopped: {message}")]
    #[diagnostic(code(skeyd::event_source))]
    EventSource { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::Config(_) | Self::NoDevices | Self::NoActions => {
                exit_code::CONFIG
            }
            Self::AlreadyRunning { .. } => exit_code::ALREADY_RUNNING,
            Self::PrivilegeDrop { .. } => exit_code::PERMISSION,
            Self::Bind { .. } | Self::LivenessMarker { .. } | Self::Startup { .. } => {
                exit_code::STARTUP
            }
            Self::LogFile { .. } => exit_code::USAGE,
            Self::EventSource { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Bind { addr, source } => Self::Bind { addr, source },
            CoreError::NoDevices => Self::NoDevices,
            CoreError::NoActions => Self::NoActions,
            CoreError::LivenessMarker { path, source } => Self::LivenessMarker { path, source },
            CoreError::Signal { .. } => Self::Startup {
                message: err.to_string(),
            },
            CoreError::Config { message } => Self::Config(ConfigError::Validation {
                field: "dispatcher".into(),
                reason: message,
            }),
            CoreError::EventSource { message } => Self::EventSource { message },
        }
    }
}
