// ── Core error types ──
//
// `CoreError` covers the conditions that stop the dispatcher from starting
// or keep it from running. `EntryError` describes a single configuration
// entry that was skipped; it is logged by the registry, never fatal on its own.
// Malformed datagrams are not errors at all -- see `protocol::notification::Rejection`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Startup ──────────────────────────────────────────────────────
    #[error("Cannot bind notification socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable devices configured")]
    NoDevices,

    #[error("No usable menu actions configured")]
    NoActions,

    #[error("Liveness marker {path}: {source}")]
    LivenessMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Event source failed: {message}")]
    EventSource { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Why a single device or menu-action entry was dropped at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("device {address} already registered as '{existing}', ignoring '{rejected}'")]
    IdentifierMismatch {
        address: IpAddr,
        existing: String,
        rejected: String,
    },

    #[error("device {address} is not registered")]
    UnknownDevice { address: IpAddr },

    #[error("action '{label}' has an empty command")]
    EmptyCommand { label: String },

    #[error("action '{label}': executable {path} is not an absolute path")]
    RelativeExecutable { label: String, path: PathBuf },

    #[error("action '{label}': executable {path} does not exist")]
    MissingExecutable { label: String, path: PathBuf },

    #[error("action label '{label}' is not 7-bit ASCII")]
    NonAsciiLabel { label: String },

    #[error("action '{label}' contains ';' or '\"', which the wire format cannot carry")]
    ReservedCharacter { label: String },
}
