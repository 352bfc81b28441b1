// ── Liveness marker ──
//
// A PID file whose presence means "an instance is running". Written once the
// socket is bound, removed when the reactor reaches Stopped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

use crate::error::CoreError;

/// What an existing marker file says about a previous instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Absent,
    /// The recorded process is still alive.
    Live(i32),
    /// The file exists but names no live process (or no parseable PID).
    Stale(Option<i32>),
}

#[derive(Debug)]
pub struct LivenessMarker {
    path: PathBuf,
}

impl LivenessMarker {
    /// Write the current PID to `path`, replacing any stale content.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::LivenessMarker {
                path: path.clone(),
                source,
            })?;
        }
        std::fs::write(&path, format!("{}\n", std::process::id())).map_err(|source| {
            CoreError::LivenessMarker {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), "liveness marker written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the marker. A marker that is already gone is not an error.
    pub fn remove(self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "liveness marker removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CoreError::LivenessMarker {
                path: self.path,
                source,
            }),
        }
    }

    /// Inspect `path` without modifying it.
    pub fn probe(path: &Path) -> Result<MarkerState, CoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MarkerState::Absent),
            Err(source) => {
                return Err(CoreError::LivenessMarker {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let Some(pid) = content.trim().parse::<i32>().ok().filter(|pid| *pid > 0) else {
            return Ok(MarkerState::Stale(None));
        };

        // Signal 0 only checks existence; EPERM means alive but not ours.
        match kill(Pid::from_raw(pid), None) {
            Ok(()) | Err(Errno::EPERM) => Ok(MarkerState::Live(pid)),
            Err(_) => Ok(MarkerState::Stale(Some(pid))),
        }
    }
}
