//! `skeyd run`: the dispatcher itself.

use std::path::Path;

use skeyd_core::Reactor;
use skeyd_core::liveness::{LivenessMarker, MarkerState};
use tracing::{info, warn};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::privilege::drop_privileges;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;

    ensure_not_running(&settings.dispatcher.liveness_marker)?;
    drop_privileges(settings.user.as_deref(), settings.group.as_deref())?;

    let reactor = Reactor::start(settings.dispatcher).await?;
    info!(address = %reactor.local_addr(), "listening for scan-key notifications");
    reactor.run().await?;
    Ok(())
}

/// Refuse to start over a live instance; clear a marker left by a dead one.
fn ensure_not_running(marker: &Path) -> Result<(), CliError> {
    match LivenessMarker::probe(marker)? {
        MarkerState::Absent => Ok(()),
        MarkerState::Live(pid) => Err(CliError::AlreadyRunning {
            pid,
            path: marker.display().to_string(),
        }),
        MarkerState::Stale(pid) => {
            warn!(path = %marker.display(), ?pid, "removing stale liveness marker");
            match std::fs::remove_file(marker) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}
