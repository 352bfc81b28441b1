//! Subcommand handlers.

pub mod check;
pub mod example;
pub mod run;

use skeyd_config::{Settings, config_path, load_config, resolve};
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Locate, load and resolve the configuration named by the global options.
fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let path = config_path(global.config.as_deref());
    debug!(path = %path.display(), "using configuration file");
    let file = load_config(&path)?;
    Ok(resolve(&file)?)
}
