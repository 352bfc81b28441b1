//! `skeyd example-config`

use std::path::Path;

use tracing::info;

use crate::error::CliError;

pub fn handle(output: Option<&Path>) -> Result<(), CliError> {
    let document = skeyd_config::example_config()?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, document)?;
            info!(path = %path.display(), "example configuration written");
        }
        None => print!("{document}"),
    }
    Ok(())
}
