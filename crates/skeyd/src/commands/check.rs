//! `skeyd check`: validate the configuration without binding anything.

use skeyd_core::DeviceRegistry;
use skeyd_core::liveness::{LivenessMarker, MarkerState};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let config = &settings.dispatcher;
    let registry = DeviceRegistry::from_config(&config.devices)?;

    println!("listen      {}", config.bind);
    println!(
        "register    every {}s via {}",
        config.cycle.as_secs(),
        config.registration_tool.display()
    );
    if let Some(user) = &settings.user {
        println!("run as      {user}");
    }
    let marker = match LivenessMarker::probe(&config.liveness_marker)? {
        MarkerState::Absent => "absent".to_owned(),
        MarkerState::Live(pid) => format!("running (pid {pid})"),
        MarkerState::Stale(_) => "stale".to_owned(),
    };
    println!("pid file    {} ({marker})", config.liveness_marker.display());

    for device in registry.devices() {
        println!();
        println!("{} ({})", device.identifier, device.address);
        for (category, label) in registry.registrations(device.address) {
            let command = registry
                .action(device.address, category, label)
                .map(|argv| argv.join(" "))
                .unwrap_or_default();
            println!("  {:<6} {label:<16} {command}", category.as_wire());
        }
    }
    Ok(())
}
