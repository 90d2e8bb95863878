// src/main.rs

use anyhow::Result;
use tracing::Level;

fn init_logging() {
    #[cfg(debug_assertions)]
    {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .init();
    }
}

#[cfg(windows)]
fn run() -> Result<()> {
    use checkmark::{
        bootstrap::{Services, SystemAdapters},
        system::windows::is_elevated,
    };

    if !is_elevated() {
        anyhow::bail!("Checkmark must be run as administrator to modify system settings");
    }

    let base_dir = std::env::current_exe()?
        .parent()
        .map(std::path::Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("Cannot resolve executable directory"))?;

    let mut services = Services::start(&base_dir, SystemAdapters::live())?;
    let summary = services.create_all_backups_if_needed();
    tracing::info!(
        created = summary.created.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "startup backups verified"
    );
    for entity in services.manager.entities() {
        tracing::info!(
            id = %entity.id,
            kind = %entity.kind(),
            current = ?entity.current_value,
            missing = entity.is_missing,
            "entity"
        );
    }
    Ok(())
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    anyhow::bail!("Checkmark manages Windows registry, driver and power settings; this build target has nothing to optimize")
}

fn main() -> Result<()> {
    init_logging();
    run()
}
