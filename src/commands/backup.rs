//! Backup and restore command handlers.

use std::path::Path;

use super::{open, CommandResult};
use anyhow::Context;
use vial_driver::DriverConfig;
use vial_keyboard::KeyboardSnapshot;

/// Save the decoded configuration as JSON
pub async fn backup(config: &DriverConfig, file: &Path) -> CommandResult {
    let keyboard = open(config).await?;
    println!("Reading configuration...");
    let snapshot = keyboard.export_snapshot().await?;
    let json = snapshot.to_json()?;
    std::fs::write(file, json).with_context(|| format!("Failed to write {}", file.display()))?;
    println!(
        "Saved {} layers, {} tap dances and {} QMK settings to {}",
        snapshot.layers.len(),
        snapshot.tap_dance.len(),
        snapshot.quantum_settings.len(),
        file.display()
    );
    keyboard.close().await?;
    Ok(())
}

/// Restore a JSON backup
pub async fn restore(config: &DriverConfig, file: &Path) -> CommandResult {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let snapshot = KeyboardSnapshot::from_json(&json)?;

    let keyboard = open(config).await?;
    println!("Restoring configuration from keyboard {}...", snapshot.uid);
    keyboard.import_snapshot(&snapshot).await?;
    println!("Restore complete");
    keyboard.close().await?;
    Ok(())
}
