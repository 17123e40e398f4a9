//! QMK settings command handlers.

use std::collections::BTreeMap;

use super::{open, CommandResult};
use anyhow::bail;
use vial_driver::DriverConfig;
use vial_keyboard::quantum::{find_setting, QuantumSetting, SettingKind, CATALOG};

fn format_value(setting: &QuantumSetting, value: u32) -> String {
    match setting.kind {
        SettingKind::Range { .. } => value.to_string(),
        SettingKind::Flags(options) => {
            let set: Vec<&str> = options
                .iter()
                .filter(|(_, bit)| value & (1 << bit) != 0)
                .map(|(name, _)| *name)
                .collect();
            if set.is_empty() {
                "(none)".to_string()
            } else {
                set.join(", ")
            }
        }
    }
}

/// Catalog pages restricted to the settings the firmware reports
fn grouped(values: &BTreeMap<u16, u32>) -> Vec<(&'static str, Vec<(&'static QuantumSetting, u32)>)> {
    CATALOG
        .iter()
        .map(|page| {
            let present = page
                .settings
                .iter()
                .filter_map(|s| values.get(&s.id).map(|&v| (s, v)))
                .collect::<Vec<_>>();
            (page.label, present)
        })
        .filter(|(_, present)| !present.is_empty())
        .collect()
}

/// Show every supported setting with its current value
pub async fn qmk_settings(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    let values = keyboard.read_all_quantum_settings().await?;
    if values.is_empty() {
        println!("Firmware reports no QMK settings");
    }

    for (label, settings) in grouped(&values) {
        println!("\n{label}:");
        for (setting, value) in settings {
            println!(
                "  [{:3}] {:<40} {}",
                setting.id,
                setting.label,
                format_value(setting, value)
            );
        }
    }

    let unknown: Vec<_> = values.iter().filter(|(id, _)| find_setting(**id).is_none()).collect();
    if !unknown.is_empty() {
        println!("\nOther:");
        for (id, value) in unknown {
            println!("  [{id:3}] 0x{value:08X}");
        }
    }
    keyboard.close().await?;
    Ok(())
}

/// Change one setting
pub async fn set_qmk(config: &DriverConfig, id: u16, value: u32) -> CommandResult {
    let Some(setting) = find_setting(id) else {
        bail!("Unknown QMK setting id {id}");
    };
    let keyboard = open(config).await?;
    keyboard.set_quantum_setting(id, value).await?;
    println!("{} = {}", setting.label, format_value(setting, value));
    keyboard.close().await?;
    Ok(())
}
