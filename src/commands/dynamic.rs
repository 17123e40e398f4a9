//! Tap-dance, combo and key-override command handlers.

use super::{open, CommandResult};
use vial_driver::DriverConfig;
use vial_keyboard::{Combo, KeyOverride, KeycodeConverter, OverrideOptions, TapDance};

fn describe_tap_dance(td: &TapDance, conv: &KeycodeConverter) -> String {
    format!(
        "tap={} hold={} double_tap={} tap_hold={} term={}ms",
        conv.name(td.on_tap),
        conv.name(td.on_hold),
        conv.name(td.on_double_tap),
        conv.name(td.on_tap_hold),
        td.tapping_term
    )
}

fn describe_combo(combo: &Combo, conv: &KeycodeConverter) -> String {
    let keys: Vec<String> = combo
        .keys
        .iter()
        .filter(|&&kc| kc != 0)
        .map(|&kc| conv.name(kc))
        .collect();
    format!("{} -> {}", keys.join(" + "), conv.name(combo.output))
}

fn describe_override(ko: &KeyOverride, conv: &KeycodeConverter) -> String {
    let layers: Vec<String> = (0..16)
        .filter(|&l| ko.on_layer(l))
        .map(|l| l.to_string())
        .collect();
    format!(
        "{} -> {} layers=[{}] mods=0x{:02X} negative=0x{:02X} suppressed=0x{:02X} options=0x{:02X}{}",
        conv.name(ko.trigger),
        conv.name(ko.replacement),
        layers.join(","),
        ko.trigger_mods,
        ko.negative_mod_mask,
        ko.suppressed_mods,
        ko.options.0,
        if ko.options.has(OverrideOptions::ENABLED) {
            ""
        } else {
            " (disabled)"
        }
    )
}

/// Show all tap-dance entries
pub async fn tap_dances(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    let conv = keyboard.keycode_converter();
    let counts = keyboard.get_dynamic_entry_counts().await?;
    let indices: Vec<u8> = (0..counts.tap_dance).collect();

    println!("Tap dance ({} entries):", counts.tap_dance);
    for (i, td) in indices.iter().zip(keyboard.get_tap_dances(&indices).await?) {
        if td != TapDance::default() {
            println!("  TD({i:2}): {}", describe_tap_dance(&td, &conv));
        }
    }
    keyboard.close().await?;
    Ok(())
}

/// Show all combo entries
pub async fn combos(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    let conv = keyboard.keycode_converter();
    let counts = keyboard.get_dynamic_entry_counts().await?;
    let indices: Vec<u8> = (0..counts.combo).collect();

    println!("Combos ({} entries):", counts.combo);
    for (i, combo) in indices.iter().zip(keyboard.get_combos(&indices).await?) {
        if combo != Combo::default() {
            println!("  {i:2}: {}", describe_combo(&combo, &conv));
        }
    }
    keyboard.close().await?;
    Ok(())
}

/// Show all key-override entries
pub async fn key_overrides(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    let conv = keyboard.keycode_converter();
    let counts = keyboard.get_dynamic_entry_counts().await?;
    let indices: Vec<u8> = (0..counts.key_override).collect();

    println!("Key overrides ({} entries):", counts.key_override);
    for (i, ko) in indices.iter().zip(keyboard.get_key_overrides(&indices).await?) {
        if ko != KeyOverride::default() {
            println!("  {i:2}: {}", describe_override(&ko, &conv));
        }
    }
    keyboard.close().await?;
    Ok(())
}
