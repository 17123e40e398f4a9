//! Query command handlers.

use super::{open, CommandResult};
use vial_driver::DriverConfig;
use vial_keyboard::KeyboardError;

/// Show device identity and table sizes
pub async fn info(config: &DriverConfig) -> CommandResult {
    let keyboard = open(config).await?;
    let info = keyboard.channel().transport().device_info().clone();
    let definition = keyboard.get_definition().await?;

    println!("Device:          {}", info.display_name());
    println!(
        "VID/PID:         {:04X}:{:04X} ({:?})",
        info.vid, info.pid, info.transport_type
    );
    if let Some(name) = &definition.name {
        println!("Definition:      {name}");
    }

    let via = keyboard.get_protocol_version().await?;
    let id = keyboard.get_keyboard_id().await?;
    println!("VIA protocol:    {via}");
    println!("Vial protocol:   {}", id.protocol);
    println!("Keyboard UID:    {}", id.uid_hex());

    let layers = keyboard.get_layer_count().await?;
    println!(
        "Matrix:          {} rows x {} cols, {layers} layers, {} encoders",
        definition.matrix.rows,
        definition.matrix.cols,
        definition.encoder_count()
    );
    println!(
        "Layout options:  0x{:08X}",
        keyboard.get_layout_options().await?
    );
    println!("Uptime:          {} ms", keyboard.get_uptime().await?);

    let macros = keyboard.get_macro_count().await?;
    let buffer = keyboard.get_macro_buffer_size().await?;
    println!("Macros:          {macros} slots, {buffer} byte buffer");

    // Dynamic entries are optional in Vial firmware
    match keyboard.get_dynamic_entry_counts().await {
        Ok(counts) => {
            println!(
                "Dynamic entries: {} tap dance, {} combo, {} key override",
                counts.tap_dance, counts.combo, counts.key_override
            );
            println!(
                "Features:        caps_word={} layer_lock={}",
                counts.has_caps_word(),
                counts.has_layer_lock()
            );
        }
        Err(KeyboardError::Transport(e)) => return Err(e.into()),
        Err(e) => println!("Dynamic entries: unavailable ({e})"),
    }

    let status = keyboard.get_unlock_status().await?;
    println!(
        "Lock:            {}",
        if status.unlocked { "unlocked" } else { "locked" }
    );
    if !status.unlocked && !status.unlock_keys.is_empty() {
        let keys: Vec<String> = status
            .unlock_keys
            .iter()
            .map(|k| format!("({},{})", k.row, k.col))
            .collect();
        println!("Unlock keys:     {}", keys.join(" "));
    }

    keyboard.close().await?;
    Ok(())
}
