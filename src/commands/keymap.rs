//! Keymap command handlers.

use super::{open, parse_keycode, CommandResult};
use anyhow::bail;
use vial_driver::DriverConfig;

/// Show the keymap of one layer or all layers
pub async fn keymap(config: &DriverConfig, layer: Option<u8>) -> CommandResult {
    let keyboard = open(config).await?;
    let definition = keyboard.get_definition().await?;
    let converter = keyboard.keycode_converter();
    let matrix = definition.matrix;
    let layer_count = keyboard.get_layer_count().await?;

    let layers: Vec<u8> = match layer {
        Some(l) if l >= layer_count => bail!("Layer {l} out of range (keyboard has {layer_count})"),
        Some(l) => vec![l],
        None => (0..layer_count).collect(),
    };

    for layer in layers {
        let keycodes = keyboard.get_layer(layer, matrix).await?;
        println!("\nLayer {layer}:");
        let names: Vec<String> = keycodes.iter().map(|&kc| converter.name(kc)).collect();
        let width = names.iter().map(String::len).max().unwrap_or(0);
        for (row, chunk) in names.chunks(usize::from(matrix.cols).max(1)).enumerate() {
            print!("  {row:2}: ");
            for name in chunk {
                print!("{name:<width$} ");
            }
            println!();
        }
    }

    keyboard.close().await?;
    Ok(())
}

/// Assign one key
pub async fn set_key(config: &DriverConfig, layer: u8, row: u8, col: u8, key: &str) -> CommandResult {
    let keyboard = open(config).await?;
    let definition = keyboard.get_definition().await?;
    if row >= definition.matrix.rows || col >= definition.matrix.cols {
        bail!(
            "Position ({row},{col}) outside the {}x{} matrix",
            definition.matrix.rows,
            definition.matrix.cols
        );
    }
    let converter = keyboard.keycode_converter();
    let keycode = parse_keycode(&converter, key)?;

    let previous = keyboard.get_keycode(layer, row, col).await?;
    println!(
        "Layer {layer} ({row},{col}): {} -> {} (0x{keycode:04X})",
        converter.name(previous),
        converter.name(keycode)
    );
    keyboard.set_keycode(layer, row, col, keycode).await?;
    keyboard.close().await?;
    Ok(())
}
