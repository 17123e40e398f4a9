//! Macro command handlers.

use super::{open, CommandResult};
use vial_driver::DriverConfig;
use vial_keyboard::{KeycodeConverter, MacroAction};

fn describe(action: &MacroAction, converter: &KeycodeConverter) -> String {
    match action {
        MacroAction::Text(bytes) => format!("text  {:?}", String::from_utf8_lossy(bytes)),
        MacroAction::Tap(kc) => format!("tap   {}", converter.name(*kc)),
        MacroAction::Down(kc) => format!("down  {}", converter.name(*kc)),
        MacroAction::Up(kc) => format!("up    {}", converter.name(*kc)),
        MacroAction::Delay(ms) => format!("delay {ms} ms"),
    }
}

/// Show the actions of one macro
pub async fn get_macro(config: &DriverConfig, index: u8) -> CommandResult {
    let keyboard = open(config).await?;
    let converter = keyboard.keycode_converter();

    let actions = keyboard.get_macro(index).await?;
    if actions.is_empty() {
        println!("Macro {index}: (empty)");
    } else {
        println!("Macro {index}:");
        for action in &actions {
            println!("  {}", describe(action, &converter));
        }
    }
    keyboard.close().await?;
    Ok(())
}

/// Replace a macro with a text action
pub async fn set_macro(config: &DriverConfig, index: u8, text: &str) -> CommandResult {
    let keyboard = open(config).await?;

    let actions = if text.is_empty() {
        Vec::new()
    } else {
        vec![MacroAction::text(text)]
    };
    keyboard.set_macro(index, &actions).await?;
    println!("Macro {index} set ({} bytes)", text.len());
    keyboard.close().await?;
    Ok(())
}
