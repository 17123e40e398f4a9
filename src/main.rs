//! vialctl - VIA/Vial keyboard CLI
//!
//! A command-line interface for inspecting and configuring keyboards that
//! run VIA or Vial firmware.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vial_driver::DriverConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    let mut config = DriverConfig::load(&config_path)?;
    cli.apply(&mut config);

    match cli.command {
        // === Utility Commands ===
        Some(Commands::List) => commands::utility::list(&config).await?,
        Some(Commands::ResetEeprom) => commands::utility::reset_eeprom(&config).await?,

        // === Query Commands ===
        None | Some(Commands::Info) => commands::query::info(&config).await?,

        // === Keymap Commands ===
        Some(Commands::Keymap { layer }) => commands::keymap::keymap(&config, layer).await?,
        Some(Commands::SetKey {
            layer,
            row,
            col,
            key,
        }) => commands::keymap::set_key(&config, layer, row, col, &key).await?,

        // === Macro Commands ===
        Some(Commands::Macro { index }) => commands::macros::get_macro(&config, index).await?,
        Some(Commands::SetMacro { index, text }) => {
            commands::macros::set_macro(&config, index, &text).await?
        }

        // === Dynamic Entry Commands ===
        Some(Commands::Tapdance) => commands::dynamic::tap_dances(&config).await?,
        Some(Commands::Combo) => commands::dynamic::combos(&config).await?,
        Some(Commands::Override) => commands::dynamic::key_overrides(&config).await?,

        // === QMK Settings ===
        Some(Commands::QmkSettings) => commands::quantum::qmk_settings(&config).await?,
        Some(Commands::SetQmk { id, value }) => {
            commands::quantum::set_qmk(&config, id, value).await?
        }

        // === Backup Commands ===
        Some(Commands::Backup { file }) => commands::backup::backup(&config, &file).await?,
        Some(Commands::Restore { file }) => commands::backup::restore(&config, &file).await?,
    }

    Ok(())
}
