//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::Result;
use std::path::PathBuf;

/// Run the config command.
pub fn run_config(action: &ConfigAction, config_path: Option<&PathBuf>, settings: Settings) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            if !path.exists() {
                Output::info(&format!(
                    "No config file at {}; showing defaults with environment overrides.",
                    path.display()
                ));
            }
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }

    Ok(())
}
