use std::path::Path;

use crate::commands::common::load_config;
use crate::error::CliError;

pub fn run_config_show(config_path: &Path, as_json: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    println!("Config file: {source}");
    println!("Editor: {}", config.editor);
    println!("Role: {}", config.role);
    println!("Resubmit policy: {:?}", config.resubmit_policy);
    println!("History limit: {}", config.history_limit);
    println!("Send expected version: {}", config.send_expected_version);
    Ok(())
}
