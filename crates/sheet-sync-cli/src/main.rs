//! sheet-sync CLI - Inspect character sheets and replay sync scenarios
//!
//! Runs collaborating clients against an in-memory sheet server so conflict
//! handling can be exercised from the terminal.

mod cli;
mod commands;
mod error;


use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::common::{load_config, resolve_config_path};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config_show;
use crate::commands::inspect::run_inspect;
use crate::commands::simulate::run_simulate;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "sheet_sync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Some(Commands::Inspect { sheet, json }) => run_inspect(&sheet, json)?,
        Some(Commands::Simulate { script, json }) => {
            let config = load_config(&config_path)?;
            run_simulate(&script, &config, json).await?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Config {
            command: ConfigCommands::Show { json },
        }) => run_config_show(&config_path, json)?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
