//! Config command - View and initialize configuration

use anyhow::{Context, Result};
use clap::Subcommand;
use pathdata_config::ConfigLoader;

use super::{CommandContext, OutputFormat};

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Output format
        #[arg(long, short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Write a default config file unless one exists
    Init {
        /// Initialize ~/.pathdata/config.toml instead of the workspace file
        #[arg(long)]
        global: bool,
    },

    /// Show configuration file paths
    Path,
}

/// Execute the config command
pub fn execute(cmd: ConfigCommand, ctx: &CommandContext) -> Result<()> {
    let loader = ConfigLoader::new();
    match cmd {
        ConfigCommand::Show { output } => match output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ctx.config)?),
            OutputFormat::Text => print!("{}", toml::to_string_pretty(&ctx.config)?),
        },
        ConfigCommand::Init { global } => {
            let path = if global {
                loader.init_global()
            } else {
                loader.init_local(&ctx.workspace)
            }
            .context("Failed to initialize configuration")?;
            println!("{}", path.display());
        }
        ConfigCommand::Path => {
            if let Some(ref file) = ctx.config_file {
                println!("explicit: {}", file.display());
            }
            if let Some(global) = loader.global_config_path() {
                println!("global:   {}", global.display());
            }
            println!("local:    {}", loader.local_config_path(&ctx.workspace).display());
        }
    }
    Ok(())
}
