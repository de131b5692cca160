use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config;

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    /// Validate the config file, its profiles and model entries.
    Check {
        /// Also require this profile to exist.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Print the config file location.
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigSubcommand::Check { profile } => {
            let path = config::validate_config(profile.as_deref())?;
            println!("config OK: {}", path.display());
        }
        ConfigSubcommand::Path => {
            println!("{}", config::config_path()?.display());
        }
    }
    Ok(())
}
