use anyhow::Result;
use clap::Args;

use crate::config;
use crate::rchain::registry::{DEFAULT_CONFIG_NAME, ModelId};

#[derive(Debug, Args, Clone)]
pub struct ModelsArgs {
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ModelsArgs) -> Result<()> {
    let listing = config::load_registry()?.listing();
    if args.json {
        println!("{}", serde_json::to_string(&listing)?);
        return Ok(());
    }
    for entry in listing {
        let model = match &entry.model {
            ModelId::Fixed(id) => id.as_str(),
            ModelId::Dynamic => "<dynamic>",
        };
        let marker = if entry.name == DEFAULT_CONFIG_NAME { "*" } else { " " };
        let key = if entry.credential_present { "set" } else { "missing" };
        println!(
            "{marker} {:<12} {:<24} {:<52} {} ({key})",
            entry.name, model, entry.base_url, entry.credential
        );
    }
    Ok(())
}
