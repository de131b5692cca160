//! Subcommand implementations shared by the `chatforge` and `cfeval` binaries.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::eval::model::{JUDGE_MAX_TOKENS, JUDGE_TEMPERATURE};
use crate::rchain::chat_models::ChatOpenAI;
use crate::rchain::registry::{ClientOverrides, DEFAULT_CONFIG_NAME};

pub mod ask;
pub mod batch;
pub mod config;
pub mod eval;
pub mod models;
pub mod structured;

/// Version line with build metadata from `build.rs`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("CF_GIT_SHA"),
    ", built: ",
    env!("CF_BUILD_TS"),
    ")"
);

/// Client selection flags shared by `batch`, `structured` and `eval`.
#[derive(Debug, Args, Clone, Default)]
pub struct ClientArgs {
    /// Registry configuration to use.
    #[arg(short = 'm', long = "config-name", default_value = DEFAULT_CONFIG_NAME)]
    pub config_name: String,
    /// Model identifier for dynamic configurations.
    #[arg(long)]
    pub dynamic_model: Option<String>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub retries: Option<u32>,
}

impl ClientArgs {
    pub fn overrides(&self) -> ClientOverrides {
        ClientOverrides {
            model: self.dynamic_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout,
            retries: self.retries,
            retry_delay_ms: None,
        }
    }

    /// Overrides for a judge: unset sampling flags fall back to the judge defaults.
    pub fn judge_overrides(&self) -> ClientOverrides {
        let mut overrides = self.overrides();
        overrides.temperature.get_or_insert(JUDGE_TEMPERATURE);
        overrides.max_tokens.get_or_insert(JUDGE_MAX_TOKENS);
        overrides
    }

    /// Client from the registry, including `[models]` entries of the config file.
    pub fn client(&self) -> Result<ChatOpenAI> {
        self.client_with(&self.overrides())
    }

    pub fn judge_client(&self) -> Result<ChatOpenAI> {
        self.client_with(&self.judge_overrides())
    }

    fn client_with(&self, overrides: &ClientOverrides) -> Result<ChatOpenAI> {
        let registry = crate::config::load_registry()?;
        Ok(registry.client(&self.config_name, overrides)?)
    }
}

/// Prompt from the argument, else from piped stdin.
pub(crate) fn read_prompt(argument: Option<String>) -> Result<String> {
    if let Some(prompt) = argument.filter(|prompt| !prompt.trim().is_empty()) {
        return Ok(prompt);
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        bail!("No prompt provided. Pass PROMPT or pipe text on stdin.");
    }
    let mut buffer = String::new();
    stdin
        .lock()
        .read_to_string(&mut buffer)
        .context("Failed to read prompt from stdin")?;
    let prompt = buffer.trim_end_matches(['\r', '\n']).to_string();
    if prompt.trim().is_empty() {
        bail!("No prompt provided. Pass PROMPT or pipe text on stdin.");
    }
    Ok(prompt)
}

/// Writes `contents` to `path`, creating parent directories and replacing any existing file.
pub(crate) fn save_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create output directory '{}'", parent.display())
        })?;
    }
    fs::write(path, contents)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}

/// Parses a `key=value` command-line pair.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{ClientArgs, parse_key_value, save_output};
    use crate::eval::model::{JUDGE_MAX_TOKENS, JUDGE_TEMPERATURE};

    #[test]
    fn judge_defaults_fill_only_unset_sampling_flags() {
        let unset = ClientArgs::default().judge_overrides();
        assert_eq!(unset.temperature, Some(JUDGE_TEMPERATURE));
        assert_eq!(unset.max_tokens, Some(JUDGE_MAX_TOKENS));

        let explicit = ClientArgs {
            temperature: Some(0.9),
            max_tokens: Some(7),
            ..ClientArgs::default()
        }
        .judge_overrides();
        assert_eq!(explicit.temperature, Some(0.9));
        assert_eq!(explicit.max_tokens, Some(7));
    }

    #[test]
    fn key_value_pairs_split_on_first_equals() {
        assert_eq!(
            parse_key_value("question=2+2=?"),
            Ok(("question".to_string(), "2+2=?".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn save_output_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.txt");
        save_output(&path, "first").expect("first write");
        save_output(&path, "second").expect("second write");
        assert_eq!(std::fs::read_to_string(&path).expect("read back"), "second");
    }
}
