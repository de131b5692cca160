use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::rchain::registry::{Credential, ModelConfig, ModelRegistry, RegistryError};

const OUTPUT_MODES: [&str; 2] = ["text", "json"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot resolve config path: set CF_CONFIG or HOME/XDG_CONFIG_HOME.")]
    NoConfigPath,
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Profile '{name}' not found in config file '{}'.", .path.display())]
    ProfileNotFound { name: String, path: PathBuf },
    #[error("Invalid profile {field} '{value}' in profile '{profile}'.")]
    InvalidProfile {
        profile: String,
        field: &'static str,
        value: String,
    },
    #[error("Model entry '{name}' stores a literal api_key; use api_key_env instead.")]
    LiteralApiKey { name: String },
    #[error("Model entry '{name}' is missing '{field}'.")]
    MissingField { name: String, field: &'static str },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ProfileConfig {
    /// Registry configuration name.
    pub model: Option<String>,
    /// Model identifier for dynamic configurations.
    pub dynamic_model: Option<String>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub output: Option<String>,
    pub show_usage: Option<bool>,
}

/// `[models.<name>]` entry; a missing `model` makes the entry dynamic.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ModelEntry {
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable that replaces `base_url` when set.
    pub base_url_env: Option<String>,
    api_key: Option<toml::Value>,
}

impl ModelEntry {
    pub fn to_config(&self, name: &str) -> Result<ModelConfig, ConfigError> {
        if self.api_key.is_some() {
            return Err(ConfigError::LiteralApiKey {
                name: name.to_string(),
            });
        }
        let required = |value: &Option<String>, field| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingField {
                    name: name.to_string(),
                    field,
                })
        };
        let credential = Credential::env(required(&self.api_key_env, "api_key_env")?);
        let base_url = required(&self.base_url, "base_url")?;

        let config = match self.model.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(model) => ModelConfig::fixed(name, model, credential, base_url),
            None => ModelConfig::dynamic(name, credential, base_url),
        };
        let config = match self.base_url_env.as_deref().map(str::trim).filter(|var| !var.is_empty()) {
            Some(var) => config.with_base_url_env(var),
            None => config,
        };
        config.validate_base_url()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
    #[serde(default)]
    pub models: HashMap<String, ModelEntry>,
}

impl ConfigFile {
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Built-in registry extended with the `[models]` entries, sorted by name.
    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        let mut names = self.models.keys().collect::<Vec<_>>();
        names.sort();
        names.into_iter().try_fold(ModelRegistry::with_defaults(), |registry, name| {
            Ok(registry.register(self.models[name].to_config(name)?))
        })
    }
}

impl ProfileConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |field, value: String| ConfigError::InvalidProfile {
            profile: name.to_string(),
            field,
            value,
        };
        if let Some(output) = &self.output {
            if !OUTPUT_MODES.contains(&output.as_str()) {
                return Err(invalid("output", output.clone()));
            }
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid("temperature", temperature.to_string()));
            }
        }
        Ok(())
    }
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, ConfigError> {
    let path = config_path()?;
    let config = ConfigFile::read(&path)?;
    let profile = config
        .profiles
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
            path: path.clone(),
        })?;
    profile.validate(name)?;
    debug!(profile = name, path = %path.display(), "loaded profile");
    Ok(profile)
}

/// Registry for this process: defaults plus any `[models]` in the config file.
/// A missing config file is not an error here.
pub fn load_registry() -> Result<ModelRegistry, ConfigError> {
    let path = match config_path() {
        Ok(path) if path.exists() => path,
        _ => return Ok(ModelRegistry::with_defaults()),
    };
    ConfigFile::read(&path)?.registry()
}

/// Checks the whole file, and that `profile` exists when given.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, ConfigError> {
    let path = config_path()?;
    let config = ConfigFile::read(&path)?;
    for (name, entry) in &config.profiles {
        entry.validate(name)?;
    }
    config.registry()?;
    if let Some(name) = profile {
        if !config.profiles.contains_key(name) {
            return Err(ConfigError::ProfileNotFound {
                name: name.to_string(),
                path,
            });
        }
    }
    Ok(path)
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    config_path_with(|var| env::var(var).ok())
}

/// `CF_CONFIG`, then the XDG config dir, then `~/.config`.
pub fn config_path_with<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |var| {
        lookup(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(path) = non_empty("CF_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("chatforge").join("config.toml"));
    }
    let home = non_empty("HOME").ok_or(ConfigError::NoConfigPath)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("chatforge")
        .join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ConfigFile, config_path_with};
    use crate::rchain::registry::ModelId;
    use std::path::{Path, PathBuf};

    fn parse(raw: &str) -> Result<ConfigFile, ConfigError> {
        ConfigFile::parse(raw, Path::new("config.toml"))
    }

    #[test]
    fn config_path_prefers_explicit_then_xdg_then_home() {
        let lookup = |var: &str| match var {
            "CF_CONFIG" => Some("/tmp/explicit.toml".to_string()),
            "XDG_CONFIG_HOME" => Some("/xdg".to_string()),
            "HOME" => Some("/home/me".to_string()),
            _ => None,
        };
        assert_eq!(
            config_path_with(lookup).expect("path"),
            PathBuf::from("/tmp/explicit.toml")
        );

        let lookup = |var: &str| (var == "XDG_CONFIG_HOME").then(|| "/xdg".to_string());
        assert_eq!(
            config_path_with(lookup).expect("path"),
            PathBuf::from("/xdg/chatforge/config.toml")
        );

        let lookup = |var: &str| match var {
            "CF_CONFIG" => Some("  ".to_string()),
            "HOME" => Some("/home/me".to_string()),
            _ => None,
        };
        assert_eq!(
            config_path_with(lookup).expect("path"),
            PathBuf::from("/home/me/.config/chatforge/config.toml")
        );

        assert!(matches!(
            config_path_with(|_| None),
            Err(ConfigError::NoConfigPath)
        ));
    }

    #[test]
    fn model_entries_extend_the_registry() {
        let config = parse(
            "[models.local]\nbase_url = \"http://localhost:8000/v1\"\napi_key_env = \"LOCAL_KEY\"\nbase_url_env = \"LOCAL_BASE\"\n\
             [models.deepseek]\nmodel = \"deepseek-chat\"\nbase_url = \"https://api.deepseek.com/v1\"\napi_key_env = \"DEEPSEEK_API_KEY\"\n",
        )
        .expect("config parses");
        let registry = config.registry().expect("registry builds");

        let local = registry.get("local").expect("local");
        assert_eq!(local.model, ModelId::Dynamic);
        assert_eq!(local.base_url_env.as_deref(), Some("LOCAL_BASE"));
        assert_eq!(
            registry.get("deepseek").expect("deepseek").model,
            ModelId::Fixed("deepseek-chat".to_string())
        );
        assert!(registry.contains("qwen-plus"));
        assert_eq!(registry.names().last().map(String::as_str), Some("local"));
    }

    #[test]
    fn literal_api_keys_are_rejected() {
        let config = parse(
            "[models.leaky]\nbase_url = \"https://x.test/v1\"\napi_key = \"sk-123\"\n",
        )
        .expect("config parses");
        let err = config.registry().expect_err("literal key rejected");
        assert!(matches!(err, ConfigError::LiteralApiKey { ref name } if name == "leaky"));
        assert!(!err.to_string().contains("sk-123"));
    }

    #[test]
    fn model_entries_need_env_and_url() {
        let config = parse("[models.partial]\nbase_url = \"https://x.test/v1\"\n").expect("parses");
        assert!(matches!(
            config.registry(),
            Err(ConfigError::MissingField { field: "api_key_env", .. })
        ));

        let config = parse("[models.bad]\nbase_url = \"ftp://x\"\napi_key_env = \"K\"\n").expect("parses");
        assert!(matches!(config.registry(), Err(ConfigError::Registry(_))));
    }

    #[test]
    fn profile_output_and_temperature_are_validated() {
        let config = parse("[profiles.p]\noutput = \"yaml\"\n").expect("parses");
        let err = config.profiles["p"].validate("p").expect_err("bad output");
        assert_eq!(err.to_string(), "Invalid profile output 'yaml' in profile 'p'.");

        let config = parse("[profiles.p]\ntemperature = 3.5\n").expect("parses");
        assert!(config.profiles["p"].validate("p").is_err());
    }

    #[test]
    fn malformed_toml_reports_the_path() {
        let err = parse("[profiles.bad\nmodel = 1").expect_err("parse fails");
        assert!(err.to_string().starts_with("Failed to parse config file 'config.toml'"));
    }
}
