//! Named endpoint configurations and the client factory built on them.
//!
//! A [`ModelRegistry`] is an owned value: callers build it from the
//! defaults, extend it with [`ModelRegistry::register`], and ask it for a
//! configured [`ChatOpenAI`] handle. Credentials are read from the
//! environment at lookup time and never fall back to embedded values.

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::rchain::chat_models::ChatOpenAI;

pub const DEFAULT_CONFIG_NAME: &str = "qwen-plus";

const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const MOONSHOT_BASE_URL: &str = "https://api.moonshot.cn/v1";
const SILICONFLOW_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Model identifier resolution for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ModelId {
    /// The entry always uses this identifier.
    Fixed(String),
    /// The caller supplies the identifier per client.
    Dynamic,
}

/// Where a configuration's API key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Name of an environment variable holding the key.
    Env(String),
    /// Key supplied directly at registration time.
    Literal(String),
}

impl Credential {
    pub fn env(name: impl Into<String>) -> Self {
        Self::Env(name.into())
    }

    /// Human-readable origin, never the secret itself.
    pub fn describe(&self) -> String {
        match self {
            Self::Env(name) => format!("env:{name}"),
            Self::Literal(_) => "literal".to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => f.debug_tuple("Env").field(name).finish(),
            Self::Literal(_) => f.write_str("Literal(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub model: ModelId,
    pub credential: Credential,
    pub base_url: String,
    /// Environment variable that, when set, replaces `base_url`.
    pub base_url_env: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("configuration not found: '{name}'. Available: {}", .available.join(", "))]
    ConfigNotFound { name: String, available: Vec<String> },
    #[error("missing credential for '{name}': {origin} is not set or empty")]
    MissingCredential { name: String, origin: String },
    #[error("configuration '{name}' is dynamic and requires a model identifier")]
    MissingModelId { name: String },
    #[error("configuration '{name}' has an invalid base URL '{url}'")]
    InvalidBaseUrl { name: String, url: String },
}

impl ModelConfig {
    pub fn fixed(
        name: impl Into<String>,
        model: impl Into<String>,
        credential: Credential,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: ModelId::Fixed(model.into()),
            credential,
            base_url: base_url.into(),
            base_url_env: None,
        }
    }

    pub fn dynamic(
        name: impl Into<String>,
        credential: Credential,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: ModelId::Dynamic,
            credential,
            base_url: base_url.into(),
            base_url_env: None,
        }
    }

    pub fn with_base_url_env(mut self, var: impl Into<String>) -> Self {
        self.base_url_env = Some(var.into());
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.model == ModelId::Dynamic
    }

    /// Picks the concrete identifier; dynamic entries require `requested`.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, RegistryError> {
        let requested = requested.map(str::trim).filter(|id| !id.is_empty());
        match (&self.model, requested) {
            (ModelId::Dynamic, Some(id)) => Ok(id.to_string()),
            (ModelId::Dynamic, None) => Err(RegistryError::MissingModelId {
                name: self.name.clone(),
            }),
            (ModelId::Fixed(id), requested) => {
                if let Some(requested) = requested.filter(|requested| *requested != id) {
                    warn!(
                        config = %self.name,
                        requested,
                        model = %id,
                        "ignoring model override for fixed configuration"
                    );
                }
                Ok(id.clone())
            }
        }
    }

    /// Resolves the key through `lookup`; blank values count as missing.
    pub fn resolve_credential<F>(&self, lookup: F) -> Result<String, RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = match &self.credential {
            Credential::Env(var) => lookup(var),
            Credential::Literal(value) => Some(value.clone()),
        };
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RegistryError::MissingCredential {
                name: self.name.clone(),
                origin: self.credential.describe(),
            })
    }

    /// Endpoint after applying `base_url_env`; blank values keep the configured URL.
    pub fn resolve_base_url<F>(&self, lookup: F) -> Result<String, RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = self
            .base_url_env
            .as_deref()
            .and_then(&lookup)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.base_url.trim().to_string());
        self.check_url(&url)?;
        Ok(url)
    }

    /// Accepts `http://` and `https://` endpoints only.
    pub fn validate_base_url(&self) -> Result<(), RegistryError> {
        self.check_url(self.base_url.trim())
    }

    fn check_url(&self, url: &str) -> Result<(), RegistryError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(())
        } else {
            Err(RegistryError::InvalidBaseUrl {
                name: self.name.clone(),
                url: url.to_string(),
            })
        }
    }
}

/// Per-call settings applied on top of a configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOverrides {
    /// Concrete identifier for dynamic configurations.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl ClientOverrides {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// Summary of a configuration for listings; carries no secret.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListing {
    pub name: String,
    pub model: ModelId,
    pub base_url: String,
    pub credential: String,
    pub credential_present: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    configs: BTreeMap<String, ModelConfig>,
    order: Vec<String>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in hosted endpoints. Keys are read from the environment.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(ModelConfig::fixed(
                "qwen-plus",
                "qwen-plus",
                Credential::env("DASHSCOPE_API_KEY"),
                DASHSCOPE_BASE_URL,
            ))
            .register(ModelConfig::fixed(
                "qwen-turbo",
                "qwen-turbo",
                Credential::env("DASHSCOPE_API_KEY"),
                DASHSCOPE_BASE_URL,
            ))
            .register(ModelConfig::fixed(
                "kimi-k2",
                "kimi-k2-0711-preview",
                Credential::env("MOONSHOT_API_KEY"),
                MOONSHOT_BASE_URL,
            ))
            .register(ModelConfig::dynamic(
                "siliconflow",
                Credential::env("SILICONFLOW_API_KEY"),
                SILICONFLOW_BASE_URL,
            ))
            .register(
                ModelConfig::dynamic("openai", Credential::env("OPENAI_API_KEY"), OPENAI_BASE_URL)
                    .with_base_url_env("OPENAI_API_BASE"),
            )
    }

    /// Adds or replaces the configuration stored under `config.name`.
    pub fn register(mut self, config: ModelConfig) -> Self {
        if !self.configs.contains_key(&config.name) {
            self.order.push(config.name.clone());
        }
        self.configs.insert(config.name.clone(), config);
        self
    }

    pub fn get(&self, name: &str) -> Result<&ModelConfig, RegistryError> {
        self.configs
            .get(name)
            .ok_or_else(|| RegistryError::ConfigNotFound {
                name: name.to_string(),
                available: self.order.clone(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Configurations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.order.iter().filter_map(|name| self.configs.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Lists every configuration, reporting whether its credential resolves.
    pub fn listing(&self) -> Vec<ModelListing> {
        self.iter()
            .map(|config| ModelListing {
                name: config.name.clone(),
                model: config.model.clone(),
                base_url: config
                    .resolve_base_url(env_lookup)
                    .unwrap_or_else(|_| config.base_url.clone()),
                credential: config.credential.describe(),
                credential_present: config.resolve_credential(env_lookup).is_ok(),
            })
            .collect()
    }

    /// Builds a client for `name`, reading credentials from the process environment.
    pub fn client(
        &self,
        name: &str,
        overrides: &ClientOverrides,
    ) -> Result<ChatOpenAI, RegistryError> {
        self.client_with(name, overrides, env_lookup)
    }

    /// Builds a client for `name` with an explicit credential lookup.
    pub fn client_with<F>(
        &self,
        name: &str,
        overrides: &ClientOverrides,
        lookup: F,
    ) -> Result<ChatOpenAI, RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self.get(name)?;
        let base_url = config.resolve_base_url(&lookup)?;
        let model = config.resolve_model(overrides.model.as_deref())?;
        let api_key = config.resolve_credential(&lookup)?;

        debug!(
            config = %config.name,
            model = %model,
            base_url = %base_url,
            credential = %config.credential.describe(),
            "resolved chat client"
        );

        let mut client = ChatOpenAI::new(model, api_key, base_url);
        if let Some(temperature) = overrides.temperature {
            client = client.temperature(temperature);
        }
        if let Some(max_tokens) = overrides.max_tokens {
            client = client.max_tokens(max_tokens);
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            client = client.timeout_secs(timeout_secs);
        }
        if let Some(retries) = overrides.retries {
            client = client.retries(retries);
        }
        if let Some(retry_delay_ms) = overrides.retry_delay_ms {
            client = client.retry_delay_ms(retry_delay_ms);
        }
        Ok(client)
    }

    /// Client for [`DEFAULT_CONFIG_NAME`].
    pub fn default_client(&self, overrides: &ClientOverrides) -> Result<ChatOpenAI, RegistryError> {
        self.client(DEFAULT_CONFIG_NAME, overrides)
    }

    /// Client for a dynamic platform with the given model identifier.
    pub fn dynamic_client(&self, platform: &str, model: &str) -> Result<ChatOpenAI, RegistryError> {
        self.client(platform, &ClientOverrides::with_model(model))
    }
}

fn env_lookup(var: &str) -> Option<String> {
    env::var(var).ok()
}
