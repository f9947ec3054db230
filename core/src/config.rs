//! Client configuration and layered loading.
//!
//! Precedence: defaults < TOML file < environment (`NOTAKU_*`, nested keys
//! split on `__`, e.g. `NOTAKU_STORAGE__TOKEN_KEY`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "NOTAKU_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Backend service a request is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Service {
    /// Main API (auth, notes, receipts, chat, subscription).
    #[default]
    Api,
    /// Integration service (OCR and structure extraction).
    Integration,
}

/// Durable storage keys for the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub token_key: String,
    pub user_key: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            token_key: "auth_token".to_string(),
            user_key: "auth_user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub integration_base_url: String,
    /// Verbose per-exchange logging.
    pub debug: bool,
    /// Keep and send cookies alongside the bearer token.
    pub include_credentials: bool,
    pub user_agent: String,
    pub storage: StorageKeys,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            integration_base_url: "http://localhost:8001".to_string(),
            debug: false,
            include_credentials: true,
            user_agent: format!("notaku-core/{}", env!("CARGO_PKG_VERSION")),
            storage: StorageKeys::default(),
        }
    }
}

impl ClientConfig {
    /// Config pointing both services at `base_url`. Mostly for tests and
    /// single-host deployments.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api_base_url: base_url.to_string(),
            integration_base_url: base_url.to_string(),
            ..Self::default()
        }
        .normalized()
    }

    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: ClientConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// `<config dir>/notaku/client.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("notaku").join("client.toml"))
    }

    pub fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Api => &self.api_base_url,
            Service::Integration => &self.integration_base_url,
        }
    }

    fn normalized(mut self) -> Self {
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        self.integration_base_url = self.integration_base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("api_base_url", &self.api_base_url)?;
        validate_base_url("integration_base_url", &self.integration_base_url)?;

        if self.storage.token_key.is_empty() || self.storage.user_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "storage",
                reason: "storage keys must not be empty".to_string(),
            });
        }
        if self.storage.token_key == self.storage.user_key {
            return Err(ConfigError::Invalid {
                field: "storage",
                reason: "token_key and user_key must differ".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_base_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{value:?}: {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}
