use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "ALPHA_VANTAGE_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

#[derive(Debug, Deserialize)]
pub struct AlphaVantageSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl AlphaVantageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub alpha_vantage: AlphaVantageSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    /// The upstream credential; present once `new` has succeeded
    pub fn api_key(&self) -> &str {
        self.alpha_vantage.api_key.as_deref().unwrap_or_default()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());

        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Upstream defaults
            .set_default("alpha_vantage.base_url", default_base_url())?
            .set_default("alpha_vantage.timeout_secs", default_timeout_secs())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("FINANCE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // The conventional variable wins over FINANCE_ALPHA_VANTAGE__API_KEY
            .set_override_option("alpha_vantage.api_key", api_key)?
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(config::ConfigError::NotFound(field)) => {
                return Err(ConfigError::MissingEnvVar {
                    env_var: to_env_var(&field),
                })
            }
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(ConfigError::Other(err));
            }
        };

        match settings.alpha_vantage.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(settings),
            _ => Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("alpha_vantage.api_key"),
            }),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "https://www.alphavantage.co/query".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}
