//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/cloudcal/config.toml` by default.
//!
//! The `password` value supports secret references:
//! - `pass::path/in/store`: resolved via `pass show`
//! - `env::VAR_NAME`: resolved from the environment
//! - plain text: used as-is

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cloudcal_client::{AccountConfig, ServiceConfig};

/// Configuration for the cloudcal CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Debug mode.
    pub debug: bool,

    /// Account settings.
    pub account: AccountSettings,

    /// Service endpoint settings.
    pub service: ServiceSettings,
}

/// Account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    /// Account name, usually an email address.
    pub username: Option<String>,

    /// Password (supports `pass::` and `env::` prefixes). When absent, the
    /// vault or an interactive prompt supplies it.
    pub password: Option<String>,

    /// IANA timezone sent with calendar queries.
    pub usertz: String,

    /// Ask the provider to trust this device after a second factor.
    pub trust_device: bool,

    /// Store credentials in the encrypted vault after `login`.
    pub save_credentials: bool,

    /// Directory for the trust store and credential vault.
    pub data_dir: Option<PathBuf>,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            usertz: "UTC".to_string(),
            trust_device: true,
            save_credentials: false,
            data_dir: None,
        }
    }
}

/// Service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Forwarding relay endpoint. Requests go out directly when absent.
    pub relay_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout: u64,

    /// Override the user agent string.
    pub user_agent: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            relay_url: None,
            timeout: ServiceConfig::DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl CliConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {e}"))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cloudcal")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cloudcal")
    }

    /// The directory holding the trust store and vault.
    pub fn data_dir(&self) -> PathBuf {
        self.account
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Builds the service configuration, applying relay, timeout and user
    /// agent overrides.
    pub fn to_service_config(&self) -> Result<ServiceConfig, String> {
        let mut service = ServiceConfig::icloud();
        if let Some(ref relay) = self.service.relay_url {
            service = service
                .with_relay(relay)
                .map_err(|e| format!("invalid relay_url: {e}"))?;
        }
        service = service.with_timeout(Duration::from_secs(self.service.timeout));
        if let Some(ref agent) = self.service.user_agent {
            service = service.with_user_agent(agent.clone());
        }
        Ok(service)
    }

    /// Builds the per-account client settings for `username`.
    pub fn to_account_config(&self, username: &str) -> AccountConfig {
        AccountConfig::new(username, self.data_dir())
            .with_usertz(self.account.usertz.clone())
            .with_trust_device(self.account.trust_device)
    }

    /// Resolves the configured password, expanding secret references.
    pub fn resolve_password(&self) -> Result<Option<String>, String> {
        match self.account.password.as_deref() {
            Some(raw) => crate::secret::resolve(raw)
                .map(Some)
                .map_err(|e| format!("failed to resolve password: {e}")),
            None => Ok(None),
        }
    }
}
