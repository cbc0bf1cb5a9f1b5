//! nanobridge configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::correlator::CorrelatorConfig;

/// Path the webhook is mounted under; the webhook id is appended
pub const WEBHOOK_PATH: &str = "/api/webhook";

/// Main nanobridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Agent backend connection
    pub backend: BackendConfig,

    /// HTTP server for callbacks and the conversation API
    pub server: ServerConfig,

    /// Pending request table
    pub correlator: CorrelatorConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// A missing backend URL is allowed: the backend may register one at
    /// runtime, and requests without any address fail at call time.
    pub fn validate(&self) -> Result<()> {
        if self.backend.request_timeout_secs == 0 {
            return Err(eyre!("backend.request-timeout-secs must be greater than zero"));
        }
        if self.backend.connect_timeout_ms == 0 {
            return Err(eyre!("backend.connect-timeout-ms must be greater than zero"));
        }
        if self.backend.ack_timeout_ms == 0 {
            return Err(eyre!("backend.ack-timeout-ms must be greater than zero"));
        }
        if self.server.webhook_id.trim().is_empty() {
            return Err(eyre!("server.webhook-id must not be empty"));
        }
        self.server.bind_addr()?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .nanobridge.yml
        let local_config = PathBuf::from(".nanobridge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/nanobridge/nanobridge.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load only the log level, ignoring any config errors
    ///
    /// Used before logging is set up, so failures are reported later by the
    /// full load.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    /// Default location of the user config file
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nanobridge").join("nanobridge.yml"))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Write this configuration as YAML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_yaml()?).context(format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote config to: {}", path.display());
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Address the backend should POST callbacks to, when publicly reachable
    pub fn reply_to(&self) -> Option<String> {
        let base = self.server.public_url.as_deref()?.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}{}/{}", base, WEBHOOK_PATH, self.server.webhook_id))
    }
}

/// Agent backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Where to POST utterances; may instead be registered at runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Friendly display name of the agent
    #[serde(rename = "agent-name")]
    pub agent_name: String,

    /// How long a caller waits for the callback
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout of the outbound POST
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// How long the backend has to acknowledge the outbound POST
    #[serde(rename = "ack-timeout-ms")]
    pub ack_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            agent_name: "Nanobot".to_string(),
            request_timeout_secs: 30,
            connect_timeout_ms: 5000,
            ack_timeout_ms: 5000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Stable id the agent reports to the backend
    pub fn agent_id(&self) -> String {
        let slug: String = self
            .agent_name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("nanobridge_{}_agent", slug)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(rename = "bind-addr")]
    pub bind_addr: String,

    /// Externally reachable base URL, used to build the reply-to address
    #[serde(rename = "public-url", skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Secret path segment of the callback webhook
    #[serde(rename = "webhook-id")]
    pub webhook_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8123".to_string(),
            public_url: None,
            webhook_id: generate_webhook_id(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| eyre!("Invalid server.bind-addr '{}': {}", self.bind_addr, e))
    }
}

/// Random 32-character hex webhook id
pub fn generate_webhook_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}
