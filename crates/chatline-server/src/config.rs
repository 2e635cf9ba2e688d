//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML configuration file (`$CHATLINE_CONFIG`, else the first
//!   `chatline.toml` found on the search path)
//! - Environment variables (`CHATLINE__SECTION__KEY`)

use anyhow::{Context, Result};
use chatline_core::ChatConfig;
use chatline_protocol::Encoding;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "chatline.toml",
    "/etc/chatline/chatline.toml",
    "~/.config/chatline/chatline.toml",
];

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "CHATLINE_CONFIG";

const ENV_PREFIX: &str = "CHATLINE";
const ENV_SEPARATOR: &str = "__";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Live connection configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Messaging rules.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Live connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the websocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Encoding of events pushed to clients.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Messaging rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Seconds after sending during which a message may be edited or deleted.
    #[serde(default = "default_edit_window_secs")]
    pub edit_window_secs: u64,

    /// Content left behind by a deleted message.
    #[serde(default = "default_tombstone")]
    pub tombstone: String,

    /// Characters of content shown in a notification preview.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Maximum characters of message content.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_edit_window_secs() -> u64 {
    60 * 60
}

fn default_tombstone() -> String {
    chatline_core::DEFAULT_TOMBSTONE.to_string()
}

fn default_preview_chars() -> usize {
    80
}

fn default_max_content_chars() -> usize {
    10_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            messaging: MessagingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            encoding: Encoding::default(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            edit_window_secs: default_edit_window_secs(),
            tombstone: default_tombstone(),
            preview_chars: default_preview_chars(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl MessagingConfig {
    /// Settings for the chat service.
    #[must_use]
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            edit_window: Duration::from_secs(self.edit_window_secs),
            tombstone: self.tombstone.clone(),
            preview_chars: self.preview_chars,
            max_content_chars: self.max_content_chars,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let base = match Self::find_file() {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        base.with_overrides(environment())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply an environment source on top of this configuration.
    fn with_overrides(&self, env: ::config::Environment) -> Result<Self> {
        let layered = ::config::Config::builder()
            .add_source(::config::Config::try_from(self).context("Failed to seed configuration")?)
            .add_source(env)
            .build()
            .context("Failed to apply environment overrides")?;

        layered
            .try_deserialize()
            .context("Invalid configuration value in environment")
    }

    fn find_file() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_VAR) {
            return Some(PathBuf::from(shellexpand::tilde(&explicit).as_ref()));
        }

        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
