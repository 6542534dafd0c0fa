//! Client configuration at `~/.wssh/config.toml`.
//!
//! Provides the default gateway, SSH port, identity file and auth timeout.
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use wssh_client::OutboundFraming;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Gateway WebSocket URL (empty = none).
    #[serde(default)]
    pub gateway: String,

    /// Default target host (empty = none).
    #[serde(default)]
    pub host: String,

    /// Default SSH port on the target.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key file for public-key auth. `~` expands to the home directory.
    #[serde(default)]
    pub identity: Option<String>,

    /// Seconds to wait for the authentication outcome.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Terminal type requested for the remote pty.
    #[serde(default = "default_term")]
    pub term: String,

    /// How session input is framed on the wire: "binary" or "text".
    #[serde(default)]
    pub framing: OutboundFraming,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            gateway: String::new(),
            host: String::new(),
            port: default_port(),
            identity: None,
            timeout_secs: default_timeout_secs(),
            term: default_term(),
            framing: OutboundFraming::default(),
        }
    }
}

fn default_port() -> u16 {
    wssh_client::DEFAULT_SSH_PORT
}

fn default_timeout_secs() -> u64 {
    wssh_client::DEFAULT_AUTH_TIMEOUT.as_secs()
}

fn default_term() -> String {
    "xterm".to_string()
}

impl Config {
    /// `~/.wssh/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".wssh").join("config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None => PathBuf::from(path),
    }
}

/// Parse a `[user@]host` string into `(user, host)`.
///
/// If no user is specified, defaults to the current system username (or "root").
pub fn parse_target(target: &str) -> Result<(String, String)> {
    if let Some((user, host)) = target.split_once('@') {
        if user.is_empty() {
            anyhow::bail!("empty username in target '{target}'");
        }
        if host.is_empty() {
            anyhow::bail!("empty host in target '{target}'");
        }
        Ok((user.to_string(), host.to_string()))
    } else {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "root".into());
        if target.is_empty() {
            anyhow::bail!("empty host");
        }
        Ok((user, target.to_string()))
    }
}
