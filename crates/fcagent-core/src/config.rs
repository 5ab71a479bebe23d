//! Configuration resolution for fcagent.
//!
//! Resolution order (lowest to highest):
//! 1. Built-in defaults
//! 2. Config file (`--config <path>` or ~/.config/fcagent/config.json)
//! 3. Command-line flags and their environment variables (applied by the CLI)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::{DialOptions, RelayConfig};

/// Complete fcagent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the agent listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// vsock context id of the VM.
    pub cid: u32,
    pub port: u32,
    /// `host:port` to reach the agent over TCP instead of vsock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cid: 0,
            port: 10789,
            addr: None,
        }
    }
}

/// Stream relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Grace period for stdout/stderr after the process exits.
    pub flush_timeout_ms: u64,
    pub buffer_size: usize,
    /// First of the three consecutive ports used by each exec.
    pub min_io_port: u32,
    /// Pause between sending Exec and dialing the IO ports.
    pub attach_delay_ms: u64,
    pub dial_attempts: u32,
    pub dial_backoff_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            flush_timeout_ms: 5_000,
            buffer_size: 1024,
            min_io_port: 12_000,
            attach_delay_ms: 1_000,
            dial_attempts: 10,
            dial_backoff_ms: 100,
        }
    }
}

impl IoConfig {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            output_grace: Duration::from_millis(self.flush_timeout_ms),
            buffer_size: self.buffer_size,
            ..RelayConfig::default()
        }
    }

    pub const fn dial_options(&self) -> DialOptions {
        DialOptions {
            attempts: self.dial_attempts,
            backoff: Duration::from_millis(self.dial_backoff_ms),
        }
    }

    pub const fn attach_delay(&self) -> Duration {
        Duration::from_millis(self.attach_delay_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, the global config file is
/// read when present and defaults are used otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };
    validate(&config)?;
    Ok(config)
}

/// `~/.config/fcagent/config.json` (platform config dir).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fcagent").join("config.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn validate(config: &Config) -> Result<()> {
    if config.io.buffer_size == 0 {
        return Err(Error::Config("io.buffer_size must be positive".into()));
    }
    if config.io.dial_attempts == 0 {
        return Err(Error::Config("io.dial_attempts must be positive".into()));
    }
    Ok(())
}
