//! Configuration file for the pixelvault CLI.
//!
//! Every key is optional; a missing file means all defaults.  The CLI takes no
//! flags, so the file path comes from `$PIXELVAULT_CONFIG` or the platform
//! config directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{CanvasGeometry, Framing, DEFAULT_MAX_FRAGMENT_BYTES};
use crate::error::{Result, VaultError};
use crate::retry::RetryPolicy;

/// Environment variable overriding [`Config::default_path`].
pub const CONFIG_ENV: &str = "PIXELVAULT_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub codec:   CodecConfig,
    #[serde(default)]
    pub retry:   RetryConfig,
    #[serde(default)]
    pub store:   StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Largest payload per fragment.  Must match whatever wrote the container.
    #[serde(default = "default_max_fragment_bytes")]
    pub max_fragment_bytes: usize,
    #[serde(default)]
    pub framing:            Framing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts:  u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms:  u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms:     u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory backing the local transport.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console filter; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level:          String,
    /// Diagnostic log, truncated at every start.
    #[serde(default = "default_diagnostic_log")]
    pub diagnostic_log: PathBuf,
}

// Default values

fn default_max_fragment_bytes() -> usize {
    DEFAULT_MAX_FRAGMENT_BYTES
}

fn default_max_attempts() -> u32 {
    8
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_store_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pixelvault")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_diagnostic_log() -> PathBuf {
    PathBuf::from("log.txt")
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { max_fragment_bytes: default_max_fragment_bytes(), framing: Framing::default() }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts:  default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms:  default_max_delay_ms(),
            jitter_ms:     default_jitter_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root: default_store_root() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), diagnostic_log: default_diagnostic_log() }
    }
}

impl Config {
    /// Parse and validate the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// `$PIXELVAULT_CONFIG`, else `<config dir>/pixelvault/config.toml`.
    pub fn default_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pixelvault/config.toml"),
        }
    }

    /// Load from [`Config::default_path`]; defaults when the file is absent.
    /// Unlike a first-run setup, nothing is written to disk.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry()?;

        if self.retry.max_attempts == 0 {
            return Err(VaultError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(VaultError::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(VaultError::Config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<CanvasGeometry> {
        CanvasGeometry::new(self.codec.max_fragment_bytes)
            .map_err(|e| VaultError::Config(format!("codec.max_fragment_bytes: {e}")))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay:   Duration::from_millis(self.retry.base_delay_ms),
            max_delay:    Duration::from_millis(self.retry.max_delay_ms),
            max_jitter:   Duration::from_millis(self.retry.jitter_ms),
        }
    }
}
