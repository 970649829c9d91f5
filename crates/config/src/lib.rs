#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for dsu
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/dsu/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod constants;

pub use constants as fixed_paths;

use dsu_errors::{ConfigError, Error};
use dsu_types::{ColorChoice, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub script: ScriptConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Privileged connection wait policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Installation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Bytes handed to the privileged executor per write
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_userdata_gib")]
    pub default_userdata_gib: u32,
    #[serde(default = "default_partition")]
    pub default_partition: String,
    pub image_root: Option<PathBuf>,
}

/// Script generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Device-side tool invoked by every generated command
    #[serde(default = "default_script_tool")]
    pub tool: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    pub output_dir: Option<PathBuf>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            default_userdata_gib: default_userdata_gib(),
            default_partition: default_partition(),
            image_root: None,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            tool: default_script_tool(),
            shell: default_shell(),
            output_dir: None,
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_userdata_gib() -> u32 {
    4
}

fn default_partition() -> String {
    "dsu".to_string()
}

fn default_script_tool() -> String {
    "gsi_tool".to_string()
}

fn default_shell() -> String {
    constants::DEFAULT_SHELL.to_string()
}

impl BrokerConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("dsu").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // DSU_OUTPUT
        if let Ok(output) = std::env::var("DSU_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "DSU_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // DSU_COLOR
        if let Ok(color) = std::env::var("DSU_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "DSU_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        if let Some(value) = parse_env("DSU_CONNECT_TIMEOUT_MS")? {
            self.broker.connect_timeout_ms = value;
        }
        if let Some(value) = parse_env("DSU_POLL_INTERVAL_MS")? {
            self.broker.poll_interval_ms = value;
        }
        if let Some(value) = parse_env("DSU_CHUNK_SIZE")? {
            self.install.chunk_size = value;
        }

        if let Ok(tool) = std::env::var("DSU_SCRIPT_TOOL") {
            self.script.tool = tool;
        }

        Ok(())
    }

    /// Check values that would make the installer misbehave
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |field: &str, value: String| -> Error {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value,
            }
            .into()
        };

        if self.broker.poll_interval_ms == 0 {
            return Err(invalid("broker.poll_interval_ms", "0".into()));
        }
        if self.broker.connect_timeout_ms == 0 {
            return Err(invalid("broker.connect_timeout_ms", "0".into()));
        }
        if self.install.chunk_size == 0 {
            return Err(invalid("install.chunk_size", "0".into()));
        }
        if self.install.default_userdata_gib == 0 {
            return Err(invalid("install.default_userdata_gib", "0".into()));
        }
        if self.script.tool.trim().is_empty() {
            return Err(invalid("script.tool", self.script.tool.clone()));
        }
        Ok(())
    }

    /// Get the image root (with default)
    #[must_use]
    pub fn image_root(&self) -> PathBuf {
        self.install
            .image_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::IMAGE_ROOT))
    }

    /// Default location for a generated script
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.script
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(constants::SCRIPT_NAME)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Result<Option<T>, Error> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: var.to_string(),
                value: raw,
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}
