//! Configuration loading
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a JSON5 file (`--config`, `MEDIAPROBE_CONFIG`, or
//!    `<config dir>/mediaprobe/config.json5`)
//! 3. `MEDIAPROBE_*` environment variables
//! 4. command-line flags (applied by the CLI layer)

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{LogFormat, LoggingConfig};
use crate::media::{
    FetchConfig, DEFAULT_ANALYZER_PROGRAM, DEFAULT_ANALYZER_TIMEOUT_SECS,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT_SECS,
};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "MEDIAPROBE_CONFIG";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    Env { key: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch: FetchSettings,
    pub analyzer: AnalyzerConfig,
    /// Directory for scratch files; system temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_download_bytes: Option<u64>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_download_bytes: None,
        }
    }
}

impl FetchSettings {
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_bytes: self.max_download_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    /// Executable name on `PATH` or path to the binary.
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ANALYZER_PROGRAM.to_string(),
            timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analyzer.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "analyzer.program must not be empty".to_string(),
            ));
        }
        if self.analyzer.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "analyzer.timeoutSecs must be greater than zero".to_string(),
            ));
        }
        if self.fetch.timeout_secs == 0 || self.fetch.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch timeouts must be greater than zero".to_string(),
            ));
        }
        if self.fetch.max_download_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "fetch.maxDownloadBytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer.timeout_secs)
    }

    /// Apply `MEDIAPROBE_*` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("MEDIAPROBE_BIND") {
            self.server.bind = parse_env("MEDIAPROBE_BIND", &bind)?;
        }
        if let Some(port) = lookup("MEDIAPROBE_PORT") {
            self.server.port = parse_env("MEDIAPROBE_PORT", &port)?;
        }
        if let Some(program) = lookup("MEDIAPROBE_FFPROBE") {
            self.analyzer.program = program;
        }
        if let Some(secs) = lookup("MEDIAPROBE_ANALYZER_TIMEOUT_SECS") {
            self.analyzer.timeout_secs = parse_env("MEDIAPROBE_ANALYZER_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("MEDIAPROBE_FETCH_TIMEOUT_SECS") {
            self.fetch.timeout_secs = parse_env("MEDIAPROBE_FETCH_TIMEOUT_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("MEDIAPROBE_MAX_DOWNLOAD_BYTES") {
            self.fetch.max_download_bytes =
                Some(parse_env("MEDIAPROBE_MAX_DOWNLOAD_BYTES", &bytes)?);
        }
        if let Some(dir) = lookup("MEDIAPROBE_SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("MEDIAPROBE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MEDIAPROBE_LOG_FORMAT") {
            self.logging.format = parse_env::<LogFormat>("MEDIAPROBE_LOG_FORMAT", &format)?;
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Resolve the config file path: explicit env var, else the user config dir.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediaprobe")
        .join("config.json5")
}

/// Parse a JSON5 config file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load configuration from file (if present) and the process environment.
///
/// An explicitly named file must exist; the default location is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => {
            let path = get_config_path();
            if path.exists() {
                load_config_file(&path)?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
