//! Configuration for libris.
//!
//! Settings come from an optional TOML file, then environment overrides.
//! The `FAA_*` variables keep the names deployments already use.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{AnalysisConfig, OpenAiConfig};
use crate::error::LibrisResult;
use crate::paths::LibrisPaths;
use crate::search::SearchConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(libris::config::read),
        help("Ensure the config file is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(libris::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(libris::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: \"{value}\" ({hint})")]
    #[diagnostic(
        code(libris::config::invalid_value),
        help("Fix or unset the variable and restart.")
    )]
    InvalidValue {
        key: String,
        value: String,
        hint: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Default upload size limit: 10 MiB.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8200,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Top-level configuration, persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrisConfig {
    /// Override for the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Upload folder for finding-aid PDFs, relative to the data directory
    /// unless absolute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_folder: Option<PathBuf>,
    /// Output folder for resized images, same resolution rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_output_folder: Option<PathBuf>,
    /// Maximum accepted upload body, in bytes.
    pub max_content_length: usize,
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub analysis: AnalysisConfig,
    pub search: SearchConfig,
}

impl Default for LibrisConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            upload_folder: None,
            image_output_folder: None,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            server: ServerConfig::default(),
            openai: OpenAiConfig::default(),
            analysis: AnalysisConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl LibrisConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse TOML text. `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` in place of the environment.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("FAA_OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(model) = get("FAA_OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(url) = get("FAA_OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(folder) = get("FAA_PDF_UPLOAD_FOLDER") {
            self.upload_folder = Some(PathBuf::from(folder));
        }
        if let Some(raw) = get("FAA_PDF_MAX_CONTENT_LENGTH") {
            self.max_content_length =
                parse_byte_count(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "FAA_PDF_MAX_CONTENT_LENGTH".into(),
                    value: raw.clone(),
                    hint: "Use a byte count such as 10485760 or 10 * 1024 * 1024.".into(),
                })?;
        }
        if let Some(dir) = get("LIBRIS_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(bind) = get("LIBRIS_SERVER_BIND") {
            self.server.bind = bind;
        }
        if let Some(raw) = get("LIBRIS_SERVER_PORT") {
            self.server.port = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "LIBRIS_SERVER_PORT".into(),
                value: raw.clone(),
                hint: "Use a port number between 1 and 65535.".into(),
            })?;
        }
        Ok(self)
    }
}

/// Resolve directories and the effective configuration from the process
/// environment.
///
/// The config file is `config_file` if given, otherwise `config.toml` in the
/// XDG config directory (optional). Environment variables override the file,
/// and directory settings from the result override the XDG defaults.
pub fn load_environment(config_file: Option<&Path>) -> LibrisResult<(LibrisConfig, LibrisPaths)> {
    let paths = LibrisPaths::resolve()?;
    let config = match config_file {
        Some(path) => LibrisConfig::load(path)?,
        None => LibrisConfig::load_or_default(&paths.config_file())?,
    }
    .apply_env()?;
    let paths = paths.apply_config(&config);
    Ok((config, paths))
}

/// Parse a positive byte count written either as a plain integer or as a
/// product of integers (`10 * 1024 * 1024`).
pub fn parse_byte_count(raw: &str) -> Option<usize> {
    let mut total: usize = 1;
    for factor in raw.split('*') {
        let factor: usize = factor.trim().parse().ok()?;
        total = total.checked_mul(factor)?;
    }
    (total > 0).then_some(total)
}
