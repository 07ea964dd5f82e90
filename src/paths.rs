//! XDG-compliant path resolution for libris.
//!
//! [`LibrisPaths`] holds the directories the workbench writes to: the
//! document database, uploaded finding aids and generated images. Defaults
//! follow the XDG Base Directory layout and can be overridden from
//! configuration.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::config::LibrisConfig;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(libris::paths::no_home),
        help("Set the HOME environment variable, or set LIBRIS_DATA_DIR explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(libris::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

const APP_DIR: &str = "libris";

/// Resolved directories for one libris installation.
#[derive(Debug, Clone)]
pub struct LibrisPaths {
    /// `$XDG_CONFIG_HOME/libris/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/libris/`
    pub data_dir: PathBuf,
    /// Where uploaded finding-aid PDFs are written.
    pub upload_dir: PathBuf,
    /// Where resized images are written.
    pub image_dir: PathBuf,
}

impl LibrisPaths {
    /// Resolve XDG directories from the process environment.
    pub fn resolve() -> PathResult<Self> {
        Self::resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve XDG directories using `lookup` in place of the environment.
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>) -> PathResult<Self> {
        let xdg = |var: &str, fallback: &str| -> PathResult<PathBuf> {
            match lookup(var).filter(|v| !v.is_empty()) {
                Some(dir) => Ok(PathBuf::from(dir).join(APP_DIR)),
                None => {
                    let home = lookup("HOME")
                        .filter(|h| !h.is_empty())
                        .ok_or(PathError::NoHome)?;
                    Ok(PathBuf::from(home).join(fallback).join(APP_DIR))
                }
            }
        };

        let config_dir = xdg("XDG_CONFIG_HOME", ".config")?;
        let data_dir = match lookup("LIBRIS_DATA_DIR").filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => xdg("XDG_DATA_HOME", ".local/share")?,
        };
        Ok(Self::with_dirs(config_dir, data_dir))
    }

    /// Lay out every directory under a single root. Used by tests and
    /// self-contained deployments.
    pub fn from_root(root: &Path) -> Self {
        Self::with_dirs(root.join("config"), root.join("data"))
    }

    fn with_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            upload_dir: data_dir.join("findingaids"),
            image_dir: data_dir.join("images"),
            config_dir,
            data_dir,
        }
    }

    /// Apply directory overrides from configuration.
    ///
    /// A relative upload or image folder is taken relative to the data
    /// directory.
    pub fn apply_config(mut self, config: &LibrisConfig) -> Self {
        if let Some(data_dir) = &config.data_dir {
            self = Self::with_dirs(self.config_dir, data_dir.clone());
        }
        if let Some(upload) = &config.upload_folder {
            self.upload_dir = self.data_dir.join(upload);
        }
        if let Some(images) = &config.image_output_folder {
            self.image_dir = self.data_dir.join(images);
        }
        self
    }

    /// Directory holding the document database.
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// Path to the global config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Create every data directory. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [
            &self.data_dir,
            &self.database_dir(),
            &self.upload_dir,
            &self.image_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}
