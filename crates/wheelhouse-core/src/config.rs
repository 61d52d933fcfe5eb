//! User configuration (`config.toml`).
//!
//! Every field has a default, so an absent file behaves like an empty one.
//! The file is looked up at `$WHEELHOUSE_CONFIG`, then
//! `<config dir>/wheelhouse/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wheelhouse_schema::MarkerEnvironment;

use crate::compat::{SupportedTags, manylinux_platforms};
use crate::index::DEFAULT_INDEX_URL;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "WHEELHOUSE_CONFIG";

/// glibc level assumed when no platform list is configured.
const DEFAULT_GLIBC_MINOR: u32 = 17;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Indexes queried in order.
    pub index_urls: Vec<String>,
    /// Marker environment of the target interpreter.
    pub environment: MarkerEnvironment,
    /// Host platform tags, most specific first. Empty means manylinux
    /// tags for `environment.platform_machine`.
    pub platforms: Vec<String>,
    /// Lockfile of packages that are already available.
    pub baseline: Option<PathBuf>,
    /// Directory wheels are installed into.
    pub target_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_urls: vec![DEFAULT_INDEX_URL.to_string()],
            environment: MarkerEnvironment::default(),
            platforms: Vec::new(),
            baseline: None,
            target_dir: None,
        }
    }
}

impl Config {
    /// Parse a config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the config from `path`, or from the default location when
    /// `path` is `None`. A missing file at the default location yields the
    /// default config; an explicitly named file must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => (PathBuf::from(path), true),
                None => match default_path() {
                    Some(path) => (path, false),
                    None => return Ok(Self::default()),
                },
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Platform tags to rank wheels against.
    pub fn platforms(&self) -> Vec<String> {
        if self.platforms.is_empty() {
            manylinux_platforms(&self.environment.platform_machine, DEFAULT_GLIBC_MINOR)
        } else {
            self.platforms.clone()
        }
    }

    pub fn supported_tags(&self) -> SupportedTags {
        SupportedTags::from_environment(&self.environment, &self.platforms())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `<config dir>/wheelhouse/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wheelhouse").join("config.toml"))
}
