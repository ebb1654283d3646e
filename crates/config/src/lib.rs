//! Layered configuration for sniff.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A TOML file: `$SNIFF_CONFIG`, or `config.toml` in the platform config
//!    directory (`~/.config/sniff/config.toml` on Linux)
//! 3. Environment variables `SNIFF_DATABASE` and `SNIFF_PREFIX_SIZE`
//!
//! ```toml
//! database = "/opt/sniff/magic.db"
//! prefix_size = 4096
//! ```
//!
//! When no database is configured, [`Config::resolve_database`] searches the
//! locations from [`search_paths`] and falls back to the database bundled with
//! `sniff-magic`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sniff_magic::BUNDLED_DATABASE;
use std::path::{Path, PathBuf};

/// Bytes of content inspected when nothing else is configured.
pub const DEFAULT_PREFIX_SIZE: usize = 1024;
/// Prefix of the environment variables read by [`Config::figment`].
pub const ENV_PREFIX: &str = "SNIFF_";
/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "SNIFF_CONFIG";
/// File name looked for in each searched directory.
pub const DATABASE_FILE_NAME: &str = "magic.db";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit signature database. Searched for when unset.
    pub database: Option<PathBuf>,
    /// Bytes of content inspected per classification.
    pub prefix_size: usize,
}
impl Default for Config {
    fn default() -> Self {
        Self { database: None, prefix_size: DEFAULT_PREFIX_SIZE }
    }
}
impl Config {
    /// Load from every layer.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The full provider stack, for callers that want to merge their own
    /// layers on top before extracting.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).only(&["database", "prefix_size"]))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = match figment.extract() {
            Ok(config) => config,
            Err(e) => exn::bail!(ErrorKind::Extract(e.to_string())),
        };
        config.validate()?;
        tracing::debug!(database = ?config.database, prefix_size = config.prefix_size, "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.prefix_size == 0 {
            exn::bail!(ErrorKind::InvalidValue("prefix_size must be greater than zero".to_string()));
        }
        if let Some(database) = &self.database
            && database.as_os_str().is_empty()
        {
            exn::bail!(ErrorKind::InvalidValue("database path is empty".to_string()));
        }
        Ok(())
    }

    /// The database to open: the configured path verbatim (existing or not),
    /// else the first file found by [`search_paths`], else [`BUNDLED_DATABASE`].
    pub fn resolve_database(&self) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => first_existing(&search_paths()).unwrap_or_else(|| PathBuf::from(BUNDLED_DATABASE)),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "sniff")
}

/// Location of the TOML configuration file, whether or not it exists.
pub fn config_file() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_FILE_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => project_dirs().map(|dirs| dirs.config_dir().join("config.toml")),
    }
}

/// Candidate database locations, in search order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let exe = std::env::current_exe().ok();
    if let Some(dir) = exe.as_deref().and_then(Path::parent) {
        paths.push(dir.join(DATABASE_FILE_NAME));
        paths.push(dir.join("..").join("share").join("sniff").join(DATABASE_FILE_NAME));
    }
    if let Some(dirs) = project_dirs() {
        paths.push(dirs.data_dir().join(DATABASE_FILE_NAME));
    }
    #[cfg(unix)]
    paths.push(Path::new("/usr/share/sniff").join(DATABASE_FILE_NAME));
    paths
}

/// First candidate that is an existing regular file.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    let found = candidates.iter().find(|path| path.is_file()).cloned();
    match &found {
        Some(path) => tracing::debug!(path = %path.display(), "Found signature database"),
        None => tracing::trace!(candidates = candidates.len(), "No signature database found in search paths"),
    }
    found
}
