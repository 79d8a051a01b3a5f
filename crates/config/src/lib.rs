//! Configuration loading and validation for folio.
//!
//! Layered figment setup: compiled-in defaults, then an optional TOML file,
//! then `FOLIO_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `FOLIO_DATABASE__PATH`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file picked up from the working directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub recommendations: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Location of the SQLite database file. Created on first connect.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// How many books `recommend` returns when the caller doesn't say.
    pub default_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { path: default_database_path() },
            recommendations: RecommendationConfig { default_limit: 10 },
        }
    }
}

/// Platform data directory for the database, falling back to the working
/// directory when the home directory can't be determined.
fn default_database_path() -> PathBuf {
    match ProjectDirs::from("", "", "folio") {
        Some(dirs) => dirs.data_dir().join("folio.db"),
        None => PathBuf::from("folio.db"),
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file, and the
    /// environment.
    ///
    /// When `file` is given it must exist; otherwise a `folio.toml` in the
    /// working directory is merged if present and silently skipped if not.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match file {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };
        let config: Self = figment
            .merge(Env::prefixed("FOLIO_").split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.recommendations.default_limit == 0 {
            exn::bail!(ErrorKind::Invalid("recommendations.default_limit"));
        }
        Ok(())
    }
}
