//! Layered application configuration.
//!
//! Built-in defaults, then `<config_dir>/stationcraft/config.toml`, then
//! `STATIONCRAFT_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "stationcraft";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STATIONCRAFT";

const DEFAULT_CONFIG: &str = r#"# stationcraft configuration
#
# Every key can be overridden with an environment variable, e.g.
# STATIONCRAFT_WORKER_THREADS=8.

# Directory holding the recipe store. Defaults to the platform data dir.
# data_dir = "/var/lib/stationcraft"

# File name of the JSON recipe store inside data_dir.
store_file = "stationcraft.json"

# Store calls allowed in flight at once.
worker_threads = 4

# Station type that can be crafted without a capability token.
default_type = "default"

# Interaction loop period in milliseconds.
tick_rate_ms = 50

# Reload recipes when the store file is edited by something else.
watch_store = true
"#;

/// Runtime settings for the station crafting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the recipe store.
    pub data_dir: PathBuf,
    /// Store file name inside `data_dir`.
    pub store_file: String,
    /// Bound of the persistence worker pool.
    pub worker_threads: usize,
    /// Station type that needs no capability token.
    pub default_type: String,
    /// Interaction loop tick period.
    pub tick_rate_ms: u64,
    /// Resync the cache when the store file changes on disk.
    pub watch_store: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_file: "stationcraft.json".to_string(),
            worker_threads: 4,
            default_type: "default".to_string(),
            tick_rate_ms: 50,
            watch_store: true,
        }
    }
}

impl AppConfig {
    /// Load from the default config file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path` (optional) and the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layers(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_layers(path: &Path, env: Environment) -> Result<Self> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("store_file", defaults.store_file)?
            .set_default("worker_threads", defaults.worker_threads as i64)?
            .set_default("default_type", defaults.default_type)?
            .set_default("tick_rate_ms", defaults.tick_rate_ms as i64)?
            .set_default("watch_store", defaults.watch_store)?
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(env.try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.tick_rate_ms == 0 {
            bail!("tick_rate_ms must be at least 1");
        }
        if self.store_file.trim().is_empty() {
            bail!("store_file must not be empty");
        }
        Ok(())
    }

    /// Full path of the recipe store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }
}

/// Default location of the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write the commented default config file if there is none yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    ensure_config_at(&path)?;
    Ok(path)
}

/// Write the commented default config to `path` unless it exists.
pub fn ensure_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_layers(&dir.path().join("absent.toml"), no_env())?;
        assert_eq!(config, AppConfig::default());
        Ok(())
    }

    #[test]
    fn written_default_matches_builtin_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        ensure_config_at(&path)?;
        ensure_config_at(&path)?;
        let config = AppConfig::load_layers(&path, no_env())?;
        assert_eq!(config, AppConfig::default());
        Ok(())
    }

    #[test]
    fn file_then_env_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "worker_threads = 2\ndefault_type = \"bench\"\ndata_dir = \"/srv/craft\"\n")?;

        let env = HashMap::from([
            ("STATIONCRAFT_WORKER_THREADS".to_string(), "8".to_string()),
            ("STATIONCRAFT_WATCH_STORE".to_string(), "false".to_string()),
        ]);
        let config = AppConfig::load_layers(
            &path,
            Environment::with_prefix(ENV_PREFIX).source(Some(env)),
        )?;

        assert_eq!(config.worker_threads, 8);
        assert!(!config.watch_store);
        assert_eq!(config.default_type, "bench");
        assert_eq!(config.store_path(), PathBuf::from("/srv/craft/stationcraft.json"));
        Ok(())
    }

    #[test]
    fn zero_workers_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "worker_threads = 0\n")?;
        assert!(AppConfig::load_layers(&path, no_env()).is_err());
        Ok(())
    }
}
