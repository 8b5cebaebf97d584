//! Shared, synchronized configuration store.
//!
//! The control loop takes one snapshot per cycle with [`ConfigStore::get`];
//! the web surface writes through [`ConfigStore::update`]. Readers never see a
//! half-applied update because the swap happens under the write lock after the
//! new file is on disk.

use super::Config;
use super::merge::{FieldUpdate, apply_updates};
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
    logger: StructuredLogger,
}

impl ConfigStore {
    /// Wrap an already validated configuration
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
            logger: get_logger("config"),
        }
    }

    /// Locate, load and validate the configuration file.
    ///
    /// An explicitly requested file must exist. Without any file the defaults
    /// are used and the first update creates `helios_config.yaml`.
    pub fn open(explicit: Option<PathBuf>) -> Result<Self> {
        let located = Config::locate(explicit.as_deref());
        let config = match located.as_deref() {
            Some(p) if p.exists() => Config::from_file(p)?,
            Some(p) if explicit.is_some() => {
                return Err(HeliosError::config(format!(
                    "Config file {} not found",
                    p.display()
                )));
            }
            _ => Config::default(),
        };
        config.validate()?;
        let path = located.or_else(|| Some(PathBuf::from(super::DEFAULT_CONFIG_PATHS[0])));
        Ok(Self::new(config, path))
    }

    /// Owned snapshot of the current configuration
    pub async fn get(&self) -> Config {
        self.inner.read().await.clone()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply dotted-path updates, persist them and publish the new snapshot
    pub async fn update(&self, updates: &[FieldUpdate]) -> Result<Config> {
        let mut guard = self.inner.write().await;
        let merged = apply_updates(&guard, updates)?;
        if let Some(path) = &self.path {
            persist_with_backup(path, &merged).await?;
        }
        *guard = merged.clone();
        drop(guard);

        let keys: Vec<&str> = updates.iter().map(|(k, _)| k.as_str()).collect();
        self.logger
            .info(&format!("Configuration updated: {}", keys.join(", ")));
        Ok(merged)
    }
}

/// Path of the backup written before each overwrite
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

async fn persist_with_backup(path: &Path, config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::copy(path, backup_path(path))
            .await
            .map_err(|e| HeliosError::persistence(format!("Config backup failed: {}", e)))?;
    }
    tokio::fs::write(path, yaml)
        .await
        .map_err(|e| HeliosError::persistence(format!("Config write failed: {}", e)))?;
    Ok(())
}
