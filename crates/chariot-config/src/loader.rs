use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use chariot_core::{ChariotError, Result};

use crate::schema::ChariotConfig;

/// Loads and reloads the Chariot configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ChariotConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > CHARIOT_CONFIG env > ~/.chariot/chariot.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CHARIOT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chariot")
            .join("chariot.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ChariotConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(ChariotError::Config(e)),
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a config from a TOML string, applying no env overrides.
    pub fn parse(raw: &str) -> Result<ChariotConfig> {
        toml::from_str::<ChariotConfig>(raw)
            .map_err(|e| ChariotError::Config(format!("failed to parse config: {e}")))
    }

    fn read(path: &Path) -> Result<ChariotConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<ChariotConfig>(&raw).map_err(|e| {
            ChariotError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ChariotConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ChariotConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (CHARIOT_LOG_LEVEL, CHARIOT_AGENT_POLL_MS, etc.)
    pub fn apply_env_overrides(mut config: ChariotConfig) -> ChariotConfig {
        if let Ok(v) = std::env::var("CHARIOT_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("CHARIOT_AGENT_MAX_CONCURRENT") {
            match v.parse::<usize>() {
                Ok(n) => config.agents.max_concurrent = n,
                Err(_) => warn!(value = %v, "ignoring non-numeric CHARIOT_AGENT_MAX_CONCURRENT"),
            }
        }
        if let Ok(v) = std::env::var("CHARIOT_AGENT_POLL_MS") {
            match v.parse::<u64>() {
                Ok(ms) => config.agents.poll_interval_ms = ms,
                Err(_) => warn!(value = %v, "ignoring non-numeric CHARIOT_AGENT_POLL_MS"),
            }
        }
        if let Ok(v) = std::env::var("CHARIOT_BOOTSTRAP") {
            config.runtime.bootstrap = Some(PathBuf::from(v));
        }
        config
    }

    /// Reload the config from disk. The previous config stays in place if the
    /// new one fails to parse or validate.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(ChariotError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        new_config.validate().map_err(ChariotError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
