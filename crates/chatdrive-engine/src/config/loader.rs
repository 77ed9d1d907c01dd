use super::schema::EngineConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./chatdrive.yaml
    /// 2. ~/.chatdrive/config.yaml
    /// 3. Default configuration
    ///
    /// `CHATDRIVE_TIMING_SCALE` is applied on top of whichever source wins.
    pub async fn load_default() -> Result<EngineConfig, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::read(&path).await?,
            None => EngineConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<EngineConfig, ConfigError> {
        let mut config = Self::read(path).await?;
        config.apply_env();
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        let local_config = PathBuf::from("./chatdrive.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?.join(".chatdrive").join("config.yaml");
        home_config.exists().then_some(home_config)
    }

    async fn read(path: &Path) -> Result<EngineConfig, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let content = tokio::fs::read_to_string(path).await?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
