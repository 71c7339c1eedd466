//! Configuration management

use crate::core::command::AUDIO_FORMATS;
use crate::error::{Result, YtBatchError};
use crate::types::Config;
use crate::utils::paths::{ensure_dir, get_config_path};
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Load configuration from the default location
pub async fn load_config() -> Result<Config> {
    load_config_from(Path::new(&get_config_path())).await
}

/// Load configuration from file, missing fields take their defaults
pub async fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| YtBatchError::InvalidConfig(format!("{}: {}", path.display(), e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !AUDIO_FORMATS.contains(&config.audio_format.as_str()) {
        return Err(YtBatchError::InvalidConfig(format!(
            "audio_format '{}' must be one of {}",
            config.audio_format,
            AUDIO_FORMATS.join(", ")
        )));
    }
    if config.video_format.is_empty() {
        return Err(YtBatchError::InvalidConfig("video_format must not be empty".into()));
    }
    if config.concurrency == 0 {
        return Err(YtBatchError::InvalidConfig("concurrency must be at least 1".into()));
    }
    Ok(())
}

/// Save configuration to the default location
pub async fn save_config(config: &Config) -> Result<()> {
    save_config_to(Path::new(&get_config_path()), config).await
}

/// Save configuration to file
pub async fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(&parent.to_string_lossy()).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Open config file in editor
pub async fn edit_config(editor: &str) -> Result<()> {
    let config_path = get_config_path();

    // Ensure config file exists
    if !Path::new(&config_path).exists() {
        save_config(&Config::default()).await?;
    }

    Command::new(editor)
        .arg(&config_path)
        .status()
        .await
        .map_err(|e| YtBatchError::Spawn(format!("Failed to start {}: {}", editor, e)))?;

    Ok(())
}
