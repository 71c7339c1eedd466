//! Locating and probing the external binaries

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, YtBatchError};
use crate::types::Config;
use crate::utils::paths::bundled_tool_path;

pub const EXTRACTOR: &str = "yt-dlp";
pub const TRANSCODER: &str = "ffmpeg";

/// Resolved binaries used for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub extractor: PathBuf,
    pub transcoder: PathBuf,
}

impl Toolchain {
    /// Resolve both tools. A missing tool is fatal for the run.
    pub async fn resolve(config: &Config) -> Result<Self> {
        let extractor = resolve_tool(EXTRACTOR, config.ytdlp_path.as_deref()).await?;
        let transcoder = resolve_tool(TRANSCODER, config.ffmpeg_path.as_deref()).await?;
        info!(extractor = %extractor.display(), transcoder = %transcoder.display(), "tools resolved");
        Ok(Self {
            extractor,
            transcoder,
        })
    }
}

/// Lookup order: explicit override, bundled copy next to the executable, PATH
pub async fn resolve_tool(name: &str, override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(custom) = override_path.filter(|p| !p.is_empty()) {
        if Path::new(custom).is_file() || is_command_available(custom).await {
            return Ok(PathBuf::from(custom));
        }
        return Err(YtBatchError::ToolNotFound(custom.to_string()));
    }

    if let Some(bundled) = bundled_tool_path(name) {
        if bundled.is_file() {
            debug!(tool = name, path = %bundled.display(), "using bundled tool");
            return Ok(bundled);
        }
    }

    if is_command_available(name).await {
        return Ok(PathBuf::from(name));
    }

    Err(YtBatchError::ToolNotFound(name.to_string()))
}

/// First line of `<tool> --version` (`-version` for ffmpeg)
pub async fn tool_version(path: &Path) -> Result<String> {
    let flag = if is_transcoder(path) { "-version" } else { "--version" };

    let output = Command::new(path)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(path, e))?;

    if !output.status.success() {
        return Err(YtBatchError::ToolFailed {
            tool: path.display().to_string(),
            code: output.status.code(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Map a spawn failure, keeping "not found" distinct so it stays fatal
pub fn spawn_error(path: &Path, err: std::io::Error) -> YtBatchError {
    if err.kind() == std::io::ErrorKind::NotFound {
        YtBatchError::ToolNotFound(path.display().to_string())
    } else {
        YtBatchError::Spawn(format!("Failed to start {}: {}", path.display(), err))
    }
}

fn is_transcoder(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().starts_with(TRANSCODER))
        .unwrap_or(false)
}

/// Check if a command is available in PATH
async fn is_command_available(cmd: &str) -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    Command::new(finder)
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
