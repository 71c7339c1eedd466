//! Path utilities for yt-batch
//!
//! Respects XDG Base Directory Specification

use crate::error::Result;
use std::env;
use std::path::PathBuf;
use tokio::fs;

const APP_NAME: &str = "yt-batch";

/// Get config directory path
/// Respects XDG_CONFIG_HOME, defaults to ~/.config/yt-batch
pub fn get_config_dir() -> String {
    let base = env::var("XDG_CONFIG_HOME")
        .unwrap_or_else(|_| {
            dirs::config_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("{}/.config", env::var("HOME").unwrap_or_default()))
        });

    format!("{}/{}", base, APP_NAME)
}

/// Get config file path
pub fn get_config_path() -> String {
    format!("{}/config.json", get_config_dir())
}

/// Directory holding the running executable
pub fn executable_dir() -> Option<PathBuf> {
    env::current_exe().ok()?.parent().map(PathBuf::from)
}

/// Where a bundled copy of `tool` would live: `<exe_dir>/<dir>/<tool>[.exe]`,
/// with `yt-dlp` shipped in `ytdlp/` and `ffmpeg` in `ffmpeg/`
pub fn bundled_tool_path(tool: &str) -> Option<PathBuf> {
    let dir_name = tool.replace('-', "");
    let file_name = if cfg!(windows) {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    };
    Some(executable_dir()?.join(dir_name).join(file_name))
}

/// Download directory, falling back to ~/Downloads and then the working dir
pub fn resolve_download_dir(configured: &str) -> PathBuf {
    if !configured.is_empty() {
        return expand_home(configured);
    }
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~/`
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Ensure a directory exists
pub async fn ensure_dir(path: &str) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_layout() {
        let path = bundled_tool_path("yt-dlp").unwrap();
        let parent = path.parent().unwrap();
        assert!(parent.ends_with("ytdlp"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("yt-dlp"));

        let ffmpeg = bundled_tool_path("ffmpeg").unwrap();
        assert!(ffmpeg.parent().unwrap().ends_with("ffmpeg"));
    }

    #[test]
    fn test_configured_download_dir_wins() {
        assert_eq!(resolve_download_dir("/srv/media"), PathBuf::from("/srv/media"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_download_dir("~/Videos"), home.join("Videos"));
        }
    }

    #[test]
    fn test_ensure_dir_creates_parents() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        tokio_test::block_on(ensure_dir(&nested.to_string_lossy())).unwrap();
        assert!(nested.is_dir());
    }
}
