//! Handing folders to the desktop

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, YtBatchError};

fn opener() -> &'static str {
    if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Open `dir` in the platform file manager without waiting for it
pub async fn open_folder(dir: &Path) -> Result<()> {
    Command::new(opener())
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| YtBatchError::Spawn(format!("Failed to open {}: {}", dir.display(), e)))?;
    Ok(())
}
