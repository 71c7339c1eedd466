//! Version check and self-update of the extractor
//!
//! yt-dlp release builds update themselves with `-U`; this module only runs
//! that switch and records what happened.

use std::path::Path;
use std::process::Stdio;

use chrono::Utc;
use tokio::process::Command;
use tracing::info;

use crate::core::tools::{EXTRACTOR, spawn_error, tool_version};
use crate::error::{Result, YtBatchError};
use crate::types::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub previous: String,
    pub current: String,
}

impl UpdateOutcome {
    pub fn updated(&self) -> bool {
        self.previous != self.current
    }
}

/// Run `yt-dlp -U` and compare versions before and after
pub async fn update_extractor(extractor: &Path) -> Result<UpdateOutcome> {
    let previous = tool_version(extractor).await?;

    let output = Command::new(extractor)
        .arg("-U")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(extractor, e))?;

    if !output.status.success() {
        let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if message.is_empty() {
            message = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        return Err(YtBatchError::from_tool_exit(EXTRACTOR, output.status.code(), message));
    }

    let current = tool_version(extractor).await?;
    info!(%previous, %current, "extractor update finished");
    Ok(UpdateOutcome { previous, current })
}

/// Remember the outcome in the config
pub fn record_update(config: &mut Config, outcome: &UpdateOutcome) {
    config.last_update_version = Some(outcome.current.clone());
    config.last_update_check = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_update() {
        let mut cfg = Config::default();
        let outcome = UpdateOutcome {
            previous: "2024.12.23".into(),
            current: "2025.01.15".into(),
        };
        assert!(outcome.updated());

        record_update(&mut cfg, &outcome);
        assert_eq!(cfg.last_update_version.as_deref(), Some("2025.01.15"));
        assert!(cfg.last_update_check.is_some());
    }
}
