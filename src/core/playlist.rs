//! Playlist expansion via `yt-dlp --flat-playlist -J`

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::command::playlist_args;
use crate::core::runner::{Invocation, ToolRunner};
use crate::core::tools::{EXTRACTOR, Toolchain};
use crate::error::{Result, YtBatchError};
use crate::types::{DownloadMode, DownloadTask};

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    entries: Option<Vec<Option<PlaylistEntry>>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: Option<String>,
    url: Option<String>,
    ie_key: Option<String>,
}

impl PlaylistEntry {
    /// Absolute URL of the entry, if one can be built
    fn resolve_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref() {
            if url.starts_with("http://") || url.starts_with("https://") {
                return Some(url.to_string());
            }
        }

        // Flat YouTube entries sometimes carry only the video id
        let id = self.id.as_deref().or(self.url.as_deref())?;
        match self.ie_key.as_deref() {
            None | Some("Youtube") => Some(format!("https://www.youtube.com/watch?v={}", id)),
            Some(_) => None,
        }
    }
}

/// Entries of a playlist as tasks
#[derive(Debug, Clone)]
pub struct Playlist {
    pub title: Option<String>,
    pub tasks: Vec<DownloadTask>,
}

/// Fetch the entries of `url`. A URL that is a single video comes back as a
/// one-task "playlist" without an index.
pub async fn expand_playlist(
    runner: &dyn ToolRunner,
    tools: &Toolchain,
    url: &str,
    mode: DownloadMode,
    target_format: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Playlist> {
    let invocation = Invocation::new(&tools.extractor, playlist_args(url));

    let mut json = String::new();
    let mut errors: Vec<String> = Vec::new();
    let outcome = runner
        .run(
            &invocation,
            &mut |line: String| {
                if line.starts_with('{') {
                    json = line;
                } else if let Some(msg) = line.strip_prefix("ERROR:") {
                    errors.push(msg.trim().to_string());
                }
            },
            cancel,
        )
        .await?;

    if !outcome.success {
        let message = if errors.is_empty() {
            format!("could not list playlist {}", url)
        } else {
            errors.join("\n")
        };
        return Err(YtBatchError::from_tool_exit(EXTRACTOR, outcome.code, message));
    }

    let playlist = parse_playlist(&json, url, mode, target_format)?;
    info!(
        title = playlist.title.as_deref().unwrap_or("untitled"),
        entries = playlist.tasks.len(),
        "playlist expanded"
    );
    Ok(playlist)
}

fn parse_playlist(
    json: &str,
    url: &str,
    mode: DownloadMode,
    target_format: Option<&str>,
) -> Result<Playlist> {
    if json.is_empty() {
        return Err(YtBatchError::Parse("extractor printed no playlist data".into()));
    }
    let info: PlaylistInfo = serde_json::from_str(json)?;
    let format = target_format.map(String::from);

    let Some(entries) = info.entries else {
        debug!(kind = ?info.kind, "not a playlist, treating as a single video");
        return Ok(Playlist {
            title: info.title,
            tasks: vec![DownloadTask::new(url, mode).with_format(format)],
        });
    };

    let tasks: Vec<DownloadTask> = entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let entry_url = entry.as_ref()?.resolve_url()?;
            let index = u32::try_from(i + 1).ok()?;
            Some(
                DownloadTask::new(entry_url, mode)
                    .with_format(format.clone())
                    .with_playlist_index(index),
            )
        })
        .collect();

    if tasks.is_empty() {
        return Err(YtBatchError::Parse(format!("playlist {} has no downloadable entries", url)));
    }

    Ok(Playlist {
        title: info.title,
        tasks,
    })
}
