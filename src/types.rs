//! Type definitions for yt-batch
//!
//! Source of truth for all data structures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, YtBatchError};

// ============================================
// Task Types
// ============================================

/// What to produce from a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    #[default]
    Video,
    Audio,
}

/// One URL scheduled for download. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub url: String,
    pub mode: DownloadMode,
    /// Container for video ("mp4") or codec for audio ("m4a", "mp3")
    pub target_format: Option<String>,
    /// 1-based position inside a playlist
    pub playlist_index: Option<u32>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, mode: DownloadMode) -> Self {
        Self {
            url: url.into(),
            mode,
            target_format: None,
            playlist_index: None,
        }
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.target_format = format;
        self
    }

    pub fn with_playlist_index(mut self, index: u32) -> Self {
        self.playlist_index = Some(index);
        self
    }
}

// ============================================
// Result Types
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Success,
    Failed,
    /// The file was already on disk
    Skipped,
}

/// Outcome of a single task, produced exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub task: DownloadTask,
    pub status: DownloadStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub output_path: Option<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl DownloadResult {
    pub fn success(task: DownloadTask, output_path: Option<PathBuf>) -> Self {
        Self::finished(task, DownloadStatus::Success, output_path)
    }

    pub fn skipped(task: DownloadTask, output_path: Option<PathBuf>) -> Self {
        Self::finished(task, DownloadStatus::Skipped, output_path)
    }

    pub fn failed(task: DownloadTask, error: &YtBatchError) -> Self {
        Self {
            task,
            status: DownloadStatus::Failed,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            output_path: None,
            finished_at: Utc::now(),
        }
    }

    fn finished(task: DownloadTask, status: DownloadStatus, output_path: Option<PathBuf>) -> Self {
        Self {
            task,
            status,
            error_kind: None,
            error_message: None,
            output_path,
            finished_at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DownloadStatus::Failed
    }
}

// ============================================
// Batch Types
// ============================================

/// State of one submitted batch. Owned by a single writer.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub tasks: Vec<DownloadTask>,
    pub results: Vec<DownloadResult>,
    pub aggregate_progress: f64,
    pub cancelled: bool,
    finished: Vec<bool>,
}

impl BatchRun {
    pub fn new(tasks: Vec<DownloadTask>) -> Self {
        let finished = vec![false; tasks.len()];
        Self {
            tasks,
            results: Vec::new(),
            aggregate_progress: 0.0,
            cancelled: false,
            finished,
        }
    }

    /// Append the result of task `index`. Returns false if the task already
    /// has a result or the index is out of range.
    pub fn record(&mut self, index: usize, result: DownloadResult) -> bool {
        match self.finished.get_mut(index) {
            Some(done) if !*done => {
                *done = true;
                self.results.push(result);
                true
            }
            _ => false,
        }
    }

    pub fn is_finished(&self, index: usize) -> bool {
        self.finished.get(index).copied().unwrap_or(false)
    }

    pub fn completed(&self) -> usize {
        self.results.len()
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    /// Move the aggregate forward; values below the current one are ignored.
    pub fn advance_progress(&mut self, value: f64) -> f64 {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        if value > self.aggregate_progress {
            self.aggregate_progress = value;
        }
        self.aggregate_progress
    }

    pub fn summary(&self) -> BatchSummary {
        let count = |status: DownloadStatus| self.results.iter().filter(|r| r.status == status).count();
        BatchSummary {
            total: self.total(),
            succeeded: count(DownloadStatus::Success),
            failed: count(DownloadStatus::Failed),
            skipped: count(DownloadStatus::Skipped),
            not_run: self.total() - self.completed(),
            cancelled: self.cancelled,
        }
    }
}

/// Final counts reported when a batch ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_run: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0 && self.not_run == 0 && !self.cancelled
    }
}

/// Events delivered to the presentation layer
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    BatchStarted { total: usize },
    ItemStarted { index: usize, task: DownloadTask },
    ItemProgress { index: usize, fraction: f64, aggregate: f64 },
    /// Unrecognised tool output, passed through for the log view
    ItemLog { index: usize, line: String },
    ItemFinished { index: usize, result: DownloadResult, aggregate: f64 },
    /// In-flight task killed by cancellation; produces no result
    ItemCancelled { index: usize },
    BatchFinished { summary: BatchSummary },
}

// ============================================
// Config Types
// ============================================

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download directory path (empty = ~/Downloads)
    pub download_dir: String,
    /// Audio codec for audio mode (default: "m4a")
    pub audio_format: String,
    /// Merge container for video mode (default: "mp4")
    pub video_format: String,
    /// Parallel downloads (default: 1)
    pub concurrency: usize,
    /// Kill a silent tool after this many seconds, 0 disables (default: 300)
    pub stall_timeout_secs: u64,
    /// Ask yt-dlp for tagged progress lines instead of its console output
    pub structured_progress: bool,
    /// Explicit yt-dlp binary
    pub ytdlp_path: Option<String>,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<String>,
    /// Open the download folder when a batch ends
    pub auto_open_folder: bool,
    /// Run `yt-dlp -U` on startup
    pub auto_update: bool,
    pub last_update_version: Option<String>,
    pub last_update_check: Option<DateTime<Utc>>,
    /// Editor command (default: "nvim")
    pub editor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: String::new(), // Set at runtime to ~/Downloads
            audio_format: "m4a".into(),
            video_format: "mp4".into(),
            concurrency: 1,
            stall_timeout_secs: 300,
            structured_progress: true,
            ytdlp_path: None,
            ffmpeg_path: None,
            auto_open_folder: false,
            auto_update: false,
            last_update_version: None,
            last_update_check: None,
            editor: "nvim".into(),
        }
    }
}
