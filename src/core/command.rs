//! Argument builders for yt-dlp and ffmpeg

use std::path::{Path, PathBuf};

use crate::core::progress::{print_template, progress_template};
use crate::error::{Result, YtBatchError};
use crate::types::{DownloadMode, DownloadTask};

/// Audio codecs the transcoder can produce
pub const AUDIO_FORMATS: [&str; 5] = ["m4a", "mp3", "opus", "flac", "wav"];

/// Per-run settings that shape the extractor command line
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub output_dir: PathBuf,
    pub transcoder: PathBuf,
    pub video_format: String,
    /// Use the tagged `--progress-template`/`--print` lines
    pub structured_progress: bool,
}

/// yt-dlp arguments for one task
pub fn extractor_args(task: &DownloadTask, options: &CommandOptions) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    match task.mode {
        DownloadMode::Video => {
            let container = task
                .target_format
                .as_deref()
                .unwrap_or(&options.video_format);
            args.extend(["-f".to_string(), "bestvideo+bestaudio/best".to_string()]);
            args.extend(["--merge-output-format".to_string(), container.to_string()]);
        }
        // Transcoding happens in a separate ffmpeg step
        DownloadMode::Audio => args.extend(["-f".to_string(), "bestaudio/best".to_string()]),
    }

    args.extend([
        "--ffmpeg-location".to_string(),
        options.transcoder.to_string_lossy().into_owned(),
    ]);
    args.push("--no-playlist".to_string());
    args.push("--newline".to_string());

    if options.structured_progress {
        args.extend([
            "--progress".to_string(),
            "--progress-template".to_string(),
            progress_template(),
            "--print".to_string(),
            print_template(),
        ]);
    }

    args.extend(["-o".to_string(), output_template(&options.output_dir, task.playlist_index)]);
    // Keep URLs that look like flags from being parsed as options
    args.push("--".to_string());
    args.push(task.url.clone());
    args
}

/// `<dir>/%(title)s.%(ext)s`, or `<dir>/<n> - %(title)s.%(ext)s` for playlist entries
pub fn output_template(dir: &Path, playlist_index: Option<u32>) -> String {
    let name = match playlist_index {
        Some(index) => format!("{} - %(title)s.%(ext)s", index),
        None => "%(title)s.%(ext)s".to_string(),
    };
    // '%' in the directory would be read as a template field
    let dir = dir.to_string_lossy().replace('%', "%%");
    Path::new(&dir).join(name).to_string_lossy().into_owned()
}

/// yt-dlp arguments listing a playlist as JSON without downloading
pub fn playlist_args(url: &str) -> Vec<String> {
    vec![
        "--flat-playlist".to_string(),
        "-J".to_string(),
        "--no-warnings".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Where the transcoded file goes: the input with the codec's extension
pub fn transcode_target(input: &Path, format: &str) -> PathBuf {
    input.with_extension(format)
}

/// ffmpeg arguments turning `input` into audio-only `output`
pub fn transcoder_args(input: &Path, output: &Path, format: &str) -> Result<Vec<String>> {
    let source_ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let codec: &[&str] = match format {
        "m4a" if source_ext == "m4a" => &["-c:a", "copy"],
        "m4a" => &["-c:a", "aac", "-b:a", "192k"],
        "mp3" => &["-c:a", "libmp3lame", "-q:a", "2"],
        "opus" if source_ext == "opus" => &["-c:a", "copy"],
        "opus" => &["-c:a", "libopus", "-b:a", "160k"],
        "flac" => &["-c:a", "flac"],
        "wav" => &["-c:a", "pcm_s16le"],
        other => {
            return Err(YtBatchError::InvalidConfig(format!(
                "unsupported audio format '{}', expected one of {}",
                other,
                AUDIO_FORMATS.join(", ")
            )));
        }
    };

    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect();
    // Periodic key=value lines keep the stall watchdog fed
    args.extend(["-progress".to_string(), "pipe:1".to_string(), "-nostats".to_string()]);
    args.extend(["-i".to_string(), input.to_string_lossy().into_owned()]);
    args.push("-vn".to_string());
    args.extend(codec.iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}
