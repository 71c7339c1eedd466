//! yt-batch - download many videos at once
//!
//! Runs yt-dlp (and ffmpeg for audio) over a batch of URLs with parallel
//! workers, one combined progress bar and per-item error reporting.

mod core;
mod error;
mod storage;
mod types;
mod ui;
mod utils;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::batch::parse_batch;
use crate::core::command::AUDIO_FORMATS;
use crate::core::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::core::playlist::expand_playlist;
use crate::core::runner::SubprocessRunner;
use crate::core::tools::{EXTRACTOR, TRANSCODER, Toolchain, resolve_tool, tool_version};
use crate::core::updater::{record_update, update_extractor};
use crate::storage::config;
use crate::types::{Config, DownloadMode, DownloadTask};
use crate::ui::prompt::{prompt_mode, prompt_urls};
use crate::ui::view::{BatchView, summary_line};
use crate::utils::desktop::open_folder;
use crate::utils::logging::init_tracing;
use crate::utils::paths::{ensure_dir, resolve_download_dir};

/// Download a batch of videos or audio tracks with yt-dlp.
#[derive(Parser, Debug)]
#[command(name = "yt-batch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// URLs to download
    urls: Vec<String>,

    /// Extract audio instead of keeping the video
    #[arg(short, long)]
    audio: bool,

    /// Container (video) or codec (audio), overrides the config
    #[arg(short, long)]
    format: Option<String>,

    /// Download every entry of a playlist
    #[arg(short, long)]
    playlist: Option<String>,

    /// Read URLs from a file, one per line
    #[arg(short, long)]
    batch_file: Option<PathBuf>,

    /// Download directory
    #[arg(short, long)]
    output: Option<String>,

    /// Parallel downloads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Seconds of silence before a download is killed, 0 disables
    #[arg(long)]
    stall_timeout: Option<u64>,

    /// Open the download folder when done
    #[arg(long)]
    open: bool,

    /// Show where yt-dlp and ffmpeg are and their versions
    #[arg(long)]
    check_tools: bool,

    /// Update yt-dlp and exit
    #[arg(long)]
    update: bool,

    /// Edit the configuration file
    #[arg(short, long)]
    edit: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line values take precedence over the config file
    fn apply_to(&self, cfg: &mut Config) {
        if let Some(dir) = &self.output {
            cfg.download_dir = dir.clone();
        }
        if let Some(jobs) = self.jobs {
            cfg.concurrency = jobs.max(1);
        }
        if let Some(secs) = self.stall_timeout {
            cfg.stall_timeout_secs = secs;
        }
        if self.open {
            cfg.auto_open_folder = true;
        }
    }

    fn has_input(&self) -> bool {
        !self.urls.is_empty() || self.playlist.is_some() || self.batch_file.is_some()
    }
}

/// Print location and version of each tool
async fn check_tools(cfg: &Config) -> bool {
    let mut all_found = true;
    for (name, custom) in [(EXTRACTOR, cfg.ytdlp_path.as_deref()), (TRANSCODER, cfg.ffmpeg_path.as_deref())] {
        match resolve_tool(name, custom).await {
            Ok(path) => {
                let version = tool_version(&path).await.unwrap_or_else(|_| "unknown version".into());
                println!("{} {} {} {}", "✓".green(), name.bold(), version, format!("({})", path.display()).dimmed());
            }
            Err(e) => {
                all_found = false;
                println!("{} {} {}", "✗".red(), name.bold(), e.to_string().red());
            }
        }
    }
    all_found
}

/// Run `yt-dlp -U` and remember the result in the config
async fn update_tools(cfg: &mut Config) -> anyhow::Result<()> {
    let extractor = resolve_tool(EXTRACTOR, cfg.ytdlp_path.as_deref()).await?;
    println!("{}", "Updating yt-dlp...".dimmed());

    let outcome = update_extractor(&extractor).await?;
    if outcome.updated() {
        println!("{} {} -> {}", "Updated yt-dlp:".green(), outcome.previous, outcome.current);
    } else {
        println!("{} {}", "yt-dlp is up to date:".green(), outcome.current);
    }

    record_update(cfg, &outcome);
    config::save_config(cfg).await?;
    Ok(())
}

/// Collect the tasks from arguments, a batch file or the prompt
async fn collect_tasks(
    cli: &Cli,
    cfg: &Config,
    orchestrator: &Orchestrator,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<DownloadTask>> {
    let mut mode = if cli.audio { DownloadMode::Audio } else { DownloadMode::Video };
    let format = cli.format.as_deref();

    let mut urls = cli.urls.clone();
    if !cli.has_input() {
        urls = prompt_urls()?;
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        if !cli.audio {
            match prompt_mode()? {
                Some(chosen) => mode = chosen,
                None => return Ok(Vec::new()),
            }
        }
    }

    if mode == DownloadMode::Audio {
        let codec = format.unwrap_or(cfg.audio_format.as_str());
        if !AUDIO_FORMATS.contains(&codec) {
            bail!("unsupported audio format '{}', expected one of {}", codec, AUDIO_FORMATS.join(", "));
        }
    }

    let mut tasks = parse_batch(&urls.join("\n"), mode, format);

    if let Some(path) = &cli.batch_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read batch file {}", path.display()))?;
        tasks.extend(parse_batch(&text, mode, format));
    }

    if let Some(url) = &cli.playlist {
        println!("{}", "Reading playlist...".dimmed());
        let playlist = expand_playlist(orchestrator.runner(), orchestrator.tools(), url, mode, format, cancel).await?;
        if let Some(title) = &playlist.title {
            println!("{} {} ({} items)", "Playlist:".cyan(), title, playlist.tasks.len());
        }
        tasks.extend(playlist.tasks);
    }

    Ok(tasks)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = config::load_config().await?;

    // Handle --edit flag
    if cli.edit {
        config::edit_config(&cfg.editor).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.check_tools {
        let found = check_tools(&cfg).await;
        return Ok(if found { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    if cli.update {
        update_tools(&mut cfg).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cfg.auto_update {
        if let Err(e) = update_tools(&mut cfg).await {
            warn!(error = %e, "automatic update failed");
            eprintln!("{} {}", "Update failed:".yellow(), e);
        }
    }

    cli.apply_to(&mut cfg);

    let tools = match Toolchain::resolve(&cfg).await {
        Ok(tools) => tools,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let output_dir = resolve_download_dir(&cfg.download_dir);
    ensure_dir(&output_dir.to_string_lossy()).await?;
    debug!(output = %output_dir.display(), "download directory");

    let orchestrator = Orchestrator::new(
        Arc::new(SubprocessRunner),
        tools,
        OrchestratorOptions::from_config(&cfg, output_dir.clone()),
    );

    // Ctrl-C stops playlist expansion and the batch alike
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let tasks = collect_tasks(&cli, &cfg, &orchestrator, &shutdown).await?;
    if tasks.is_empty() {
        println!("{}", "Nothing to download.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    let mut handle = orchestrator.submit(tasks);
    let batch_token = handle.cancel_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        batch_token.cancel();
    });

    let mut view = BatchView::new(cli.verbose > 0);
    while let Some(event) = handle.next_event().await {
        view.handle(&event);
    }
    view.finish();

    let batch = match handle.wait().await {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let summary = batch.summary();
    println!("{}", summary_line(&summary));

    if cfg.auto_open_folder && summary.succeeded > 0 {
        if let Err(e) = open_folder(&output_dir).await {
            warn!(error = %e, "could not open download folder");
        }
    }

    Ok(if summary.all_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
