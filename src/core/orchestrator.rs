//! Multi-item download orchestration
//!
//! Workers run one task each and report to a single aggregator loop over a
//! channel. The aggregator is the only writer of the [`BatchRun`]; it turns
//! worker messages into [`DownloadEvent`]s for the presentation layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::batch::validate_url;
use crate::core::command::{CommandOptions, extractor_args, transcode_target, transcoder_args};
use crate::core::progress::{ItemState, ToolLine, parse_line};
use crate::core::runner::{Invocation, ToolRunner};
use crate::core::tools::{EXTRACTOR, TRANSCODER, Toolchain};
use crate::error::{Result, YtBatchError, exit_label};
use crate::types::{BatchRun, Config, DownloadEvent, DownloadMode, DownloadResult, DownloadTask};

/// In-flight items never count as done; the aggregate only reaches 1.0
/// once every result is recorded
const ITEM_CEILING: f64 = 0.99;

/// Portion of an audio item's progress spent downloading; the rest is transcoding
const AUDIO_DOWNLOAD_SHARE: f64 = 0.9;

/// Settings for a run
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub stall_timeout: Option<Duration>,
    pub video_format: String,
    pub audio_format: String,
    pub structured_progress: bool,
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config, output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            concurrency: config.concurrency.max(1),
            stall_timeout: (config.stall_timeout_secs > 0)
                .then(|| Duration::from_secs(config.stall_timeout_secs)),
            video_format: config.video_format.clone(),
            audio_format: config.audio_format.clone(),
            structured_progress: config.structured_progress,
        }
    }
}

/// Messages from workers to the aggregator
#[derive(Debug)]
enum WorkerMsg {
    Started { index: usize, task: DownloadTask },
    Progress { index: usize, fraction: f64 },
    Log { index: usize, line: String },
    Finished { index: usize, result: DownloadResult },
    Cancelled { index: usize },
    Fatal { index: usize, error: YtBatchError },
}

/// Runs batches of download tasks
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn ToolRunner>,
    tools: Toolchain,
    options: Arc<OrchestratorOptions>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: Toolchain, options: OrchestratorOptions) -> Self {
        Self {
            runner,
            tools,
            options: Arc::new(options),
        }
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    pub fn tools(&self) -> &Toolchain {
        &self.tools
    }

    /// Start a batch in the background and hand back its controls
    pub fn submit(&self, tasks: Vec<DownloadTask>) -> BatchHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.clone().run(tasks, events_tx, cancel.clone()));

        BatchHandle {
            events: events_rx,
            cancel,
            join,
        }
    }

    /// Run a batch to completion.
    ///
    /// Per-item failures end up in the results. Only a missing tool aborts
    /// the run, in which case the error is returned.
    pub async fn run(
        self,
        tasks: Vec<DownloadTask>,
        events: mpsc::UnboundedSender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<BatchRun> {
        let total = tasks.len();
        let mut batch = BatchRun::new(tasks.clone());
        info!(total, concurrency = self.options.concurrency, "batch started");
        let _ = events.send(DownloadEvent::BatchStarted { total });

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(self.clone().dispatch(tasks, msg_tx, cancel.clone()));

        let mut in_flight: HashMap<usize, f64> = HashMap::new();
        let mut fatal: Option<YtBatchError> = None;

        while let Some(msg) = msg_rx.recv().await {
            match msg {
                WorkerMsg::Started { index, task } => {
                    in_flight.insert(index, 0.0);
                    let _ = events.send(DownloadEvent::ItemStarted { index, task });
                }
                WorkerMsg::Progress { index, fraction } => {
                    let Some(current) = in_flight.get_mut(&index) else {
                        continue;
                    };
                    *current = fraction.clamp(0.0, ITEM_CEILING).max(*current);
                    let fraction = *current;
                    let aggregate = batch.advance_progress(aggregate_of(&batch, &in_flight));
                    let _ = events.send(DownloadEvent::ItemProgress {
                        index,
                        fraction,
                        aggregate,
                    });
                }
                WorkerMsg::Log { index, line } => {
                    let _ = events.send(DownloadEvent::ItemLog { index, line });
                }
                WorkerMsg::Finished { index, result } => {
                    in_flight.remove(&index);
                    if !batch.record(index, result.clone()) {
                        warn!(index, "duplicate result ignored");
                        continue;
                    }
                    let aggregate = batch.advance_progress(aggregate_of(&batch, &in_flight));
                    let _ = events.send(DownloadEvent::ItemFinished {
                        index,
                        result,
                        aggregate,
                    });
                }
                WorkerMsg::Cancelled { index } => {
                    in_flight.remove(&index);
                    let _ = events.send(DownloadEvent::ItemCancelled { index });
                }
                WorkerMsg::Fatal { index, error } => {
                    in_flight.remove(&index);
                    error!(index, "fatal error, stopping batch: {}", error);
                    cancel.cancel();
                    fatal.get_or_insert(error);
                }
            }
        }

        if let Err(e) = dispatcher.await {
            warn!("dispatcher task failed: {}", e);
        }

        if let Some(error) = fatal {
            return Err(error);
        }

        batch.cancelled = cancel.is_cancelled();
        let summary = batch.summary();
        info!(?summary, "batch finished");
        let _ = events.send(DownloadEvent::BatchFinished { summary });
        Ok(batch)
    }

    /// Hand tasks to workers in order, at most `concurrency` at a time
    async fn dispatch(
        self,
        tasks: Vec<DownloadTask>,
        msg_tx: mpsc::UnboundedSender<WorkerMsg>,
        cancel: CancellationToken,
    ) {
        let slots = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut workers = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if cancel.is_cancelled() {
                break;
            }

            let worker = self.clone();
            let tx = msg_tx.clone();
            let token = cancel.clone();
            workers.spawn(async move {
                worker.process(index, task, &tx, &token).await;
                drop(permit);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("download worker panicked: {}", e);
            }
        }
    }

    async fn process(
        &self,
        index: usize,
        task: DownloadTask,
        tx: &mpsc::UnboundedSender<WorkerMsg>,
        cancel: &CancellationToken,
    ) {
        let _ = tx.send(WorkerMsg::Started {
            index,
            task: task.clone(),
        });

        if let Err(e) = validate_url(&task.url) {
            debug!(index, url = %task.url, "rejected before download: {}", e);
            let _ = tx.send(WorkerMsg::Finished {
                index,
                result: DownloadResult::failed(task, &e),
            });
            return;
        }

        let msg = match self.download(index, &task, tx, cancel).await {
            Ok(result) => WorkerMsg::Finished { index, result },
            Err(YtBatchError::Cancelled) => WorkerMsg::Cancelled { index },
            Err(error) if error.kind().is_fatal() => {
                // Stop the dispatcher before this slot is released
                cancel.cancel();
                WorkerMsg::Fatal { index, error }
            }
            Err(error) => {
                warn!(index, url = %task.url, "download failed: {}", error);
                WorkerMsg::Finished {
                    index,
                    result: DownloadResult::failed(task, &error),
                }
            }
        };
        let _ = tx.send(msg);
    }

    async fn download(
        &self,
        index: usize,
        task: &DownloadTask,
        tx: &mpsc::UnboundedSender<WorkerMsg>,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        if cancel.is_cancelled() {
            return Err(YtBatchError::Cancelled);
        }

        let share = match task.mode {
            DownloadMode::Video => 1.0,
            DownloadMode::Audio => AUDIO_DOWNLOAD_SHARE,
        };
        let invocation = Invocation::new(&self.tools.extractor, extractor_args(task, &self.command_options()))
            .with_stall_timeout(self.options.stall_timeout);

        let mut state = ItemState::default();
        let mut last_line: Option<String> = None;
        let outcome = self
            .runner
            .run(
                &invocation,
                &mut |line: String| {
                    let Some(parsed) = parse_line(&line) else {
                        return;
                    };
                    if let ToolLine::Other(text) = &parsed {
                        last_line = Some(text.clone());
                        let _ = tx.send(WorkerMsg::Log {
                            index,
                            line: text.clone(),
                        });
                    }
                    if state.apply(&parsed) {
                        let _ = tx.send(WorkerMsg::Progress {
                            index,
                            fraction: state.fraction * share,
                        });
                    }
                },
                cancel,
            )
            .await?;

        if !outcome.success {
            let message = state
                .error_text()
                .or(last_line)
                .unwrap_or_else(|| "no error output".to_string());
            return Err(YtBatchError::from_tool_exit(EXTRACTOR, outcome.code, message));
        }

        let reused = state.reused_existing_file();
        match task.mode {
            DownloadMode::Video if reused => Ok(DownloadResult::skipped(task.clone(), state.output_path())),
            DownloadMode::Video => Ok(DownloadResult::success(task.clone(), state.output_path())),
            DownloadMode::Audio => {
                let input = state.output_path().ok_or_else(|| {
                    YtBatchError::Parse("extractor did not report the downloaded file".into())
                })?;

                // An old download still needs converting unless the
                // converted file is there too
                let target = transcode_target(&input, self.audio_format(task));
                if reused && (target == input || target.exists()) {
                    debug!(index, path = %target.display(), "audio already converted");
                    return Ok(DownloadResult::skipped(task.clone(), Some(target)));
                }

                let output = self.transcode(index, task, &input, tx, cancel).await?;
                Ok(DownloadResult::success(task.clone(), Some(output)))
            }
        }
    }

    fn audio_format<'a>(&'a self, task: &'a DownloadTask) -> &'a str {
        task.target_format
            .as_deref()
            .unwrap_or(self.options.audio_format.as_str())
    }

    /// Convert a downloaded audio stream to the requested codec
    async fn transcode(
        &self,
        index: usize,
        task: &DownloadTask,
        input: &Path,
        tx: &mpsc::UnboundedSender<WorkerMsg>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let format = self.audio_format(task);
        let output = transcode_target(input, format);
        if output == input {
            debug!(index, path = %input.display(), "already in target format");
            return Ok(output);
        }

        if cancel.is_cancelled() {
            return Err(YtBatchError::Cancelled);
        }

        let args = transcoder_args(input, &output, format)?;
        let invocation =
            Invocation::new(&self.tools.transcoder, args).with_stall_timeout(self.options.stall_timeout);

        let mut errors: Vec<String> = Vec::new();
        let outcome = self
            .runner
            .run(
                &invocation,
                &mut |line: String| {
                    // `-progress` output is all key=value pairs
                    if !line.trim().is_empty() && !line.contains('=') {
                        errors.push(line);
                    }
                },
                cancel,
            )
            .await?;

        if !outcome.success {
            let message = if errors.is_empty() {
                format!("{} exited with {}", TRANSCODER, exit_label(&outcome.code))
            } else {
                errors.join("\n")
            };
            return Err(YtBatchError::Transcode(message));
        }

        let _ = tx.send(WorkerMsg::Progress {
            index,
            fraction: ITEM_CEILING,
        });

        if let Err(e) = tokio::fs::remove_file(input).await {
            warn!(path = %input.display(), "could not remove intermediate file: {}", e);
        }

        Ok(output)
    }

    fn command_options(&self) -> CommandOptions {
        CommandOptions {
            output_dir: self.options.output_dir.clone(),
            transcoder: self.tools.transcoder.clone(),
            video_format: self.options.video_format.clone(),
            structured_progress: self.options.structured_progress,
        }
    }
}

/// (completed + sum of in-flight fractions) / total
fn aggregate_of(batch: &BatchRun, in_flight: &HashMap<usize, f64>) -> f64 {
    let total = batch.total();
    if total == 0 {
        return 1.0;
    }
    let running: f64 = in_flight.values().sum();
    (batch.completed() as f64 + running) / total as f64
}

/// Controls for a submitted batch
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Result<BatchRun>>,
}

impl BatchHandle {
    /// Kill in-flight downloads and start no new ones
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, `None` once the batch is over and all events are drained
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Next finished item, skipping the other events
    pub async fn next_result(&mut self) -> Option<DownloadResult> {
        while let Some(event) = self.events.recv().await {
            if let DownloadEvent::ItemFinished { result, .. } = event {
                return Some(result);
            }
        }
        None
    }

    /// Wait for the batch and return its final state
    pub async fn wait(self) -> Result<BatchRun> {
        self.join
            .await
            .map_err(|e| YtBatchError::Spawn(format!("batch task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runner::ExitOutcome;
    use crate::error::ErrorKind;
    use crate::types::DownloadStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// What the fake tool does for a given URL
    #[derive(Clone)]
    enum Script {
        Succeed,
        Fail(&'static str),
        AlreadyThere,
        /// Quiet tagged run: only the final path, no progress
        Reused(PathBuf),
        /// Emit some progress, then wait until cancelled
        Hang,
        Stall,
        MissingTool,
    }

    struct FakeRunner {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl FakeRunner {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts.iter().map(|(u, s)| (u.to_string(), s.clone())).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        fn extractor_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.program == Path::new("yt-dlp"))
                .count()
        }
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            on_line: &mut (dyn FnMut(String) + Send),
            cancel: &CancellationToken,
        ) -> Result<ExitOutcome> {
            self.calls.lock().unwrap().push(invocation.clone());

            if invocation.program == Path::new("ffmpeg") {
                on_line("progress=end".into());
                return Ok(ExitOutcome::ok());
            }

            let url = invocation.args.last().cloned().unwrap_or_default();
            let name = url.rsplit('/').next().unwrap_or("clip").to_string();
            match self.scripts.get(&url).cloned().unwrap_or(Script::Succeed) {
                Script::Succeed => {
                    for pct in [10, 50, 100] {
                        on_line(format!("ytb-progress {} 100 NA", pct));
                        tokio::task::yield_now().await;
                    }
                    on_line(format!("ytb-file /out/{}.webm", name));
                    Ok(ExitOutcome::ok())
                }
                Script::Fail(msg) => {
                    on_line(format!("ERROR: {}", msg));
                    Ok(ExitOutcome::failed(1))
                }
                Script::AlreadyThere => {
                    on_line(format!("[download] /out/{}.mp4 has already been downloaded", name));
                    Ok(ExitOutcome::ok())
                }
                Script::Reused(path) => {
                    on_line(format!("ytb-file {}", path.display()));
                    Ok(ExitOutcome::ok())
                }
                Script::Hang => {
                    on_line("ytb-progress 30 100 NA".into());
                    cancel.cancelled().await;
                    Err(YtBatchError::Cancelled)
                }
                Script::Stall => Err(YtBatchError::Stalled(1)),
                Script::MissingTool => Err(YtBatchError::ToolNotFound("yt-dlp".into())),
            }
        }
    }

    fn orchestrator(runner: Arc<FakeRunner>, concurrency: usize) -> Orchestrator {
        let tools = Toolchain {
            extractor: PathBuf::from("yt-dlp"),
            transcoder: PathBuf::from("ffmpeg"),
        };
        let mut options = OrchestratorOptions::from_config(&Config::default(), PathBuf::from("/out"));
        options.concurrency = concurrency;
        Orchestrator::new(runner, tools, options)
    }

    fn tasks(urls: &[&str]) -> Vec<DownloadTask> {
        urls.iter()
            .map(|u| DownloadTask::new(*u, DownloadMode::Video))
            .collect()
    }

    async fn drain(handle: &mut BatchHandle) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    fn aggregates(events: &[DownloadEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::ItemProgress { aggregate, .. } => Some(*aggregate),
                DownloadEvent::ItemFinished { aggregate, .. } => Some(*aggregate),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_malformed_task_fails_alone() {
        let runner = FakeRunner::new(&[]);
        let urls = ["https://youtu.be/a", "not a url", "https://youtu.be/c", "https://youtu.be/d"];
        let mut handle = orchestrator(runner.clone(), 1).submit(tasks(&urls));
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert_eq!(batch.results.len(), 4);
        for result in &batch.results {
            if result.task.url == "not a url" {
                assert_eq!(result.status, DownloadStatus::Failed);
                assert_eq!(result.error_kind, Some(ErrorKind::InvalidUrl));
            } else {
                assert_eq!(result.status, DownloadStatus::Success, "{}", result.task.url);
            }
        }
        // The malformed URL never reached the tool
        assert_eq!(runner.extractor_calls(), 3);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_stop_batch() {
        let runner = FakeRunner::new(&[(
            "https://youtu.be/b",
            Script::Fail("Unable to download webpage: HTTP Error 503"),
        )]);
        let mut handle =
            orchestrator(runner, 1).submit(tasks(&["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c"]));
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        let summary = batch.summary();
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
        let failed = batch.results.iter().find(|r| r.is_failed()).unwrap();
        assert_eq!(failed.error_kind, Some(ErrorKind::NetworkFailure));
        assert!(failed.error_message.as_deref().unwrap().contains("HTTP Error 503"));
    }

    #[tokio::test]
    async fn test_aggregate_is_monotonic_and_ends_at_one() {
        for concurrency in [1, 3] {
            let runner = FakeRunner::new(&[("https://youtu.be/c", Script::Fail("boom"))]);
            let urls = ["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c", "https://youtu.be/d"];
            let mut handle = orchestrator(runner, concurrency).submit(tasks(&urls));
            let events = drain(&mut handle).await;
            handle.wait().await.unwrap();

            let values = aggregates(&events);
            assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);

            let mut finished = 0;
            for event in &events {
                match event {
                    DownloadEvent::ItemFinished { aggregate, .. } => {
                        finished += 1;
                        if finished < urls.len() {
                            assert!(*aggregate < 1.0);
                        } else {
                            assert_eq!(*aggregate, 1.0);
                        }
                    }
                    DownloadEvent::ItemProgress { aggregate, .. } => assert!(*aggregate < 1.0),
                    _ => {}
                }
            }
            assert_eq!(finished, urls.len());
        }
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_results() {
        let runner = FakeRunner::new(&[("https://youtu.be/b", Script::Hang)]);
        let urls = ["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c"];
        let mut handle = orchestrator(runner.clone(), 1).submit(tasks(&urls));

        let mut finished_before_cancel = Vec::new();
        let mut saw_cancelled = false;
        while let Some(event) = handle.next_event().await {
            match event {
                DownloadEvent::ItemFinished { result, .. } => finished_before_cancel.push(result.task.url),
                DownloadEvent::ItemProgress { index: 1, .. } => handle.cancel(),
                DownloadEvent::ItemCancelled { index } => {
                    assert_eq!(index, 1);
                    saw_cancelled = true;
                }
                DownloadEvent::BatchFinished { summary } => {
                    assert!(summary.cancelled);
                    assert_eq!(summary.not_run, 2);
                }
                _ => {}
            }
        }
        let batch = handle.wait().await.unwrap();

        assert!(saw_cancelled);
        assert_eq!(finished_before_cancel, vec!["https://youtu.be/a"]);
        assert_eq!(batch.results.len(), 1);
        assert!(batch.cancelled);
        // Nothing was started for the third task
        assert_eq!(runner.extractor_calls(), 2);
    }

    #[tokio::test]
    async fn test_stalled_item_is_failed() {
        let runner = FakeRunner::new(&[("https://youtu.be/a", Script::Stall)]);
        let mut handle = orchestrator(runner, 1).submit(tasks(&["https://youtu.be/a", "https://youtu.be/b"]));
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert_eq!(batch.results[0].error_kind, Some(ErrorKind::Stalled));
        assert_eq!(batch.results[1].status, DownloadStatus::Success);
    }

    #[tokio::test]
    async fn test_missing_tool_is_fatal() {
        let runner = FakeRunner::new(&[("https://youtu.be/a", Script::MissingTool)]);
        let mut handle = orchestrator(runner.clone(), 1).submit(tasks(&["https://youtu.be/a", "https://youtu.be/b"]));
        drain(&mut handle).await;

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
        assert_eq!(runner.extractor_calls(), 1);
    }

    #[tokio::test]
    async fn test_already_downloaded_is_skipped() {
        let runner = FakeRunner::new(&[("https://youtu.be/a", Script::AlreadyThere)]);
        let mut handle = orchestrator(runner, 1).submit(tasks(&["https://youtu.be/a"]));
        let result = handle.next_result().await.unwrap();

        assert_eq!(result.status, DownloadStatus::Skipped);
        assert_eq!(result.output_path, Some(PathBuf::from("/out/a.mp4")));
    }

    #[tokio::test]
    async fn test_existing_audio_download_is_still_converted() {
        let runner = FakeRunner::new(&[("https://youtu.be/a", Script::AlreadyThere)]);
        let mut options = OrchestratorOptions::from_config(&Config::default(), PathBuf::from("/out"));
        options.structured_progress = false;
        let tools = Toolchain {
            extractor: PathBuf::from("yt-dlp"),
            transcoder: PathBuf::from("ffmpeg"),
        };
        let task = DownloadTask::new("https://youtu.be/a", DownloadMode::Audio).with_format(Some("mp3".into()));
        let mut handle = Orchestrator::new(runner.clone(), tools, options).submit(vec![task]);
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert_eq!(batch.results[0].status, DownloadStatus::Success);
        assert_eq!(batch.results[0].output_path, Some(PathBuf::from("/out/a.mp3")));
        let programs: Vec<PathBuf> = runner.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(programs, vec![PathBuf::from("yt-dlp"), PathBuf::from("ffmpeg")]);
    }

    #[tokio::test]
    async fn test_converted_audio_on_disk_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.webm");
        std::fs::write(dir.path().join("a.mp3"), b"").unwrap();

        let runner = FakeRunner::new(&[("https://youtu.be/a", Script::Reused(source))]);
        let task = DownloadTask::new("https://youtu.be/a", DownloadMode::Audio).with_format(Some("mp3".into()));
        let mut handle = orchestrator(runner.clone(), 1).submit(vec![task]);
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert_eq!(batch.results[0].status, DownloadStatus::Skipped);
        assert_eq!(batch.results[0].output_path, Some(dir.path().join("a.mp3")));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_tagged_output_without_progress_is_skipped() {
        let runner = FakeRunner::new(&[("https://youtu.be/clip", Script::Reused("/out/clip.mp4".into()))]);
        let mut handle = orchestrator(runner, 1).submit(tasks(&["https://youtu.be/clip"]));
        let result = handle.next_result().await.unwrap();

        assert_eq!(result.status, DownloadStatus::Skipped);
        assert_eq!(result.output_path, Some(PathBuf::from("/out/clip.mp4")));
    }

    #[tokio::test]
    async fn test_audio_task_is_transcoded() {
        let runner = FakeRunner::new(&[]);
        let task = DownloadTask::new("https://youtu.be/song", DownloadMode::Audio).with_format(Some("mp3".into()));
        let mut handle = orchestrator(runner.clone(), 1).submit(vec![task]);
        drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert_eq!(batch.results[0].status, DownloadStatus::Success);
        assert_eq!(batch.results[0].output_path, Some(PathBuf::from("/out/song.mp3")));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, PathBuf::from("ffmpeg"));
        assert!(calls[1].args.contains(&"/out/song.webm".to_string()));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = FakeRunner::new(&[]);
        let mut handle = orchestrator(runner, 1).submit(Vec::new());
        let events = drain(&mut handle).await;
        let batch = handle.wait().await.unwrap();

        assert!(batch.results.is_empty());
        assert!(matches!(events.last(), Some(DownloadEvent::BatchFinished { .. })));
    }
}
