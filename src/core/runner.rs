//! Running an external tool and streaming its output
//!
//! [`ToolRunner`] is the seam between the orchestrator and real processes.
//! [`SubprocessRunner`] is the production implementation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::tools::spawn_error;
use crate::error::{Result, YtBatchError};

/// A fully specified tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Kill the process after this long without an output line
    pub stall_timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stall_timeout: None,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion, passing every stdout/stderr line to `on_line`.
    ///
    /// Returns `Cancelled` once `cancel` fires and `Stalled` when the
    /// watchdog expires; the process is killed in both cases.
    async fn run(
        &self,
        invocation: &Invocation,
        on_line: &mut (dyn FnMut(String) + Send),
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome>;
}

/// Spawns real processes with tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessRunner;

#[async_trait]
impl ToolRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        on_line: &mut (dyn FnMut(String) + Send),
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome> {
        if cancel.is_cancelled() {
            return Err(YtBatchError::Cancelled);
        }

        debug!(program = %invocation.program.display(), args = ?invocation.args, "spawning");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so ffmpeg children of yt-dlp die with it
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| spawn_error(&invocation.program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| YtBatchError::Spawn("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| YtBatchError::Spawn("stderr was not captured".into()))?;

        let mut out = LineReader::new(stdout);
        let mut err = LineReader::new(stderr);

        while !(out.done && err.done) {
            let watchdog = async {
                match invocation.stall_timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    kill(&mut child).await;
                    return Err(YtBatchError::Cancelled);
                }
                line = out.next_line(), if !out.done => {
                    if let Some(line) = line {
                        on_line(line);
                    }
                }
                line = err.next_line(), if !err.done => {
                    if let Some(line) = line {
                        on_line(line);
                    }
                }
                _ = watchdog => {
                    let secs = invocation.stall_timeout.map(|t| t.as_secs()).unwrap_or_default();
                    warn!(program = %invocation.program.display(), secs, "no output, killing stalled process");
                    kill(&mut child).await;
                    return Err(YtBatchError::Stalled(secs));
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill(&mut child).await;
                return Err(YtBatchError::Cancelled);
            }
            status = child.wait() => status?,
        };

        Ok(ExitOutcome {
            success: status.success(),
            code: status.code(),
        })
    }
}

async fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            kill_group(pid).await;
        }
    }
    if let Err(e) = child.kill().await {
        warn!("failed to kill child process: {}", e);
    }
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
async fn kill_group(pid: u32) {
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(pid, ?status, "process group already gone"),
        Err(e) => warn!(pid, "failed to kill process group: {}", e),
    }
}

/// Lossy line reader; survives non-UTF-8 output from the tools
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Next complete line, or `None` at EOF. Partial data stays in `buf`
    /// when the future is dropped, so this is safe inside `select!`.
    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            // EOF. An earlier call dropped mid-line may have left an
            // unterminated last line behind.
            Ok(0) if self.buf.is_empty() => {
                self.done = true;
                None
            }
            Ok(_) => Some(self.take_line()),
            Err(e) => {
                warn!("error reading tool output: {}", e);
                self.done = true;
                None
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buf.clear();
        line
    }
}
