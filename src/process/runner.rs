//! Subprocess execution with timeout and cancellation
//!
//! The child's stdout and stderr are drained on their own threads while the
//! caller waits, and stdin is fed from a third thread. A child that fills a
//! pipe buffer can therefore never deadlock against us.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::CancelToken;

/// How often a waiting caller re-checks its cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period for the drain threads after the child exits.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout policy for a single subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Use the runner's configured default
    #[default]
    Default,
    /// Never time out
    Never,
    /// Explicit limit
    After(Duration),
}

impl Timeout {
    fn resolve(self, default: Duration) -> Option<Duration> {
        match self {
            Timeout::Default => Some(default),
            Timeout::Never => None,
            Timeout::After(d) => Some(d),
        }
    }
}

/// Input fed to the child's stdin.
pub enum StdinSource {
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

/// Options for one subprocess invocation.
#[derive(Default)]
pub struct RunOptions {
    pub dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<StdinSource>,
    /// Stream stdout here instead of capturing it
    pub stdout: Option<Box<dyn Write + Send>>,
    pub timeout: Timeout,
    pub cancel: Option<CancelToken>,
    /// Called with the child's pid after spawn, before waiting
    pub after_start: Option<Box<dyn FnOnce(u32) + Send>>,
}

/// Outcome of a subprocess that ran to completion.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: ExitStatus,
    /// Empty when stdout was streamed to a caller-supplied writer
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub duration: Duration,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Why a subprocess did not produce a [`RunOutput`].
#[derive(Debug)]
pub enum RunError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut { after: Duration, stderr: String },
    Cancelled,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Spawn(e) => write!(f, "failed to spawn: {e}"),
            RunError::Wait(e) => write!(f, "failed to wait: {e}"),
            RunError::TimedOut { after, .. } => write!(f, "timed out after {}s", after.as_secs()),
            RunError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Executes programs with a default timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    default_timeout: Duration,
}

impl ProcessRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `program` with `args` and wait for it under the timeout policy.
    pub fn run(
        &self,
        program: &str,
        args: &[String],
        mut opts: RunOptions,
    ) -> std::result::Result<RunOutput, RunError> {
        let start = Instant::now();
        let limit = opts.timeout.resolve(self.default_timeout);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group so a timeout also reaches git's children
            .process_group(0);
        if let Some(dir) = &opts.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(RunError::Spawn)?;
        debug!(program, pid = child.id(), "spawned subprocess");

        if let Some(callback) = opts.after_start.take() {
            callback(child.id());
        }

        if let (Some(source), Some(mut stdin)) = (opts.stdin.take(), child.stdin.take()) {
            thread::spawn(move || {
                let result = match source {
                    StdinSource::Bytes(bytes) => stdin.write_all(&bytes),
                    StdinSource::Reader(mut reader) => std::io::copy(&mut reader, &mut stdin).map(|_| ()),
                };
                // Broken pipe just means the child stopped reading early
                if let Err(e) = result {
                    debug!("stdin writer finished early: {e}");
                }
            });
        }

        let (stdout_tx, stdout_rx) = mpsc::channel();
        match (child.stdout.take(), opts.stdout.take()) {
            (Some(mut out), Some(mut sink)) => {
                thread::spawn(move || {
                    let _ = std::io::copy(&mut out, &mut sink);
                    let _ = sink.flush();
                    let _ = stdout_tx.send(Vec::new());
                });
            }
            (Some(out), None) => {
                thread::spawn(move || {
                    let _ = stdout_tx.send(read_all(out));
                });
            }
            (None, _) => {
                let _ = stdout_tx.send(Vec::new());
            }
        }

        let (stderr_tx, stderr_rx) = mpsc::channel();
        if let Some(err) = child.stderr.take() {
            thread::spawn(move || {
                let _ = stderr_tx.send(read_all(err));
            });
        } else {
            let _ = stderr_tx.send(Vec::new());
        }

        let status = wait_for_exit(&mut child, limit, opts.cancel.as_ref());

        let collect_stderr = |rx: &mpsc::Receiver<Vec<u8>>| {
            rx.recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default()
        };

        match status {
            WaitOutcome::Exited(status) => {
                let stdout = stdout_rx
                    .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
                    .unwrap_or_default();
                let stderr = collect_stderr(&stderr_rx);
                Ok(RunOutput {
                    status,
                    stdout,
                    stderr,
                    duration: start.elapsed(),
                })
            }
            WaitOutcome::TimedOut(after) => {
                kill_child(&mut child);
                let stderr = collect_stderr(&stderr_rx);
                warn!(program, after_secs = after.as_secs(), "subprocess timed out");
                Err(RunError::TimedOut { after, stderr })
            }
            WaitOutcome::Cancelled => {
                kill_child(&mut child);
                Err(RunError::Cancelled)
            }
            WaitOutcome::Failed(e) => {
                kill_child(&mut child);
                Err(RunError::Wait(e))
            }
        }
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut(Duration),
    Cancelled,
    Failed(std::io::Error),
}

fn wait_for_exit(child: &mut Child, limit: Option<Duration>, cancel: Option<&CancelToken>) -> WaitOutcome {
    let start = Instant::now();
    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return WaitOutcome::Cancelled;
        }

        let slice = match limit {
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    return WaitOutcome::TimedOut(limit);
                }
                (limit - elapsed).min(CANCEL_POLL_INTERVAL)
            }
            None => CANCEL_POLL_INTERVAL,
        };

        match child.wait_timeout(slice) {
            Ok(Some(status)) => return WaitOutcome::Exited(status),
            Ok(None) => continue,
            Err(e) => return WaitOutcome::Failed(e),
        }
    }
}

/// Kill the child's whole process group, then reap it.
fn kill_child(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!("killpg({pid}) failed: {e}");
            let _ = child.kill();
        }
    } else {
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn read_all<R: Read>(mut stream: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    buf
}
