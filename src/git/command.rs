//! Git command builder and runner abstraction
//!
//! Every git invocation in the crate is a [`GitCommand`] handed to a
//! [`GitRunner`]. Production code uses [`SystemGit`], which shells out via
//! the process runner; tests substitute a runner that records or scripts
//! commands.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::error::{classify_git_stderr, MergeError, Result};
use crate::process::{CancelToken, ProcessRunner, RunError, RunOptions, StdinSource, Timeout};

/// One git invocation: arguments, working directory, environment and input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitCommand {
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    stdin: Option<Vec<u8>>,
    timeout: Timeout,
}

impl GitCommand {
    pub fn new(subcommand: &str) -> Self {
        Self {
            args: vec![subcommand.to_string()],
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// The subcommand, e.g. `merge-base`.
    pub fn name(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        self.args.join(" ")
    }
}

/// Exit code and captured output of a git command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout as trimmed text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Non-empty stdout lines.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// NUL-separated stdout fields (`-z` output).
    pub fn nul_fields(&self) -> Vec<String> {
        self.stdout
            .split(|b| *b == 0)
            .filter(|f| !f.is_empty())
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }

    /// The error a failed command should surface as.
    pub fn into_error(self, cmd: &GitCommand, subject: &str) -> MergeError {
        classify_git_stderr(&self.stderr, subject).unwrap_or_else(|| MergeError::Git {
            command: cmd.display(),
            code: self.code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Executes git commands.
///
/// `output` only fails when the command could not run to completion
/// (spawn failure, timeout, cancellation); a non-zero exit is reported in
/// [`GitOutput::code`]. The provided helpers turn exits into errors.
pub trait GitRunner: Send + Sync {
    fn output(&self, cmd: &GitCommand) -> Result<GitOutput>;

    /// Run and return trimmed stdout, failing on a non-zero exit.
    fn checked(&self, cmd: &GitCommand) -> Result<String> {
        Ok(self.checked_output(cmd)?.text())
    }

    /// Run and return the full output, failing on a non-zero exit.
    fn checked_output(&self, cmd: &GitCommand) -> Result<GitOutput> {
        let output = self.output(cmd)?;
        if output.success() {
            Ok(output)
        } else {
            let subject = cmd.get_args().last().cloned().unwrap_or_default();
            Err(output.into_error(cmd, &subject))
        }
    }

    /// True when the command exits 0; any failure reads as `false`.
    fn succeeds(&self, cmd: &GitCommand) -> bool {
        self.output(cmd).map(|o| o.success()).unwrap_or(false)
    }
}

/// Environment applied to every command so stderr matching is stable and
/// git never prompts.
fn base_env() -> Vec<(String, String)> {
    vec![
        ("LC_ALL".to_string(), "C".to_string()),
        ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()),
    ]
}

/// Runs the real git binary through [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct SystemGit {
    binary: String,
    runner: ProcessRunner,
    cancel: CancelToken,
}

impl SystemGit {
    pub fn new(binary: impl Into<String>, runner: ProcessRunner, cancel: CancelToken) -> Self {
        Self {
            binary: binary.into(),
            runner,
            cancel,
        }
    }

    /// Token whose cancellation kills every in-flight command.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl GitRunner for SystemGit {
    fn output(&self, cmd: &GitCommand) -> Result<GitOutput> {
        let mut env = base_env();
        env.extend(cmd.get_env().iter().cloned());

        let opts = RunOptions {
            dir: cmd.get_dir().map(Path::to_path_buf),
            env,
            stdin: cmd.get_stdin().map(|b| StdinSource::Bytes(b.to_vec())),
            timeout: cmd.timeout,
            cancel: Some(self.cancel.clone()),
            ..Default::default()
        };

        trace!(git = %cmd.display(), dir = ?cmd.get_dir(), "running git");
        match self.runner.run(&self.binary, cmd.get_args(), opts) {
            Ok(out) => {
                if !out.success() {
                    debug!(git = %cmd.display(), code = ?out.code(), stderr = %out.stderr.trim(), "git exited non-zero");
                }
                Ok(GitOutput {
                    code: out.code(),
                    stdout: out.stdout,
                    stderr: out.stderr,
                })
            }
            Err(RunError::TimedOut { after, .. }) => Err(MergeError::Timeout {
                command: cmd.display(),
                after,
            }),
            Err(RunError::Cancelled) => Err(MergeError::Cancelled {
                command: cmd.display(),
            }),
            Err(RunError::Spawn(e)) | Err(RunError::Wait(e)) => Err(MergeError::Io(e)),
        }
    }
}

/// Wraps another runner and records every command it is given.
pub struct RecordingGit {
    inner: Arc<dyn GitRunner>,
    log: Mutex<Vec<GitCommand>>,
}

impl RecordingGit {
    pub fn new(inner: Arc<dyn GitRunner>) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<GitCommand> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Recorded subcommand names in call order.
    pub fn names(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.name().to_string()).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }
}

impl GitRunner for RecordingGit {
    fn output(&self, cmd: &GitCommand) -> Result<GitOutput> {
        if let Ok(mut log) = self.log.lock() {
            log.push(cmd.clone());
        }
        self.inner.output(cmd)
    }
}

/// Subcommands that never change a repository's refs or objects.
pub fn is_read_only(name: &str) -> bool {
    matches!(
        name,
        "rev-parse" | "rev-list" | "merge-base" | "log" | "diff" | "ls-files" | "cat-file" | "show-ref"
    )
}
