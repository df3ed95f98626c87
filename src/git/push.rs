use std::path::Path;

use tracing::{info, warn};

use super::command::{GitCommand, GitRunner};
use crate::error::{MergeError, Result};

/// Push `refspec` to `remote`, classifying rejections.
///
/// A rejection because the remote moved on becomes
/// [`MergeError::PushOutOfDate`]; a hook or policy refusal becomes
/// [`MergeError::PushRejected`].
pub fn push(
    git: &dyn GitRunner,
    dir: &Path,
    remote: &str,
    refspec: &str,
    force_with_lease: Option<&str>,
    env: Vec<(String, String)>,
) -> Result<()> {
    let mut cmd = GitCommand::new("push");
    if let Some(lease) = force_with_lease {
        cmd = cmd.arg(format!("--force-with-lease={lease}"));
    }
    let cmd = cmd.args([remote, refspec]).envs(env).dir(dir);

    let output = git.output(&cmd)?;
    if output.success() {
        info!(remote, refspec, "pushed");
        return Ok(());
    }
    warn!(remote, refspec, stderr = %output.stderr.trim(), "push failed");
    Err(classify_push_error(&output.stderr).unwrap_or_else(|| output.into_error(&cmd, refspec)))
}

fn classify_push_error(stderr: &str) -> Option<MergeError> {
    if stderr.contains("! [remote rejected]") {
        let message = stderr
            .lines()
            .find(|l| l.contains("[remote rejected]"))
            .and_then(|l| l.rsplit_once('(').map(|(_, r)| r.trim_end_matches(')').to_string()))
            .unwrap_or_else(|| stderr.trim().to_string());
        return Some(MergeError::PushRejected { message });
    }
    let moved = stderr.contains("fetch first") || stderr.contains("non-fast-forward");
    if (stderr.contains("[rejected]") && moved) || stderr.contains("stale info")
    {
        return Some(MergeError::PushOutOfDate {
            stderr: stderr.trim().to_string(),
        });
    }
    None
}
