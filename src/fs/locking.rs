//! Advisory-locked file access
//!
//! The persistent queue and the file-backed store are shared between the
//! `serve` process and short-lived CLI invocations. All access goes through
//! `fs2` advisory locks held for the whole read-modify-write cycle.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read the whole file under a shared lock; a missing file reads as empty.
pub fn locked_read(path: &Path) -> Result<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;
    let mut content = String::new();
    (&file).read_to_string(&mut content)?;
    file.unlock()?;
    Ok(content)
}

/// Read, transform and rewrite a file while holding an exclusive lock.
///
/// `update` receives the current content (empty when the file is new) and
/// returns the new content plus a value handed back to the caller. When it
/// returns `None` as new content the file is left untouched. Truncation
/// happens only after the lock is held.
pub fn locked_update<T>(
    path: &Path,
    update: impl FnOnce(&str) -> Result<(Option<String>, T)>,
) -> Result<T> {
    ensure_parent(path)?;
    #[allow(clippy::suspicious_open_options)]
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.lock_exclusive()?;

    let mut current = String::new();
    file.read_to_string(&mut current)?;

    let outcome = update(&current);
    let result = match outcome {
        Ok((Some(next), value)) => {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(next.as_bytes())?;
            file.sync_data()?;
            Ok(value)
        }
        Ok((None, value)) => Ok(value),
        Err(e) => Err(e),
    };

    file.unlock()?;
    result
}

/// Replace the file content under an exclusive lock.
pub fn locked_write(path: &Path, content: &str) -> Result<()> {
    locked_update(path, |_| Ok((Some(content.to_string()), ())))
}
