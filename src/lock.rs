//! Per-box advisory lock serializing manifest writers on one host.
//!
//! Readers (update-checking clients) never take the lock; they rely on the
//! manifest's atomic rename instead.
use crate::error::{IoContext, Result};
use crate::name::BoxName;
use crate::paths::BoxPaths;
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};

/// Held for the duration of a load-modify-save cycle; released on drop.
#[derive(Debug)]
pub struct BoxLock {
    _file: File,
}

impl BoxLock {
    /// Block until the exclusive lock for `name` is available.
    pub fn acquire(paths: &BoxPaths, name: &BoxName) -> Result<Self> {
        let path = paths.lock_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).io_context(|| format!("create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .io_context(|| format!("open {}", path.display()))?;
        tracing::debug!(path = %path.display(), "waiting for box lock");
        file.lock_exclusive()
            .io_context(|| format!("lock {}", path.display()))?;
        Ok(Self { _file: file })
    }
}
