use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::io::metadata_store::encode_filter_key;

/// Advisory per-filter file lock.
///
/// Serializes read-modify-write cycles on one filter's record between
/// processes, using flock on Unix. Moves on different filters do not
/// contend.
///
/// The lock is released when the file closes on drop. The lock file itself
/// stays in place: unlinking it would let a later writer lock a fresh file
/// while a waiter still holds the old one.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: another writer holds this filter")]
    Timeout { path: PathBuf },
    #[error("lock error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FileLock {
    /// Lock `filter` inside `store_dir`, blocking up to `timeout`.
    pub fn acquire(store_dir: &Path, filter: &str, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(store_dir)?;
        let lock_path = lock_path(store_dir, filter);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| LockError::CreateError {
                path: lock_path.clone(),
                source: e,
            })?;

        let start = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => {
                    tracing::debug!(filter, path = %lock_path.display(), "acquired filter lock");
                    return Ok(FileLock {
                        _file: file,
                        path: lock_path,
                    });
                }
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => {
                    return Err(LockError::Timeout { path: lock_path });
                }
            }
        }
    }

    /// Acquire with default timeout (5 seconds)
    pub fn acquire_default(store_dir: &Path, filter: &str) -> Result<Self, LockError> {
        Self::acquire(store_dir, filter, Duration::from_secs(5))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lock file used for `filter`: `.<encoded filter>.lock`
pub fn lock_path(store_dir: &Path, filter: &str) -> PathBuf {
    store_dir.join(format!(".{}.lock", encode_filter_key(filter)))
}

/// Try to acquire an exclusive flock on the file (non-blocking)
#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    // Advisory only off Unix
    Ok(())
}
