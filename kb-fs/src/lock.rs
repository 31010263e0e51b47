use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::FsError;

/// A move-only handle on an OS advisory exclusive lock (flock-style,
/// non-blocking) tied to an open file descriptor.
///
/// Dropping the handle closes the descriptor, which releases the lock.
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    /// Open (creating if absent) and acquire the lock, failing if another
    /// holder already has it.
    pub fn lock(path: impl Into<PathBuf>) -> Result<Self, FsError> {
        let path = path.into();
        let file = open_for_lock(&path)?;
        acquire(&file, &path)?;
        log::debug!("acquired lock [file={}]", path.display());
        Ok(FileLock {
            path,
            file: Some(file),
        })
    }

    /// Like [`lock`](Self::lock), but returns `None` instead of an error on contention.
    pub fn try_lock(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file = open_for_lock(&path).ok()?;
        if acquire(&file, &path).is_ok() {
            log::debug!("acquired lock [file={}] (try_lock)", path.display());
            Some(FileLock {
                path,
                file: Some(file),
            })
        } else {
            None
        }
    }

    pub fn locked(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock early. Subsequent calls are a no-op.
    pub fn unlock(&mut self) {
        if self.file.take().is_some() {
            log::debug!("releasing lock [file={}] (unlock)", self.path.display());
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            log::debug!("releasing lock [file={}]", self.path.display());
        }
    }
}

fn open_for_lock(path: &Path) -> Result<File, FsError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .open(path)
        .map_err(|e| FsError::io("open lock file", path, e))
}

fn acquire(file: &File, path: &Path) -> Result<(), FsError> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        Ok(())
    } else {
        Err(FsError::Locked {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_file_fails() {
        let dir = std::env::temp_dir().join(format!("kb-fs-lock-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&dir);
        let lock1 = FileLock::lock(&dir).unwrap();
        assert!(lock1.locked());
        assert!(FileLock::try_lock(&dir).is_none());
        drop(lock1);
        let lock2 = FileLock::try_lock(&dir);
        assert!(lock2.is_some());
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn unlock_releases_before_drop() {
        let dir = std::env::temp_dir().join(format!("kb-fs-lock-test2-{}", std::process::id()));
        let _ = std::fs::remove_file(&dir);
        let mut lock1 = FileLock::lock(&dir).unwrap();
        lock1.unlock();
        assert!(!lock1.locked());
        let lock2 = FileLock::try_lock(&dir);
        assert!(lock2.is_some());
        let _ = std::fs::remove_file(&dir);
    }
}
