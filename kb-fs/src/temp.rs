//! Unique-name scratch resources, deleted on drop.
//!
//! Grounded on the original `TemporaryFile`/`TemporaryDirectory`, built the
//! way the teacher itself creates unique scratch paths
//! (`tools.rs::file_set_contents`, `tools/fuse_loop.rs`): `nix::unistd::mkstemp`/
//! `mkdtemp` pick the unique name and create the resource in one syscall,
//! rather than hand-rolling a random name and retrying under `O_EXCL`.

use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};

use nix::unistd;

use crate::error::FsError;

pub const DEFAULT_FILE_PREFIX: &str = "tmpf";
pub const DEFAULT_DIR_PREFIX: &str = "tmpd";

fn nix_io_error(source: nix::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(source as i32)
}

/// A temp file created with a unique name under `dir`; removed on drop.
pub struct TemporaryFile {
    path: PathBuf,
}

impl TemporaryFile {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, FsError> {
        Self::with_prefix_suffix(dir, DEFAULT_FILE_PREFIX, "")
    }

    pub fn with_prefix_suffix(
        dir: impl AsRef<Path>,
        prefix: &str,
        suffix: &str,
    ) -> Result<Self, FsError> {
        let dir = dir.as_ref();
        let template = dir.join(format!("{prefix}XXXXXX"));
        let (fd, tmp_path) = unistd::mkstemp(&template)
            .map_err(|e| FsError::io("create temporary file", &template, nix_io_error(e)))?;
        // mkstemp only needs to reserve the unique name; we track the path, not the fd.
        drop(unsafe { std::fs::File::from_raw_fd(fd) });

        let candidate = if suffix.is_empty() {
            tmp_path
        } else {
            let name = format!("{}{suffix}", tmp_path.file_name().unwrap().to_string_lossy());
            let renamed = tmp_path.with_file_name(name);
            std::fs::rename(&tmp_path, &renamed)
                .map_err(|e| FsError::io_two("rename temporary file", &tmp_path, &renamed, e))?;
            renamed
        };
        Ok(TemporaryFile { path: candidate })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A temp directory created with a unique name under `dir`; removed
/// (recursively) on drop.
pub struct TemporaryDirectory {
    path: PathBuf,
}

impl TemporaryDirectory {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, FsError> {
        Self::with_prefix(dir, DEFAULT_DIR_PREFIX)
    }

    pub fn with_prefix(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, FsError> {
        let dir = dir.as_ref();
        let template = dir.join(format!("{prefix}XXXXXX"));
        let path = unistd::mkdtemp(&template)
            .map_err(|e| FsError::io("create temporary directory", &template, nix_io_error(e)))?;
        Ok(TemporaryDirectory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryDirectory {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_is_created_and_removed() {
        let dir = std::env::temp_dir();
        let path = {
            let tmp = TemporaryFile::new(&dir).unwrap();
            assert!(tmp.path().exists());
            tmp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn temp_dir_is_created_and_removed_recursively() {
        let dir = std::env::temp_dir();
        let path = {
            let tmp = TemporaryDirectory::new(&dir).unwrap();
            std::fs::write(tmp.path().join("f"), b"x").unwrap();
            tmp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn names_are_unique() {
        let dir = std::env::temp_dir();
        let a = TemporaryFile::new(&dir).unwrap();
        let b = TemporaryFile::new(&dir).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
