//! Thin, error-context-wrapped filesystem primitives, used everywhere the
//! write-then-rename discipline requires a plain directory/file operation.
//! Grounded on the original `io.h` `MKDIR`/`MKDIRS`/`COPY_FILE`/`RENAME_FILE`/
//! `CREATE_HARD_LINK` macros.

use std::path::Path;

use crate::error::FsError;

pub fn create_dir(dir: impl AsRef<Path>) -> Result<(), FsError> {
    let dir = dir.as_ref();
    std::fs::create_dir(dir).map_err(|e| FsError::io("create directory", dir, e))
}

pub fn create_dir_all(dir: impl AsRef<Path>) -> Result<(), FsError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| FsError::io("create directories", dir, e))
}

pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FsError> {
    let (from, to) = (from.as_ref(), to.as_ref());
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| FsError::io_two("copy", from, to, e))
}

pub fn rename(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FsError> {
    let (from, to) = (from.as_ref(), to.as_ref());
    std::fs::rename(from, to).map_err(|e| FsError::io_two("rename", from, to, e))
}

pub fn hard_link(target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<(), FsError> {
    let (target, link) = (target.as_ref(), link.as_ref());
    std::fs::hard_link(target, link).map_err(|e| FsError::io_two("create hard link", target, link, e))
}

pub fn symlink(target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<(), FsError> {
    let (target, link) = (target.as_ref(), link.as_ref());
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| FsError::io_two("create symlink", target, link, e))
}

/// Write `data` to a sibling temp file, then rename over `path`.
pub fn replace_file(path: impl AsRef<Path>, data: &[u8]) -> Result<(), FsError> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = crate::temp::TemporaryFile::with_prefix_suffix(
        dir,
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp"),
        ".tmp",
    )?;
    std::fs::write(tmp.path(), data).map_err(|e| FsError::io("write", tmp.path(), e))?;
    rename(tmp.path(), path)?;
    // tmp's Drop will try to remove the now-renamed-away path and silently no-op
    Ok(())
}
