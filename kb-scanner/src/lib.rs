//! Deterministic, single-pass directory traversal.
//!
//! A [`Scanner`] walks a directory tree depth-first, visiting each
//! directory's children in ascending filename order, and yields entries
//! lazily as an [`Iterator`] — the walk can be driven one step at a time
//! and simply dropped to abandon the rest. Symlinks are classified before
//! files/directories are: a symlink to a directory is still reported as
//! [`EntryKind::Symlink`], never auto-followed. Grounded on the recursion
//! order of the original `BackupRunner::backup()` and the entry-kind shape
//! of `Directory.h` (`File`/`Directory`/`Symlink`), generalized into an
//! explicit directory stack since the original's own scanner neither
//! sorts nor restarts.

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use kb_fs::path::lexically_relative_symlink_target;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}: not a file, directory or symlink")]
    UnsupportedEntry(PathBuf),
}

impl ScannerError {
    fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScannerError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    File,
    Directory,
    Symlink {
        target: PathBuf,
        relative_target: PathBuf,
        is_target_dir: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink { .. })
    }
}

struct Frame {
    absolute_dir: PathBuf,
    relative_dir: PathBuf,
    children: std::vec::IntoIter<OsString>,
}

/// Lazy, restartable, depth-first directory walker.
pub struct Scanner {
    root: PathBuf,
    stack: Vec<Frame>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ScannerError> {
        let root = root.into();
        let children = sorted_child_names(&root)?;
        Ok(Scanner {
            stack: vec![Frame {
                absolute_dir: root.clone(),
                relative_dir: PathBuf::new(),
                children: children.into_iter(),
            }],
            root,
        })
    }

    fn classify(&self, absolute_path: PathBuf, relative_path: PathBuf) -> Result<Entry, ScannerError> {
        let meta = fs::symlink_metadata(&absolute_path)
            .map_err(|e| ScannerError::io("stat", absolute_path.clone(), e))?;
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(&absolute_path)
                .map_err(|e| ScannerError::io("readlink", absolute_path.clone(), e))?;
            let relative_target =
                lexically_relative_symlink_target(&absolute_path, &target, &self.root);
            let is_target_dir = fs::metadata(&absolute_path).map(|m| m.is_dir()).unwrap_or(false);
            return Ok(Entry {
                absolute_path,
                relative_path,
                kind: EntryKind::Symlink {
                    target,
                    relative_target,
                    is_target_dir,
                },
            });
        }

        if file_type.is_dir() {
            return Ok(Entry {
                absolute_path,
                relative_path,
                kind: EntryKind::Directory,
            });
        }

        if file_type.is_file() {
            return Ok(Entry {
                absolute_path,
                relative_path,
                kind: EntryKind::File,
            });
        }

        let _ = meta;
        Err(ScannerError::UnsupportedEntry(absolute_path))
    }
}

impl Iterator for Scanner {
    type Item = Result<Entry, ScannerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.children.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(name) => {
                    let absolute_path = frame.absolute_dir.join(&name);
                    let relative_path = frame.relative_dir.join(&name);
                    let entry = match self.classify(absolute_path, relative_path) {
                        Ok(entry) => entry,
                        Err(e) => return Some(Err(e)),
                    };

                    if entry.is_directory() {
                        let children = match sorted_child_names(&entry.absolute_path) {
                            Ok(children) => children,
                            Err(e) => return Some(Err(e)),
                        };
                        self.stack.push(Frame {
                            absolute_dir: entry.absolute_path.clone(),
                            relative_dir: entry.relative_path.clone(),
                            children: children.into_iter(),
                        });
                    }

                    return Some(Ok(entry));
                }
            }
        }
    }
}

fn sorted_child_names(dir: &Path) -> Result<Vec<OsString>, ScannerError> {
    let read_dir = fs::read_dir(dir).map_err(|e| ScannerError::io("read directory", dir, e))?;
    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| ScannerError::io("read directory entry", dir, e))?;
        names.push(entry.file_name());
    }
    names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scan_all(root: &Path) -> Vec<Entry> {
        Scanner::new(root)
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn walks_in_sorted_depth_first_order() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("b_dir")).unwrap();
        fs::write(root.join("a_file"), b"x").unwrap();
        fs::write(root.join("b_dir").join("nested"), b"y").unwrap();
        fs::write(root.join("c_file"), b"z").unwrap();

        let entries = scan_all(root);
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.relative_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a_file", "b_dir", "b_dir/nested", "c_file"]);
    }

    #[test]
    fn symlink_to_directory_is_classified_as_symlink() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let entries = scan_all(root);
        let link_entry = entries
            .iter()
            .find(|e| e.relative_path == Path::new("link"))
            .unwrap();
        match &link_entry.kind {
            EntryKind::Symlink { is_target_dir, .. } => assert!(*is_target_dir),
            other => panic!("expected symlink, got {other:?}"),
        }
        // a symlink to a directory must not be recursed into
        assert!(!entries.iter().any(|e| e.relative_path == Path::new("link/nothing")));
    }

    #[test]
    fn relative_target_is_rewritten_for_in_tree_absolute_links() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("target_file"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("sub").join("target_file"), root.join("link")).unwrap();

        let entries = scan_all(root);
        let link_entry = entries
            .iter()
            .find(|e| e.relative_path == Path::new("link"))
            .unwrap();
        match &link_entry.kind {
            EntryKind::Symlink {
                relative_target, ..
            } => assert_eq!(relative_target, Path::new("sub/target_file")),
            other => panic!("expected symlink, got {other:?}"),
        }
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        assert!(scan_all(tmp.path()).is_empty());
    }
}
