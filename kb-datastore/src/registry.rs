//! The registry of subject directories configured in a repository.
//! Grounded on `BackupDirectory`/`BackupDirectory.cpp`: each subject gets a
//! flat-hashed metadata folder holding a `target` file (its user-visible
//! sub-path, for reverse lookup while scanning the registry) and a `source`
//! file (the absolute directory being backed up).

use std::path::{Path, PathBuf};

use crate::directory_id::BackupDirectoryId;
use crate::error::DatastoreError;

pub const TARGET_FILE: &str = "target";
pub const SOURCE_FILE: &str = "source";

/// A subject directory: a user-visible sub-path of the repository mapped to
/// a source directory elsewhere on disk.
pub struct BackupDirectory {
    id: BackupDirectoryId,
    dir: PathBuf,
    meta_dir: PathBuf,
    source_dir: Option<PathBuf>,
}

impl BackupDirectory {
    /// A not-yet-configured subject, identified by its intended sub-path.
    pub fn new(
        repository_dir: &Path,
        directories_dir: &Path,
        id: BackupDirectoryId,
    ) -> Result<Self, DatastoreError> {
        let dir = repository_dir.join(id.relative_path());
        let meta_dir = directories_dir.join(id.id_path());
        if meta_dir.join(SOURCE_FILE).exists() || meta_dir.join(TARGET_FILE).exists() {
            return Err(DatastoreError::AlreadyConfigured(id.str().to_string()));
        }
        Ok(BackupDirectory {
            id,
            dir,
            meta_dir,
            source_dir: None,
        })
    }

    /// Reconstruct an already-configured subject from its metadata folder.
    pub fn from_meta_dir(
        repository_dir: &Path,
        directories_dir: &Path,
        directory_meta_dir: &Path,
    ) -> Result<Self, DatastoreError> {
        let target_file = directory_meta_dir.join(TARGET_FILE);
        let target = read_first_line(&target_file)?;
        let id = BackupDirectoryId::new(&target)?;
        let source_file = directory_meta_dir.join(SOURCE_FILE);
        let source_dir = PathBuf::from(read_first_line(&source_file)?);

        Ok(BackupDirectory {
            dir: repository_dir.join(id.relative_path()),
            meta_dir: directories_dir.join(id.id_path()),
            id,
            source_dir: Some(source_dir),
        })
    }

    pub fn id(&self) -> &BackupDirectoryId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn configured(&self) -> bool {
        self.source_dir.is_some()
    }

    pub fn source_dir(&self) -> Result<&Path, DatastoreError> {
        self.source_dir
            .as_deref()
            .ok_or_else(|| DatastoreError::NotConfigured(self.id.str().to_string()))
    }

    /// Record `source_dir` as this subject's backing directory and create
    /// both the metadata folder and the user-visible mirror directory.
    pub fn configure(&mut self, source_dir: impl Into<PathBuf>) -> Result<(), DatastoreError> {
        if self.configured() {
            return Err(DatastoreError::AlreadyConfigured(self.id.str().to_string()));
        }
        let source_dir = source_dir.into();

        if !self.meta_dir.is_dir() {
            kb_fs::ops::create_dir_all(&self.meta_dir)?;
        }
        let target_file = self.meta_dir.join(TARGET_FILE);
        std::fs::write(&target_file, format!("{}\n", self.id.relative_path().display()))
            .map_err(|e| DatastoreError::io("write target file", &target_file, e))?;

        let source_file = self.meta_dir.join(SOURCE_FILE);
        std::fs::write(&source_file, format!("{}\n", source_dir.display()))
            .map_err(|e| DatastoreError::io("write source file", &source_file, e))?;

        if !self.dir.is_dir() {
            kb_fs::ops::create_dir_all(&self.dir)?;
        }
        self.source_dir = Some(source_dir);
        Ok(())
    }
}

fn read_first_line(file: &Path) -> Result<String, DatastoreError> {
    let contents =
        std::fs::read_to_string(file).map_err(|e| DatastoreError::io("read", file, e))?;
    Ok(contents.lines().next().unwrap_or("").to_string())
}

/// List every subject directory currently configured under `directories_dir`,
/// sorted by id string (not by the metadata folder's on-disk hash name).
pub fn list_directories(
    repository_dir: &Path,
    directories_dir: &Path,
) -> Result<Vec<BackupDirectory>, DatastoreError> {
    let mut out = Vec::new();
    if !directories_dir.is_dir() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(directories_dir)
        .map_err(|e| DatastoreError::io("read directory", directories_dir, e))?
    {
        let entry = entry.map_err(|e| DatastoreError::io("read directory entry", directories_dir, e))?;
        let meta_dir = entry.path();
        if meta_dir.is_dir() {
            out.push(BackupDirectory::from_meta_dir(
                repository_dir,
                directories_dir,
                &meta_dir,
            )?);
        }
    }
    out.sort_by(|a, b| a.id().str().cmp(b.id().str()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_then_reload_round_trips() {
        let repo = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let directories_dir = repo.path().join("dirs");
        kb_fs::ops::create_dir_all(&directories_dir).unwrap();
        let source = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();

        let id = BackupDirectoryId::new("photos").unwrap();
        let mut dir = BackupDirectory::new(repo.path(), &directories_dir, id).unwrap();
        dir.configure(source.path()).unwrap();

        let reloaded =
            BackupDirectory::from_meta_dir(repo.path(), &directories_dir, dir.meta_dir()).unwrap();
        assert_eq!(reloaded.id().str(), "photos");
        assert_eq!(reloaded.source_dir().unwrap(), source.path());
    }

    #[test]
    fn list_directories_finds_all_configured_subjects() {
        let repo = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let directories_dir = repo.path().join("dirs");
        kb_fs::ops::create_dir_all(&directories_dir).unwrap();
        let source = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();

        for name in ["photos", "music"] {
            let id = BackupDirectoryId::new(name).unwrap();
            let mut dir = BackupDirectory::new(repo.path(), &directories_dir, id).unwrap();
            dir.configure(source.path()).unwrap();
        }

        let all = list_directories(repo.path(), &directories_dir).unwrap();
        let mut names: Vec<_> = all.iter().map(|d| d.id().str().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["music", "photos"]);
    }

    #[test]
    fn double_configure_is_rejected() {
        let repo = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let directories_dir = repo.path().join("dirs");
        kb_fs::ops::create_dir_all(&directories_dir).unwrap();
        let source = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();

        let id = BackupDirectoryId::new("photos").unwrap();
        let mut dir = BackupDirectory::new(repo.path(), &directories_dir, id).unwrap();
        dir.configure(source.path()).unwrap();
        assert!(dir.configure(source.path()).is_err());
    }
}
