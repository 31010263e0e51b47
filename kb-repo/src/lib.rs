//! The repository facade: owns the lock, config store, directory registry
//! and log for one repository root, and coordinates `add_directory` and
//! `run_backup`. Grounded on `BackupRepository.h`/`BackupRepository.cpp`
//! (on-disk layout, lock ownership) generalized with the fuller registry and
//! log wiring found in `BackupDirectory.cpp`/`BackupRunner.cpp`, since the
//! prototype repository class alone lacks accessors for either.

pub mod error;

use std::path::{Path, PathBuf};

use kb_datastore::{BackupDirectory, BackupDirectoryId, BackupRunner, RepositoryLog, SummaryRecord};
use kb_fs::FileLock;

pub use error::RepoError;

/// One configured repository rooted at `root`, with its metadata tree at
/// `root/.krico-backup`.
pub struct Repository {
    root: PathBuf,
    meta_dir: PathBuf,
    directories_dir: PathBuf,
    hlinks_dir: PathBuf,
    lock: FileLock,
    config: kb_config::Config,
    log: RepositoryLog,
    directories: Option<Vec<BackupDirectory>>,
}

impl Repository {
    /// Create a new repository rooted at `root`: `root` must already exist
    /// as a directory and must not already contain a metadata folder.
    pub fn initialize(root: impl Into<PathBuf>, author: &str) -> Result<Self, RepoError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RepoError::InvalidPath(root, "not a directory"));
        }
        let meta_dir = root.join(kb_buildcfg::META_DIR_NAME);
        if meta_dir.exists() {
            return Err(RepoError::AlreadyInitialized(root));
        }

        log::info!("initializing repository [root={}]", root.display());
        kb_fs::ops::create_dir_all(&meta_dir)?;
        let directories_dir = meta_dir.join(kb_buildcfg::DIRS_DIR_NAME);
        kb_fs::ops::create_dir_all(&directories_dir)?;
        let hlinks_dir = meta_dir.join(kb_buildcfg::HLINKS_DIR_NAME);

        let lock = Self::acquire_lock(&meta_dir)?;
        let mut config = kb_config::Config::open(meta_dir.join(kb_buildcfg::CONFIG_FILE_NAME))?;
        let mut log = RepositoryLog::open(meta_dir.join(kb_buildcfg::LOG_DIR_NAME));

        log.put_init_record(author)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        config.set_by_key(kb_buildcfg::CONFIG_KEY_INIT_TS, &now.to_string())?;

        Ok(Repository {
            root,
            meta_dir,
            directories_dir,
            hlinks_dir,
            lock,
            config,
            log,
            directories: None,
        })
    }

    /// Open an existing repository, acquiring its exclusive lock.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = root.into();
        let meta_dir = root.join(kb_buildcfg::META_DIR_NAME);
        if !meta_dir.is_dir() {
            return Err(RepoError::NotInitialized(root, kb_buildcfg::META_DIR_NAME));
        }

        let lock = Self::acquire_lock(&meta_dir)?;
        log::info!("opened repository [root={}]", root.display());
        let config = kb_config::Config::open(meta_dir.join(kb_buildcfg::CONFIG_FILE_NAME))?;
        let log = RepositoryLog::open(meta_dir.join(kb_buildcfg::LOG_DIR_NAME));
        let directories_dir = meta_dir.join(kb_buildcfg::DIRS_DIR_NAME);
        let hlinks_dir = meta_dir.join(kb_buildcfg::HLINKS_DIR_NAME);

        Ok(Repository {
            root,
            meta_dir,
            directories_dir,
            hlinks_dir,
            lock,
            config,
            log,
            directories: None,
        })
    }

    fn acquire_lock(meta_dir: &Path) -> Result<FileLock, RepoError> {
        let lock_file = meta_dir.join(kb_buildcfg::LOCK_FILE_NAME);
        FileLock::lock(&lock_file).map_err(|_| RepoError::Locked(lock_file))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    fn require_locked(&self) -> Result<(), RepoError> {
        if self.lock.locked() {
            Ok(())
        } else {
            Err(RepoError::NotLocked)
        }
    }

    pub fn config(&mut self) -> Result<&mut kb_config::Config, RepoError> {
        self.require_locked()?;
        Ok(&mut self.config)
    }

    pub fn repository_log(&mut self) -> Result<&mut RepositoryLog, RepoError> {
        self.require_locked()?;
        Ok(&mut self.log)
    }

    /// Release the lock early; subsequent operations fail `NotLocked`.
    pub fn unlock(&mut self) -> Result<(), RepoError> {
        self.require_locked()?;
        self.lock.unlock();
        Ok(())
    }

    /// Register `user_dir` (relative to the repository root) as a subject
    /// backed by `source_dir`.
    pub fn add_directory(
        &mut self,
        user_dir: &str,
        source_dir: impl Into<PathBuf>,
        author: &str,
    ) -> Result<(), RepoError> {
        self.require_locked()?;
        let source_dir = source_dir.into();
        let id = BackupDirectoryId::new(user_dir)?;
        let dir = self.root.join(id.relative_path());

        if dir.exists() {
            return Err(RepoError::InvalidPath(dir, "already exists"));
        }
        if !kb_fs::path::is_lexical_sub_path(&dir, &self.root) {
            return Err(RepoError::InvalidPath(dir, "outside the repository root"));
        }
        if kb_fs::path::is_lexical_sub_path(&dir, &self.meta_dir) {
            return Err(RepoError::InvalidPath(dir, "inside the metadata directory"));
        }
        let source_meta = std::fs::symlink_metadata(&source_dir)
            .map_err(|e| kb_fs::FsError::io("stat", &source_dir, e))?;
        if !source_meta.is_dir() {
            return Err(RepoError::InvalidPath(source_dir, "not a directory"));
        }

        let mut directory = match BackupDirectory::new(&self.root, &self.directories_dir, id.clone()) {
            Ok(d) => d,
            Err(kb_datastore::DatastoreError::AlreadyConfigured(_)) => {
                return Err(RepoError::Duplicate(id.str().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        directory.configure(&source_dir)?;
        self.log
            .put_add_directory_record(author, id.str(), &source_dir)?;

        if let Some(cached) = &mut self.directories {
            cached.push(directory);
            cached.sort_by(|a, b| a.id().str().cmp(b.id().str()));
        }
        Ok(())
    }

    /// Every configured subject, sorted by id string; loaded once and cached.
    pub fn list_directories(&mut self) -> Result<&[BackupDirectory], RepoError> {
        self.require_locked()?;
        if self.directories.is_none() {
            self.directories = Some(kb_datastore::list_directories(&self.root, &self.directories_dir)?);
        }
        Ok(self.directories.as_deref().unwrap())
    }

    pub fn get_directory(&mut self, id: &str) -> Result<&BackupDirectory, RepoError> {
        self.list_directories()?;
        self.directories
            .as_ref()
            .unwrap()
            .iter()
            .find(|d| d.id().str() == id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    /// Run a backup for the subject named `id`, appending a `RunBackup`
    /// log record on success.
    pub fn run_backup(&mut self, id: &str, author: &str) -> Result<SummaryRecord, RepoError> {
        self.require_locked()?;
        self.list_directories()?;
        let directory = self
            .directories
            .as_ref()
            .unwrap()
            .iter()
            .find(|d| d.id().str() == id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        let mut runner = BackupRunner::new(directory, &self.hlinks_dir)?;
        let summary = runner.run()?;
        log::info!(
            "backup finished [subject={}][backup_dir={}]",
            id,
            runner.backup_dir().display()
        );
        self.log.put_run_backup_record(author, summary.clone())?;
        Ok(summary)
    }

    /// Run a backup for every configured subject, returning one summary per
    /// subject in the same sorted order as [`list_directories`](Self::list_directories).
    pub fn run_all(&mut self, author: &str) -> Result<Vec<SummaryRecord>, RepoError> {
        self.require_locked()?;
        let ids: Vec<String> = self
            .list_directories()?
            .iter()
            .map(|d| d.id().str().to_string())
            .collect();
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            summaries.push(self.run_backup(&id, author)?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_then_open_round_trips() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        {
            let mut repo = Repository::initialize(tmp.path(), "alice").unwrap();
            assert!(repo.config().unwrap().get_unsectioned("metadata", "init-ts").is_some());
            repo.unlock().unwrap();
        }
        let mut reopened = Repository::open(tmp.path()).unwrap();
        let record = reopened.repository_log().unwrap().get_head_record().unwrap();
        match record {
            kb_datastore::LogRecord::Init(header) => assert_eq!(header.author, "alice"),
            other => panic!("expected Init, got {other:?}"),
        }
    }

    #[test]
    fn double_initialize_fails() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut repo = Repository::initialize(tmp.path(), "alice").unwrap();
        repo.unlock().unwrap();
        assert!(matches!(
            Repository::initialize(tmp.path(), "alice"),
            Err(RepoError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn open_while_locked_fails() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let _repo = Repository::initialize(tmp.path(), "alice").unwrap();
        assert!(matches!(Repository::open(tmp.path()), Err(RepoError::Locked(_))));
    }

    #[test]
    fn add_and_run_backup_dedups_across_runs() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut repo = Repository::initialize(tmp.path(), "alice").unwrap();

        let source = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        std::fs::write(
            source.path().join("file1.txt"),
            b"Hello OpenSSL krico-backup world",
        )
        .unwrap();
        std::os::unix::fs::symlink(
            source.path().join("file1.txt"),
            source.path().join("fileLink.txt"),
        )
        .unwrap();

        repo.add_directory("TheTarget", source.path(), "alice").unwrap();
        let first = repo.run_backup("TheTarget", "alice").unwrap();
        assert_eq!(first.num_copied_files, 1);
        assert_eq!(first.num_hard_linked_files, 0);

        let second = repo.run_backup("TheTarget", "alice").unwrap();
        assert_eq!(second.num_copied_files, 0);
        assert_eq!(second.num_hard_linked_files, 1);
        assert_eq!(second.num_symlinks, 1);

        let dir = repo.root().join("TheTarget");
        let previous = dir.join("previous").canonicalize().unwrap();
        let current = dir.join("current").canonicalize().unwrap();
        assert_eq!(
            previous,
            repo.meta_dir()
                .join("dirs")
                .join(BackupDirectoryId::new("TheTarget").unwrap().id_path())
                .join(&first.backup_id)
                .canonicalize()
                .unwrap()
        );
        assert_ne!(previous, current);
        assert!(current.join("file1.txt").exists());
    }

    #[test]
    fn run_backup_on_unknown_subject_fails() {
        let tmp = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut repo = Repository::initialize(tmp.path(), "alice").unwrap();
        assert!(matches!(
            repo.run_backup("nope", "alice"),
            Err(RepoError::NotFound(_))
        ));
    }
}
