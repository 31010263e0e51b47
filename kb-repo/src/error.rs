use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("'{0}' is not a krico-backup repository (no {1} found)")]
    NotInitialized(PathBuf, &'static str),
    #[error("'{0}' is already a krico-backup repository")]
    AlreadyInitialized(PathBuf),
    #[error("another process holds the lock on '{0}'")]
    Locked(PathBuf),
    #[error("repository is not locked")]
    NotLocked,
    #[error("'{0}': {1}")]
    InvalidPath(PathBuf, &'static str),
    #[error("subject '{0}' already exists")]
    Duplicate(String),
    #[error("no subject named '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Fs(#[from] kb_fs::FsError),
    #[error(transparent)]
    Config(#[from] kb_config::ConfigError),
    #[error(transparent)]
    Datastore(#[from] kb_datastore::DatastoreError),
    #[error(transparent)]
    Digest(#[from] kb_digest::DigestError),
}
