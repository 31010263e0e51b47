use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error(transparent)]
    Fs(#[from] kb_fs::FsError),
    #[error(transparent)]
    Digest(#[from] kb_digest::DigestError),
    #[error(transparent)]
    Codec(#[from] kb_codec::CodecError),
    #[error(transparent)]
    Scanner(#[from] kb_scanner::ScannerError),
    #[error("{action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown log entry type byte {0}")]
    UnknownLogEntryType(u8),
    #[error("log entry '{0}' not found")]
    LogEntryNotFound(String),
    #[error("too many backups for {0} (max 1000)")]
    TooManyBackups(String),
    #[error("backup directory '{0}' is already configured")]
    AlreadyConfigured(String),
    #[error("backup directory '{0}' is not configured")]
    NotConfigured(String),
    #[error("expected directory but found a file at '{0}'")]
    ExpectedDirectory(PathBuf),
    #[error("'{0}' already exists")]
    AlreadyExists(PathBuf),
}

impl DatastoreError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatastoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
