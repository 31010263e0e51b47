use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("{op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{op} '{from}' -> '{to}': {source}")]
    IoTwoPaths {
        op: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire lock on '{path}'")]
    Locked { path: PathBuf },
}

impl FsError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FsError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn io_two(
        op: &'static str,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        FsError::IoTwoPaths {
            op,
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}
