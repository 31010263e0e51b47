//! Identifies a registered subject directory. Grounded on the original
//! `BackupDirectoryId`: the user-visible sub-path, lexically normalized,
//! doubles as the identity; its sha1 hash names the (flat, unsplit) metadata
//! folder that holds that subject's `target`/`source` files and snapshots.

use std::path::{Path, PathBuf};

use crate::error::DatastoreError;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BackupDirectoryId {
    id: String,
    relative_path: PathBuf,
    id_path: PathBuf,
}

impl BackupDirectoryId {
    pub fn new(id: &str) -> Result<Self, DatastoreError> {
        let normalized = kb_fs::path::lexically_normal(Path::new(id));
        let id = normalized.to_string_lossy().to_string();
        let hash = kb_digest::sha1_sum(&id)?;
        Ok(BackupDirectoryId {
            id,
            relative_path: normalized,
            id_path: PathBuf::from(hash),
        })
    }

    pub fn str(&self) -> &str {
        &self.id
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Metadata folder name (sub-path of the repository's directory registry), a
    /// flat sha1 hex string — unlike the content pool, this is never split.
    pub fn id_path(&self) -> &Path {
        &self.id_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_path_is_the_sha1_of_the_normalized_id() {
        let id = BackupDirectoryId::new("photos").unwrap();
        assert_eq!(id.id_path(), Path::new(&kb_digest::sha1_sum("photos").unwrap()));
    }

    #[test]
    fn equal_ids_have_equal_id_path() {
        let a = BackupDirectoryId::new("photos/2026").unwrap();
        let b = BackupDirectoryId::new("photos/2026").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalizes_dot_components() {
        let a = BackupDirectoryId::new("photos/./2026").unwrap();
        assert_eq!(a.str(), "photos/2026");
    }
}
