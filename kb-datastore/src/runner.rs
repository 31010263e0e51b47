//! Runs one backup: mirrors a subject's source directory into a dated
//! snapshot directory, deduplicating file content through a content-addressed
//! hard-link pool, and rotates the `current`/`previous` symlinks. Grounded on
//! `BackupRunner.cpp`: directories are mirrored, files are hashed (sha256)
//! and either copied into the pool (first time that content is seen) or
//! hard-linked from an existing pool entry, and symlinks are recreated with
//! their original (lexically rewritten) target.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use kb_codec::YearMonthDay;
use kb_scanner::{EntryKind, Scanner};

use crate::error::DatastoreError;
use crate::registry::BackupDirectory;
use crate::summary::{SummaryBuilder, SummaryRecord};

pub const PREVIOUS_LINK: &str = "previous";
pub const CURRENT_LINK: &str = "current";
pub const POOL_DIRS: u8 = 2;
const READ_BUFFER_SIZE: usize = 8192;
const MAX_BACKUPS_PER_DAY: u16 = 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    pub directories: u64,
    pub files_copied: u64,
    pub files_hard_linked: u64,
    pub symlinks: u64,
}

pub struct BackupRunner<'a> {
    directory: &'a BackupDirectory,
    hlinks_dir: PathBuf,
    date: YearMonthDay,
    backup_dir: PathBuf,
    backup_id: PathBuf,
    stats: Statistics,
}

impl<'a> BackupRunner<'a> {
    pub fn new(directory: &'a BackupDirectory, hlinks_dir: impl Into<PathBuf>) -> Result<Self, DatastoreError> {
        let now = today();
        let (backup_id, backup_dir) = determine_backup_dir(directory.meta_dir(), now)?;
        Ok(BackupRunner {
            directory,
            hlinks_dir: hlinks_dir.into(),
            date: now,
            backup_dir,
            backup_id,
            stats: Statistics::default(),
        })
    }

    pub fn stats(&self) -> Statistics {
        self.stats
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn run(&mut self) -> Result<SummaryRecord, DatastoreError> {
        let source_dir = self.directory.source_dir()?.to_path_buf();
        if !source_dir.is_dir() {
            return Err(DatastoreError::ExpectedDirectory(source_dir));
        }
        log::debug!("creating backup dir '{}'", self.backup_dir.display());
        kb_fs::ops::create_dir_all(&self.backup_dir)?;

        let mut builder = SummaryBuilder::new(
            self.directory.meta_dir(),
            self.directory.id().str().to_string(),
            self.date,
            self.backup_id.clone(),
        )?;

        let scanner = Scanner::new(&source_dir)?;
        for entry in scanner {
            let entry = entry?;
            let target = self.backup_dir.join(&entry.relative_path);
            match &entry.kind {
                EntryKind::Directory => {
                    if !target.is_dir() {
                        kb_fs::ops::create_dir(&target)?;
                    }
                    self.stats.directories += 1;
                    builder.add_dir(&entry.relative_path)?;
                }
                EntryKind::File => {
                    let (pool_file, digest, was_copied) = self.pool_file_for(&entry.absolute_path)?;
                    kb_fs::ops::hard_link(&pool_file, &target)?;
                    if was_copied {
                        self.stats.files_copied += 1;
                        builder.add_copied_file(&entry.relative_path, &digest)?;
                    } else {
                        self.stats.files_hard_linked += 1;
                        builder.add_hard_linked_file(&entry.relative_path, &digest)?;
                    }
                }
                EntryKind::Symlink {
                    relative_target,
                    is_target_dir: _,
                    ..
                } => {
                    kb_fs::ops::symlink(relative_target, &target)?;
                    self.stats.symlinks += 1;
                    builder.add_symlink(&entry.relative_path, relative_target)?;
                }
            }
        }

        let (previous_target, current_target) = self.adjust_symlinks()?;
        builder.set_previous_target(previous_target);
        builder.set_current_target(current_target);

        let summary = builder.build()?;
        log::info!(
            "backup complete [directory={}][dirs={}][copied={}][linked={}][symlinks={}]",
            self.directory.id().str(),
            self.stats.directories,
            self.stats.files_copied,
            self.stats.files_hard_linked,
            self.stats.symlinks
        );
        Ok(summary)
    }

    /// Hash `file`'s contents and ensure it exists in the pool, returning its
    /// pool path, digest, and whether this call is the one that put it there.
    fn pool_file_for(
        &self,
        file: &Path,
    ) -> Result<(PathBuf, kb_digest::DigestResult, bool), DatastoreError> {
        let digest = digest_file(file)?;
        let pool_file = self.hlinks_dir.join(digest.path(POOL_DIRS));
        if pool_file.exists() {
            return Ok((pool_file, digest, false));
        }
        if let Some(parent) = pool_file.parent() {
            kb_fs::ops::create_dir_all(parent)?;
        }
        let tmp_pool_file = pool_file.with_extension("tmp");
        kb_fs::ops::copy_file(file, &tmp_pool_file)?;
        kb_fs::ops::rename(&tmp_pool_file, &pool_file)?;
        Ok((pool_file, digest, true))
    }

    /// Remove a stale `previous` link, demote `current` to `previous`, then
    /// point `current` at this run's backup directory.
    fn adjust_symlinks(&self) -> Result<(PathBuf, PathBuf), DatastoreError> {
        let dir = self.directory.dir();
        let previous = dir.join(PREVIOUS_LINK);
        let previous_target = match std::fs::symlink_metadata(&previous) {
            Ok(meta) if meta.file_type().is_symlink() => std::fs::read_link(&previous)
                .map_err(|e| DatastoreError::io("readlink", &previous, e))?,
            Ok(_) => return Err(DatastoreError::ExpectedDirectory(previous)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PathBuf::new(),
            Err(e) => return Err(DatastoreError::io("stat", &previous, e)),
        };

        let current = dir.join(CURRENT_LINK);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                log::debug!("rotating current -> previous [{}]", current.display());
                let _ = std::fs::remove_file(&previous);
                kb_fs::ops::rename(&current, &previous)?;
            }
            Ok(_) => return Err(DatastoreError::ExpectedDirectory(current)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DatastoreError::io("stat", &current, e)),
        }

        let current_target = kb_fs::path::lexically_relative(&self.backup_dir, dir);
        kb_fs::ops::symlink(&current_target, &current)?;
        Ok((previous_target, current_target))
    }
}

fn digest_file(file: &Path) -> Result<kb_digest::DigestResult, DatastoreError> {
    let mut digest = kb_digest::Digest::sha256()?;
    let mut handle =
        std::fs::File::open(file).map_err(|e| DatastoreError::io("read", file, e))?;
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = handle
            .read(&mut buffer)
            .map_err(|e| DatastoreError::io("read", file, e))?;
        if n == 0 {
            break;
        }
        digest.update(&buffer[..n])?;
    }
    Ok(digest.finalize()?)
}

fn determine_backup_dir(
    meta_dir: &Path,
    date: YearMonthDay,
) -> Result<(PathBuf, PathBuf), DatastoreError> {
    for count in 0..MAX_BACKUPS_PER_DAY {
        let backup_id = PathBuf::from(format!("{:04}", date.year))
            .join(format!("{:02}{:02}{count:03}", date.month, date.day));
        let backup_dir = meta_dir.join(&backup_id);
        if !backup_dir.exists() {
            return Ok((backup_id, backup_dir));
        }
    }
    Err(DatastoreError::TooManyBackups(format!(
        "{:04}-{:02}-{:02}",
        date.year, date.month, date.day
    )))
}

fn today() -> YearMonthDay {
    use std::time::UNIX_EPOCH;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = secs / 86_400;
    civil_from_days(days as i64)
}

/// Days-since-epoch to (year, month, day), Howard Hinnant's `civil_from_days`.
fn civil_from_days(z: i64) -> YearMonthDay {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let y = if m <= 2 { y + 1 } else { y };
    YearMonthDay {
        year: y as u16,
        month: m,
        day: d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_date() {
        // 2026-07-27 is 20,630 days after 1970-01-01.
        let ymd = civil_from_days(20_630);
        assert_eq!(
            ymd,
            YearMonthDay {
                year: 2026,
                month: 7,
                day: 27
            }
        );
    }

    #[test]
    fn determine_backup_dir_picks_first_free_slot() {
        let meta = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let date = YearMonthDay {
            year: 2026,
            month: 7,
            day: 27,
        };
        let (id1, dir1) = determine_backup_dir(meta.path(), date).unwrap();
        assert_eq!(id1, Path::new("2026/0727000"));
        std::fs::create_dir_all(&dir1).unwrap();
        let (id2, _dir2) = determine_backup_dir(meta.path(), date).unwrap();
        assert_eq!(id2, Path::new("2026/0727001"));
    }
}
