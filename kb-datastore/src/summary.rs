//! The per-run backup manifest: a `D`/`C`/`H`/`L` prefixed text file with a
//! running SHA-1 checksum as its last `S` line. Grounded on
//! `BackupSummary.h`/`BackupSummary.cpp`'s `BackupSummaryBuilder`: the
//! checksum accumulates `(zero-sha1 ++ path)` for directories, `(digest ++
//! path)` for copied/hard-linked files, and `(link-path ++ target)` for
//! symlinks, written to a sibling temp file and renamed into place once
//! finalized.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use kb_codec::YearMonthDay;
use kb_digest::DigestResult;
use kb_fs::temp::TemporaryFile;

use crate::error::DatastoreError;

pub const SUMMARY_FILE_SUFFIX: &str = ".summary";

/// The compact, fully-built record of one backup run — this is what gets
/// embedded in a `RunBackup` log entry and is also reconstructable by
/// re-parsing a `.summary` manifest's trailer.
#[derive(Clone, Debug)]
pub struct SummaryRecord {
    pub directory_id: String,
    pub date: YearMonthDay,
    pub backup_id: PathBuf,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub num_directories: u32,
    pub num_copied_files: u32,
    pub num_hard_linked_files: u32,
    pub num_symlinks: u32,
    pub previous_target: PathBuf,
    pub current_target: PathBuf,
    pub checksum: DigestResult,
}

pub struct SummaryBuilder {
    directory_id: String,
    date: YearMonthDay,
    backup_id: PathBuf,
    summary_file: PathBuf,
    tmp: TemporaryFile,
    writer: std::fs::File,
    digest: kb_digest::Digest,
    start_time: SystemTime,
    num_directories: u32,
    num_copied_files: u32,
    num_hard_linked_files: u32,
    num_symlinks: u32,
    previous_target: PathBuf,
    current_target: PathBuf,
}

impl SummaryBuilder {
    pub fn new(
        meta_dir: &Path,
        directory_id: String,
        date: YearMonthDay,
        backup_id: PathBuf,
    ) -> Result<Self, DatastoreError> {
        let parent = backup_id.parent().unwrap_or_else(|| Path::new(""));
        let file_name = backup_id
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("backup")
            .to_string();
        let summary_dir = meta_dir.join(parent);
        kb_fs::ops::create_dir_all(&summary_dir)?;
        let summary_file = summary_dir.join(format!("{file_name}{SUMMARY_FILE_SUFFIX}"));

        let tmp = TemporaryFile::with_prefix_suffix(&summary_dir, &file_name, ".tmp")?;
        let writer = std::fs::File::create(tmp.path())
            .map_err(|e| DatastoreError::io("write summary", tmp.path(), e))?;

        Ok(SummaryBuilder {
            directory_id,
            date,
            backup_id,
            summary_file,
            tmp,
            writer,
            digest: kb_digest::Digest::sha1()?,
            start_time: SystemTime::now(),
            num_directories: 0,
            num_copied_files: 0,
            num_hard_linked_files: 0,
            num_symlinks: 0,
            previous_target: PathBuf::new(),
            current_target: PathBuf::new(),
        })
    }

    pub fn add_dir(&mut self, dir: &Path) -> Result<(), DatastoreError> {
        self.num_directories += 1;
        let s = dir.to_string_lossy();
        self.digest.update(kb_digest::SHA1_ZERO().as_bytes())?;
        self.digest.update(s.as_bytes())?;
        writeln!(self.writer, "D {s}")
            .map_err(|e| DatastoreError::io("write summary", self.tmp.path(), e))?;
        Ok(())
    }

    pub fn add_copied_file(&mut self, file: &Path, digest: &DigestResult) -> Result<(), DatastoreError> {
        self.num_copied_files += 1;
        self.write_file_line("C", file, digest)
    }

    pub fn add_hard_linked_file(
        &mut self,
        file: &Path,
        digest: &DigestResult,
    ) -> Result<(), DatastoreError> {
        self.num_hard_linked_files += 1;
        self.write_file_line("H", file, digest)
    }

    fn write_file_line(
        &mut self,
        prefix: &str,
        file: &Path,
        digest: &DigestResult,
    ) -> Result<(), DatastoreError> {
        let s = file.to_string_lossy();
        self.digest.update(digest.as_bytes())?;
        self.digest.update(s.as_bytes())?;
        writeln!(self.writer, "{prefix} {} {s}", digest.hex())
            .map_err(|e| DatastoreError::io("write summary", self.tmp.path(), e))?;
        Ok(())
    }

    pub fn add_symlink(&mut self, link: &Path, target: &Path) -> Result<(), DatastoreError> {
        self.num_symlinks += 1;
        let l = link.to_string_lossy();
        let t = target.to_string_lossy();
        self.digest.update(l.as_bytes())?;
        self.digest.update(t.as_bytes())?;
        writeln!(self.writer, "L {l}\t{t}")
            .map_err(|e| DatastoreError::io("write summary", self.tmp.path(), e))?;
        Ok(())
    }

    pub fn set_previous_target(&mut self, target: PathBuf) {
        self.previous_target = target;
    }

    pub fn set_current_target(&mut self, target: PathBuf) {
        self.current_target = target;
    }

    pub fn build(mut self) -> Result<SummaryRecord, DatastoreError> {
        let end_time = SystemTime::now();
        let checksum = self.digest.finalize()?;
        writeln!(self.writer, "S {}", checksum.hex())
            .map_err(|e| DatastoreError::io("write summary", self.tmp.path(), e))?;
        self.writer
            .flush()
            .map_err(|e| DatastoreError::io("write summary", self.tmp.path(), e))?;
        drop(self.writer);
        kb_fs::ops::rename(self.tmp.path(), &self.summary_file)?;

        Ok(SummaryRecord {
            directory_id: self.directory_id,
            date: self.date,
            backup_id: self.backup_id,
            start_time: self.start_time,
            end_time,
            num_directories: self.num_directories,
            num_copied_files: self.num_copied_files,
            num_hard_linked_files: self.num_hard_linked_files,
            num_symlinks: self.num_symlinks,
            previous_target: self.previous_target,
            current_target: self.current_target,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lines_and_checksum_are_written() {
        let meta_dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let date = YearMonthDay {
            year: 2026,
            month: 7,
            day: 27,
        };
        let mut builder = SummaryBuilder::new(
            meta_dir.path(),
            "sha1-of-photos".to_string(),
            date,
            PathBuf::from("2026/0727000"),
        )
        .unwrap();

        builder.add_dir(Path::new(".")).unwrap();
        let file_digest = DigestResult::parse(&"ab".repeat(32)).unwrap();
        builder.add_copied_file(Path::new("a.txt"), &file_digest).unwrap();
        builder
            .add_hard_linked_file(Path::new("b.txt"), &file_digest)
            .unwrap();
        builder
            .add_symlink(Path::new("link"), Path::new("../elsewhere"))
            .unwrap();
        builder.set_previous_target(PathBuf::from("../2026/0726000"));
        builder.set_current_target(PathBuf::from("../2026/0727000"));

        let record = builder.build().unwrap();
        assert_eq!(record.num_directories, 1);
        assert_eq!(record.num_copied_files, 1);
        assert_eq!(record.num_hard_linked_files, 1);
        assert_eq!(record.num_symlinks, 1);
        assert!(!record.checksum.is_zero());

        let summary_file = meta_dir.path().join("2026").join("0727000.summary");
        let contents = std::fs::read_to_string(&summary_file).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "D .");
        assert!(lines[1].starts_with("C "));
        assert!(lines[2].starts_with("H "));
        assert!(lines[3].starts_with("L link\t../elsewhere"));
        assert!(lines[4].starts_with("S "));
    }
}
