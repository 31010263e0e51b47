//! The hash-chained, append-only administrative/backup event log.
//! Grounded on `log_records.h`/`BackupRepositoryLog.h`: each record's
//! encoded bytes (type, previous-hash, timestamp, author, then a
//! per-variant tail) are SHA-1-hashed to name the record's own file under a
//! one-level hex-prefix split, and a `HEAD` file (rewritten via
//! temp-then-rename) tracks the chain tip.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use kb_codec::{Decoder, Encoder, YearMonthDay};
use kb_digest::DigestResult;

use crate::error::DatastoreError;
use crate::summary::SummaryRecord;

pub const HEAD_FILE: &str = "HEAD";
pub const DIGEST_DIRS: u8 = 1;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LogEntryType {
    Init = 1,
    AddDirectory = 2,
    RunBackup = 3,
}

impl LogEntryType {
    fn from_byte(b: u8) -> Result<Self, DatastoreError> {
        match b {
            1 => Ok(LogEntryType::Init),
            2 => Ok(LogEntryType::AddDirectory),
            3 => Ok(LogEntryType::RunBackup),
            other => Err(DatastoreError::UnknownLogEntryType(other)),
        }
    }
}

impl std::fmt::Display for LogEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogEntryType::Init => "init",
            LogEntryType::AddDirectory => "add",
            LogEntryType::RunBackup => "run",
        })
    }
}

#[derive(Clone, Debug)]
pub struct LogHeader {
    pub record_type: LogEntryType,
    pub prev: DigestResult,
    pub ts: SystemTime,
    pub author: String,
}

#[derive(Clone, Debug)]
pub enum LogRecord {
    Init(LogHeader),
    AddDirectory {
        header: LogHeader,
        directory_id: String,
        source_dir: PathBuf,
    },
    RunBackup {
        header: LogHeader,
        summary: SummaryRecord,
    },
}

impl LogRecord {
    pub fn header(&self) -> &LogHeader {
        match self {
            LogRecord::Init(h) => h,
            LogRecord::AddDirectory { header, .. } => header,
            LogRecord::RunBackup { header, .. } => header,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let header = self.header();
        let mut enc = Encoder::new();
        enc.write_u8(header.record_type as u8);
        enc.write_digest(&header.prev);
        enc.write_timestamp(header.ts);
        enc.write_str(&header.author);
        match self {
            LogRecord::Init(_) => {}
            LogRecord::AddDirectory {
                directory_id,
                source_dir,
                ..
            } => {
                enc.write_str(directory_id);
                enc.write_path(source_dir);
            }
            LogRecord::RunBackup { summary, .. } => {
                enc.write_str(&summary.directory_id);
                enc.write_date(summary.date);
                enc.write_path(&summary.backup_id);
                enc.write_timestamp(summary.start_time);
                enc.write_timestamp(summary.end_time);
                enc.write_u32_le(summary.num_directories);
                enc.write_u32_le(summary.num_copied_files);
                enc.write_u32_le(summary.num_hard_linked_files);
                enc.write_u32_le(summary.num_symlinks);
                enc.write_path(&summary.previous_target);
                enc.write_path(&summary.current_target);
                enc.write_digest(&summary.checksum);
            }
        }
        enc.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DatastoreError> {
        let mut dec = Decoder::new(bytes);
        let record_type = LogEntryType::from_byte(dec.read_u8()?)?;
        let prev = dec.read_digest(kb_digest::SHA1_LEN)?;
        let ts = dec.read_timestamp()?;
        let author = dec.read_str()?;
        let header = LogHeader {
            record_type,
            prev,
            ts,
            author,
        };
        match record_type {
            LogEntryType::Init => Ok(LogRecord::Init(header)),
            LogEntryType::AddDirectory => {
                let directory_id = dec.read_str()?;
                let source_dir = dec.read_path()?;
                Ok(LogRecord::AddDirectory {
                    header,
                    directory_id,
                    source_dir,
                })
            }
            LogEntryType::RunBackup => {
                let directory_id = dec.read_str()?;
                let date = dec.read_date()?.unwrap_or(YearMonthDay::default());
                let backup_id = dec.read_path()?;
                let start_time = dec.read_timestamp()?;
                let end_time = dec.read_timestamp()?;
                let num_directories = dec.read_u32_le()?;
                let num_copied_files = dec.read_u32_le()?;
                let num_hard_linked_files = dec.read_u32_le()?;
                let num_symlinks = dec.read_u32_le()?;
                let previous_target = dec.read_path()?;
                let current_target = dec.read_path()?;
                let checksum = dec.read_digest(kb_digest::SHA1_LEN)?;
                Ok(LogRecord::RunBackup {
                    header,
                    summary: SummaryRecord {
                        directory_id,
                        date,
                        backup_id,
                        start_time,
                        end_time,
                        num_directories,
                        num_copied_files,
                        num_hard_linked_files,
                        num_symlinks,
                        previous_target,
                        current_target,
                        checksum,
                    },
                })
            }
        }
    }
}

/// The log chain rooted at `dir`: records live at `dir/<first-byte-hex>/<rest-of-hex>`,
/// and `dir/HEAD` always names the current tip.
pub struct RepositoryLog {
    dir: PathBuf,
    head_file: PathBuf,
    head: Option<DigestResult>,
}

impl RepositoryLog {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let head_file = dir.join(HEAD_FILE);
        RepositoryLog {
            dir,
            head_file,
            head: None,
        }
    }

    pub fn head(&mut self) -> Result<DigestResult, DatastoreError> {
        if self.head.is_none() {
            self.head = Some(self.read_head()?);
        }
        Ok(self.head.clone().unwrap())
    }

    fn read_head(&self) -> Result<DigestResult, DatastoreError> {
        match std::fs::read_to_string(&self.head_file) {
            Ok(hex) => Ok(DigestResult::parse(hex.trim())?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(kb_digest::SHA1_ZERO()),
            Err(e) => Err(DatastoreError::io("read", &self.head_file, e)),
        }
    }

    pub fn put_init_record(&mut self, author: &str) -> Result<DigestResult, DatastoreError> {
        let header = self.next_header(LogEntryType::Init, author)?;
        self.put_record(LogRecord::Init(header))
    }

    pub fn put_add_directory_record(
        &mut self,
        author: &str,
        directory_id: &str,
        source_dir: &Path,
    ) -> Result<DigestResult, DatastoreError> {
        let header = self.next_header(LogEntryType::AddDirectory, author)?;
        self.put_record(LogRecord::AddDirectory {
            header,
            directory_id: directory_id.to_string(),
            source_dir: source_dir.to_path_buf(),
        })
    }

    pub fn put_run_backup_record(
        &mut self,
        author: &str,
        summary: SummaryRecord,
    ) -> Result<DigestResult, DatastoreError> {
        let header = self.next_header(LogEntryType::RunBackup, author)?;
        self.put_record(LogRecord::RunBackup { header, summary })
    }

    fn next_header(&mut self, record_type: LogEntryType, author: &str) -> Result<LogHeader, DatastoreError> {
        Ok(LogHeader {
            record_type,
            prev: self.head()?,
            ts: SystemTime::now(),
            author: author.to_string(),
        })
    }

    fn put_record(&mut self, record: LogRecord) -> Result<DigestResult, DatastoreError> {
        let bytes = record.encode();
        let mut digest = kb_digest::Digest::sha1()?;
        digest.update(&bytes)?;
        let r = digest.finalize()?;

        let file = self.dir.join(r.path(DIGEST_DIRS));
        if let Some(parent) = file.parent() {
            kb_fs::ops::create_dir_all(parent)?;
        }
        std::fs::write(&file, &bytes).map_err(|e| DatastoreError::io("write log record", &file, e))?;

        kb_fs::ops::replace_file(&self.head_file, r.hex().as_bytes())?;
        self.head = Some(r.clone());
        Ok(r)
    }

    pub fn get_record(&self, digest: &DigestResult) -> Result<LogRecord, DatastoreError> {
        let file = self.dir.join(digest.path(DIGEST_DIRS));
        let bytes = std::fs::read(&file)
            .map_err(|_| DatastoreError::LogEntryNotFound(digest.hex()))?;
        LogRecord::decode(&bytes)
    }

    pub fn get_head_record(&mut self) -> Result<LogRecord, DatastoreError> {
        let head = self.head()?;
        self.get_record(&head)
    }

    pub fn get_prev(&self, record: &LogRecord) -> Result<LogRecord, DatastoreError> {
        self.get_record(&record.header().prev)
    }

    /// Every digest on disk whose hex representation starts with `prefix`.
    pub fn find_hash(&self, prefix: &str) -> Result<Vec<DigestResult>, DatastoreError> {
        let mut out = Vec::new();
        if prefix.is_empty() || !self.dir.is_dir() {
            return Ok(out);
        }
        for top in std::fs::read_dir(&self.dir)
            .map_err(|e| DatastoreError::io("read directory", &self.dir, e))?
        {
            let top = top.map_err(|e| DatastoreError::io("read directory entry", &self.dir, e))?;
            if !top.path().is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(top.path())
                .map_err(|e| DatastoreError::io("read directory", top.path(), e))?
            {
                let entry = entry.map_err(|e| DatastoreError::io("read directory entry", top.path(), e))?;
                let top_name = top.file_name().to_string_lossy().to_string();
                let rest_name = entry.file_name().to_string_lossy().to_string();
                let hex = format!("{top_name}{rest_name}");
                if hex.starts_with(prefix) {
                    out.push(DigestResult::parse(&hex)?);
                }
            }
        }
        out.sort_by_key(|d| d.hex());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_record_chains_from_zero() {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut log = RepositoryLog::open(dir.path());
        assert!(log.head().unwrap().is_zero());

        let h1 = log.put_init_record("alice").unwrap();
        assert!(!h1.is_zero());
        assert_eq!(log.head().unwrap(), h1);

        match log.get_record(&h1).unwrap() {
            LogRecord::Init(header) => {
                assert_eq!(header.author, "alice");
                assert!(header.prev.is_zero());
            }
            other => panic!("expected Init, got {other:?}"),
        }
    }

    #[test]
    fn records_chain_through_prev() {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut log = RepositoryLog::open(dir.path());
        let h1 = log.put_init_record("alice").unwrap();
        let h2 = log
            .put_add_directory_record("alice", "photos", Path::new("/home/alice/photos"))
            .unwrap();

        let record2 = log.get_record(&h2).unwrap();
        assert_eq!(record2.header().prev, h1);

        let prev = log.get_prev(&record2).unwrap();
        match prev {
            LogRecord::Init(header) => assert_eq!(header.author, "alice"),
            other => panic!("expected Init, got {other:?}"),
        }
    }

    #[test]
    fn find_hash_matches_by_prefix() {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut log = RepositoryLog::open(dir.path());
        let h1 = log.put_init_record("alice").unwrap();
        let prefix = &h1.hex()[..6];
        let matches = log.find_hash(prefix).unwrap();
        assert!(matches.contains(&h1));
    }

    #[test]
    fn find_hash_with_empty_prefix_matches_nothing() {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let mut log = RepositoryLog::open(dir.path());
        log.put_init_record("alice").unwrap();
        assert!(log.find_hash("").unwrap().is_empty());
    }

    #[test]
    fn reopening_resumes_from_head_file() {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let h1 = {
            let mut log = RepositoryLog::open(dir.path());
            log.put_init_record("alice").unwrap()
        };
        let mut log2 = RepositoryLog::open(dir.path());
        assert_eq!(log2.head().unwrap(), h1);
    }
}
