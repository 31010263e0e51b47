//! git-config-flavored section/subsection/variable store.
//!
//! Grounded on the original `BackupConfig.cpp`: section names are
//! case-folded to lowercase, an optional double-quoted subsection follows
//! the section name, variable names start with a letter and continue with
//! letters/digits/hyphens, and a bare variable (no `= value`) defaults to
//! `"true"`. Updates rewrite the file through a sibling temp file and
//! rename it into place, preserving the original line order and
//! rewriting only the touched line.

use std::collections::BTreeMap;
use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};

use kb_fs::ops;
use kb_fs::temp::TemporaryFile;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid section '{0}' (only alphanumeric and '-')")]
    InvalidSection(String),
    #[error("invalid subsection '{0}' (cannot contain new-line, null byte, '\"' or '\\')")]
    InvalidSubSection(String),
    #[error("variable cannot be empty")]
    EmptyVariable,
    #[error("variable name '{0}' must start with an alphabetic character")]
    VariableMustStartAlphabetic(String),
    #[error("variable '{0}' (start with alphabetic followed by only alphanumeric and '-')")]
    InvalidVariable(String),
    #[error("invalid property key '{0}' (expected section.varname or section.subsection.varname)")]
    InvalidKey(String),
    #[error("line {line_no}: {message} ({line:?})")]
    Parse {
        line_no: u32,
        line: String,
        message: String,
    },
    #[error(transparent)]
    Fs(#[from] kb_fs::FsError),
}

#[derive(Debug, Clone, Default)]
struct Value {
    line_no: u32,
    value: String,
}

#[derive(Debug, Clone, Default)]
struct SubSection {
    line_no: u32,
    values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct Section {
    subsections: BTreeMap<String, SubSection>,
}

/// A parsed, in-memory view of a configuration file, kept in sync with
/// disk: every [`Config::set`] call rewrites the file and reloads it.
pub struct Config {
    file: PathBuf,
    sections: BTreeMap<String, Section>,
}

impl Config {
    /// Open (creating it, with a `# Created <timestamp>` header comment,
    /// if it does not yet exist) and parse `file`.
    pub fn open(file: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let file = file.into();
        match std::fs::metadata(&file) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(kb_fs::FsError::io(
                    "open config",
                    &file,
                    std::io::Error::new(std::io::ErrorKind::Other, "not a regular file"),
                )
                .into())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let contents = format!("# Created {now}\n");
                std::fs::write(&file, contents)
                    .map_err(|e| kb_fs::FsError::io("create config", &file, e))?;
            }
            Err(e) => return Err(kb_fs::FsError::io("stat config", &file, e).into()),
        }

        let mut config = Config {
            file,
            sections: BTreeMap::new(),
        };
        config.reparse()?;
        Ok(config)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn get(&self, section: &str, subsection: &str, variable: &str) -> Option<&str> {
        let section = section.to_ascii_lowercase();
        self.sections
            .get(&section)?
            .subsections
            .get(subsection)?
            .values
            .get(variable)
            .map(|v| v.value.as_str())
    }

    pub fn get_unsectioned(&self, section: &str, variable: &str) -> Option<&str> {
        self.get(section, "", variable)
    }

    /// List every `section[.subsection].variable = value` entry, sorted.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (section_name, section) in &self.sections {
            for (subsection_name, subsection) in &section.subsections {
                for (variable, value) in &subsection.values {
                    let mut key = section_name.clone();
                    if !subsection_name.is_empty() {
                        key.push('.');
                        key.push_str(subsection_name);
                    }
                    key.push('.');
                    key.push_str(variable);
                    out.push((key, value.value.clone()));
                }
            }
        }
        out
    }

    pub fn set(
        &mut self,
        section: &str,
        subsection: &str,
        variable: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let section_name = section.to_ascii_lowercase();
        if section_name.is_empty()
            || !section_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::InvalidSection(section.to_string()));
        }
        if variable.is_empty() {
            return Err(ConfigError::EmptyVariable);
        }
        if subsection
            .chars()
            .any(|c| c == '\n' || c == '\0' || c == '"' || c == '\\')
        {
            return Err(ConfigError::InvalidSubSection(subsection.to_string()));
        }
        if !variable.chars().next().unwrap().is_ascii_alphabetic() {
            return Err(ConfigError::VariableMustStartAlphabetic(variable.to_string()));
        }
        if !variable.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::InvalidVariable(variable.to_string()));
        }

        let mut section_line = 0u32;
        let mut value_line = 0u32;
        if let Some(section) = self.sections.get(&section_name) {
            if let Some(sub) = section.subsections.get(subsection) {
                section_line = sub.line_no;
                if let Some(existing) = sub.values.get(variable) {
                    value_line = existing.line_no;
                }
            }
        }

        let dir = self.file.parent().unwrap_or_else(|| Path::new("."));
        let file_name = self
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config");
        let tmp = TemporaryFile::with_prefix_suffix(dir, file_name, ".tmp")?;

        {
            let input = std::fs::File::open(&self.file)
                .map_err(|e| kb_fs::FsError::io("read config", &self.file, e))?;
            let mut output = std::fs::File::create(tmp.path())
                .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
            let reader = std::io::BufReader::new(input);
            let mut line_no = 0u32;
            for line in reader.lines() {
                let line = line.map_err(|e| kb_fs::FsError::io("read config", &self.file, e))?;
                line_no += 1;
                if section_line != 0 {
                    if value_line == 0 {
                        if section_line == line_no {
                            writeln!(output, "{line}")
                                .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
                            writeln!(output, "\t{variable} = {value}").map_err(|e| {
                                kb_fs::FsError::io("write config", tmp.path(), e)
                            })?;
                            continue;
                        }
                    } else if value_line == line_no {
                        writeln!(output, "\t{variable} = {value}")
                            .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
                        continue;
                    }
                }
                writeln!(output, "{line}")
                    .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
            }
            if section_line == 0 {
                if subsection.is_empty() {
                    writeln!(output, "[{section_name}]")
                } else {
                    writeln!(output, "[{section_name} \"{subsection}\"]")
                }
                .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
                writeln!(output, "\t{variable} = {value}")
                    .map_err(|e| kb_fs::FsError::io("write config", tmp.path(), e))?;
            }
        }

        ops::rename(tmp.path(), &self.file)?;
        self.reparse()
    }

    /// `section.varname` or `section.subsection.varname`.
    pub fn set_by_key(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let first_dot = key.find('.').ok_or_else(|| ConfigError::InvalidKey(key.to_string()))?;
        if first_dot == 0 || first_dot == key.len() - 1 {
            return Err(ConfigError::InvalidKey(key.to_string()));
        }
        let section = &key[..first_dot];
        let last_dot = key.rfind('.').unwrap();
        let (subsection, variable) = if first_dot == last_dot {
            ("", &key[first_dot + 1..])
        } else {
            (&key[first_dot + 1..last_dot], &key[last_dot + 1..])
        };
        self.set(section, subsection, variable, value)
    }

    fn reparse(&mut self) -> Result<(), ConfigError> {
        self.sections.clear();
        let mut parser = Parser::new(&self.file)?;
        while let Some(entry) = parser.next_entry()? {
            let section = self
                .sections
                .entry(entry.section.clone())
                .or_default();
            let subsection = section.subsections.entry(entry.subsection.clone()).or_default();
            if subsection.line_no == 0 {
                subsection.line_no = entry.section_line_no;
            }
            if let Some((name, value)) = entry.variable {
                subsection.values.insert(
                    name,
                    Value {
                        line_no: entry.line_no,
                        value,
                    },
                );
            }
        }
        Ok(())
    }
}

struct ParsedEntry {
    section: String,
    subsection: String,
    section_line_no: u32,
    line_no: u32,
    variable: Option<(String, String)>,
}

struct Parser {
    reader: std::io::BufReader<std::fs::File>,
    line_no: u32,
    section: String,
    subsection: String,
    section_line_no: u32,
}

impl Parser {
    fn new(file: &Path) -> Result<Self, ConfigError> {
        let handle =
            std::fs::File::open(file).map_err(|e| kb_fs::FsError::io("read config", file, e))?;
        Ok(Parser {
            reader: std::io::BufReader::new(handle),
            line_no: 0,
            section: String::new(),
            subsection: String::new(),
            section_line_no: 0,
        })
    }

    fn next_entry(&mut self) -> Result<Option<ParsedEntry>, ConfigError> {
        loop {
            let mut raw = String::new();
            let bytes_read = self
                .reader
                .read_line(&mut raw)
                .map_err(|e| kb_fs::FsError::io("read config", Path::new(""), e))?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let original = raw.trim_end_matches(['\n', '\r']).to_string();
            let trimmed = original.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.chars().next().unwrap() {
                ';' | '#' => continue,
                '[' => {
                    self.parse_section(trimmed, &original)?;
                    self.section_line_no = self.line_no;
                    return Ok(Some(ParsedEntry {
                        section: self.section.clone(),
                        subsection: self.subsection.clone(),
                        section_line_no: self.section_line_no,
                        line_no: self.line_no,
                        variable: None,
                    }));
                }
                _ => {
                    let (name, value) = self.parse_value(trimmed, &original)?;
                    return Ok(Some(ParsedEntry {
                        section: self.section.clone(),
                        subsection: self.subsection.clone(),
                        section_line_no: self.section_line_no,
                        line_no: self.line_no,
                        variable: Some((name, value)),
                    }));
                }
            }
        }
    }

    fn parse_section(&mut self, trimmed: &str, original: &str) -> Result<(), ConfigError> {
        if !trimmed.ends_with(']') {
            return Err(ConfigError::Parse {
                line_no: self.line_no,
                line: original.to_string(),
                message: "invalid section".to_string(),
            });
        }
        let inner = trimmed[1..trimmed.len() - 1].trim();
        let name_end = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(inner.len());
        let name = &inner[..name_end];
        if name.is_empty() {
            return Err(ConfigError::Parse {
                line_no: self.line_no,
                line: original.to_string(),
                message: "empty section".to_string(),
            });
        }
        self.section = name.to_ascii_lowercase();
        let rest = inner[name_end..].trim();
        if rest.is_empty() {
            self.subsection = String::new();
            return Ok(());
        }
        if !(rest.starts_with('"') && rest.ends_with('"') && rest.len() >= 2) {
            return Err(ConfigError::Parse {
                line_no: self.line_no,
                line: original.to_string(),
                message: "invalid subsection".to_string(),
            });
        }
        self.subsection = rest[1..rest.len() - 1].to_string();
        Ok(())
    }

    fn parse_value(&self, trimmed: &str, original: &str) -> Result<(String, String), ConfigError> {
        if !trimmed.chars().next().unwrap().is_ascii_alphabetic() {
            return Err(ConfigError::Parse {
                line_no: self.line_no,
                line: original.to_string(),
                message: "variable name must start with an alphabetic character".to_string(),
            });
        }
        let name_end = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(trimmed.len());
        let name = trimmed[..name_end].to_string();
        let rest = trimmed[name_end..].trim();
        if rest.is_empty() {
            return Ok((name, "true".to_string()));
        }
        if !rest.starts_with('=') {
            return Err(ConfigError::Parse {
                line_no: self.line_no,
                line: original.to_string(),
                message: "invalid variable line (missing '=')".to_string(),
            });
        }
        Ok((name, rest[1..].trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (kb_fs::TemporaryDirectory, PathBuf) {
        let dir = kb_fs::TemporaryDirectory::new(std::env::temp_dir()).unwrap();
        let path = dir.path().join("config");
        (dir, path)
    }

    #[test]
    fn creates_file_with_header_comment() {
        let (_dir, path) = temp_config();
        Config::open(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# Created "));
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        config.set("Repo", "", "name", "backups").unwrap();
        assert_eq!(config.get("repo", "", "name"), Some("backups"));
        assert_eq!(config.get("REPO", "", "name"), Some("backups"));
    }

    #[test]
    fn subsection_is_quoted_and_preserved() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        config.set("subject", "photos", "source", "/home/me/photos").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[subject \"photos\"]"));
        assert_eq!(
            config.get("subject", "photos", "source"),
            Some("/home/me/photos")
        );
    }

    #[test]
    fn updating_existing_variable_replaces_in_place() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        config.set("repo", "", "name", "first").unwrap();
        config.set("repo", "", "other", "x").unwrap();
        config.set("repo", "", "name", "second").unwrap();
        assert_eq!(config.get("repo", "", "name"), Some("second"));
        assert_eq!(config.get("repo", "", "other"), Some("x"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("name").count(), 1);
    }

    #[test]
    fn bare_variable_defaults_to_true() {
        let (_dir, path) = temp_config();
        std::fs::write(&path, "[repo]\n\tverbose\n").unwrap();
        let config = Config::open(&path).unwrap();
        assert_eq!(config.get("repo", "", "verbose"), Some("true"));
    }

    #[test]
    fn invalid_section_name_is_rejected() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        assert!(config.set("bad section", "", "x", "1").is_err());
    }

    #[test]
    fn variable_must_start_alphabetic() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        assert!(config.set("repo", "", "1bad", "x").is_err());
    }

    #[test]
    fn set_by_key_splits_section_subsection_variable() {
        let (_dir, path) = temp_config();
        let mut config = Config::open(&path).unwrap();
        config.set_by_key("subject.photos.source", "/home/me/photos").unwrap();
        assert_eq!(
            config.get("subject", "photos", "source"),
            Some("/home/me/photos")
        );
    }
}
