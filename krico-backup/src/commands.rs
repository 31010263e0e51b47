use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use kb_datastore::LogRecord;
use kb_repo::Repository;

pub struct LogOptions {
    pub count: Option<usize>,
    pub skip: usize,
    pub full: bool,
    pub file_list: bool,
    pub hash: Option<String>,
}

/// Current OS user name, the way the rest of the stack resolves identity.
fn current_user_name() -> Result<String> {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    let user = nix::unistd::User::from_uid(nix::unistd::Uid::current())
        .context("looking up current user")?
        .context("current user does not exist in the password database")?;
    Ok(user.name)
}

pub fn init(root: &Path) -> Result<()> {
    let author = current_user_name()?;
    let mut repo = Repository::initialize(root, &author)?;
    repo.unlock()?;
    println!("initialized repository at {}", root.display());
    Ok(())
}

pub fn config(
    root: &Path,
    list: bool,
    get: Option<String>,
    set: Option<Vec<String>>,
) -> Result<()> {
    let mut repo = Repository::open(root)?;
    let cfg = repo.config()?;

    if let Some(pair) = set {
        let (name, value) = (&pair[0], &pair[1]);
        cfg.set_by_key(name, value)?;
        return Ok(());
    }
    if let Some(name) = get {
        let (section, subsection, variable) = split_dotted(&name)?;
        match cfg.get(&section, &subsection, &variable) {
            Some(value) => println!("{value}"),
            None => bail!("no such key '{name}'"),
        }
        return Ok(());
    }
    if list {
        for (key, value) in cfg.list() {
            println!("{key}={value}");
        }
        return Ok(());
    }
    bail!("config requires one of -l, -g <name>, -s <name> <value>")
}

fn split_dotted(key: &str) -> Result<(String, String, String)> {
    let first_dot = key.find('.').context("key must be section.var or section.sub.var")?;
    let section = key[..first_dot].to_string();
    let last_dot = key.rfind('.').unwrap();
    let (subsection, variable) = if first_dot == last_dot {
        (String::new(), key[first_dot + 1..].to_string())
    } else {
        (
            key[first_dot + 1..last_dot].to_string(),
            key[last_dot + 1..].to_string(),
        )
    };
    Ok((section, subsection, variable))
}

pub fn add(root: &Path, dir: &str, source_dir: &PathBuf) -> Result<()> {
    let author = current_user_name()?;
    let mut repo = Repository::open(root)?;
    repo.add_directory(dir, source_dir, &author)?;
    println!("added '{dir}' -> {}", source_dir.display());
    Ok(())
}

pub fn list(root: &Path) -> Result<()> {
    let mut repo = Repository::open(root)?;
    for directory in repo.list_directories()? {
        println!(
            "{}\t{}",
            directory.id().str(),
            directory.source_dir().map(|p| p.display().to_string()).unwrap_or_default()
        );
    }
    Ok(())
}

pub fn run(root: &Path) -> Result<()> {
    let author = current_user_name()?;
    let mut repo = Repository::open(root)?;
    let summaries = repo.run_all(&author)?;
    for summary in &summaries {
        println!(
            "{}: {} dirs, {} copied, {} hardlinked, {} symlinks",
            summary.directory_id,
            summary.num_directories,
            summary.num_copied_files,
            summary.num_hard_linked_files,
            summary.num_symlinks
        );
    }
    Ok(())
}

pub fn log(root: &Path, opts: LogOptions) -> Result<()> {
    let mut repo = Repository::open(root)?;
    let repo_log = repo.repository_log()?;

    let mut current = match &opts.hash {
        Some(prefix) => {
            let matches = repo_log.find_hash(prefix)?;
            match matches.as_slice() {
                [] => bail!("no record matches hash '{prefix}'"),
                [single] => Some(single.clone()),
                many => bail!("ambiguous hash '{prefix}' ({} matches)", many.len()),
            }
        }
        None => {
            let head = repo_log.head()?;
            if head.is_zero() {
                None
            } else {
                Some(head)
            }
        }
    };

    let mut printed = 0usize;
    let mut skipped = 0usize;
    while let Some(digest) = current {
        let record = repo_log.get_record(&digest)?;
        if skipped < opts.skip {
            skipped += 1;
            current = Some(record.header().prev.clone());
            if record.header().prev.is_zero() {
                break;
            }
            continue;
        }
        if let Some(limit) = opts.count {
            if printed >= limit {
                break;
            }
        }
        print_record(&digest, &record, opts.full, opts.file_list);
        printed += 1;

        let prev = record.header().prev.clone();
        current = if prev.is_zero() { None } else { Some(prev) };
    }
    Ok(())
}

fn print_record(digest: &kb_digest::DigestResult, record: &LogRecord, full: bool, file_list: bool) {
    let header = record.header();
    match record {
        LogRecord::Init(_) => {
            println!("{} init author={}", digest.hex(), header.author);
        }
        LogRecord::AddDirectory {
            directory_id,
            source_dir,
            ..
        } => {
            println!(
                "{} add author={} directory={directory_id} source={}",
                digest.hex(),
                header.author,
                source_dir.display()
            );
        }
        LogRecord::RunBackup { summary, .. } => {
            println!(
                "{} run author={} directory={} backup={} dirs={} copied={} hardlinked={} symlinks={}",
                digest.hex(),
                header.author,
                summary.directory_id,
                summary.backup_id.display(),
                summary.num_directories,
                summary.num_copied_files,
                summary.num_hard_linked_files,
                summary.num_symlinks
            );
            if file_list {
                println!(
                    "  summary checksum={}",
                    summary.checksum.hex()
                );
            }
        }
    }
    if full {
        println!("  prev={}", header.prev.hex());
    }
}
