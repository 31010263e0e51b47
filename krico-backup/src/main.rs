//! Command-line front end for `kb-repo`. Argument parsing, OS user-name
//! lookup and exit-code translation live here; the core library knows
//! nothing about any of it. Grounded on the ecosystem's usual CLI shape
//! (`clap` derive + `anyhow` at the boundary + `env_logger` installed once
//! in `main`), generalized from the teacher's `proxmox-router`-based CLI
//! since the distilled spec calls for a plain `clap` surface instead.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "krico-backup", version = kb_buildcfg::PACKAGE_VERSION, about = "space-efficient personal backup engine")]
struct Cli {
    /// Repository root (defaults to the current directory).
    #[arg(short = 'C', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a repository in the working directory.
    Init,
    /// List, get or set configuration values.
    Config {
        /// List every key.
        #[arg(short = 'l', long, conflicts_with_all = ["get", "set"])]
        list: bool,
        /// Get a dotted key (`section.var` or `section.sub.var`).
        #[arg(short = 'g', long, value_name = "NAME")]
        get: Option<String>,
        /// Set a dotted key to a value.
        #[arg(short = 's', long, num_args = 2, value_names = ["NAME", "VALUE"])]
        set: Option<Vec<String>>,
    },
    /// Register a subject directory backed by a source directory.
    Add {
        dir: String,
        source_dir: PathBuf,
    },
    /// List configured subjects.
    List,
    /// Run a backup for every configured subject.
    Run,
    /// Walk the log, from HEAD or from a (possibly partial) hash.
    Log {
        /// Maximum number of records to print.
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Number of records to skip before printing.
        #[arg(short = 's', long, default_value_t = 0)]
        skip: usize,
        /// Print exactly one record.
        #[arg(short = '1')]
        one: bool,
        /// Print full record detail.
        #[arg(short = 'f', long)]
        full: bool,
        /// Print the files touched by each RunBackup record.
        #[arg(long = "file-list")]
        file_list: bool,
        /// Start from this (possibly partial) record hash instead of HEAD.
        hash: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let root = cli.dir.unwrap_or_else(|| PathBuf::from("."));
    let result = match cli.command {
        Commands::Init => commands::init(&root),
        Commands::Config { list, get, set } => commands::config(&root, list, get, set),
        Commands::Add { dir, source_dir } => commands::add(&root, &dir, &source_dir),
        Commands::List => commands::list(&root),
        Commands::Run => commands::run(&root),
        Commands::Log {
            count,
            skip,
            one,
            full,
            file_list,
            hash,
        } => commands::log(&root, commands::LogOptions {
            count: if one { Some(1) } else { count },
            skip,
            full,
            file_list,
            hash,
        }),
    };

    if let Err(err) = result {
        let chain = err.chain().map(|e| e.to_string()).collect::<Vec<_>>().join(" - ");
        eprintln!("Error: {chain}");
        std::process::exit(1);
    }
}
