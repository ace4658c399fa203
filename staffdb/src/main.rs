//! staffdb - command-line front end for employee record files
//!
//! Each invocation runs one command against one database file and exits.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use staffdb_engine::StoreError;

mod cli;
mod config;

use cli::Command;
use config::{Config, DEFAULT_CONFIG};

/// staffdb - file-backed employee record store
#[derive(Parser, Debug)]
#[command(name = "staffdb")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file [default: staffdb.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding database files
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Directory holding CSV backups
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => Config::load(path, true)?,
        None => Config::load(&PathBuf::from(DEFAULT_CONFIG), false)?,
    };
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(dir) = args.backup_dir {
        config.backup_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level)?;
    debug!("Storage directory: {}", config.storage_dir.display());
    debug!("Backup directory: {}", config.backup_dir.display());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::execute(args.command, &config, &mut out)
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<StoreError>())
                .map_or(1, |err| err.kind().as_raw());
            ExitCode::from(code)
        }
    }
}
