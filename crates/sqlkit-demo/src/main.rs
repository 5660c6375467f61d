//! sqlkit-demo: run the sqlkit walkthrough against a SQLite store.

use clap::{ArgAction, Parser};
use sqlkit_core::Result;
use sqlkit_sqlite::{SqliteConfig, SqliteConnection};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlkit-demo")]
#[command(author, version, about = "Walk a SQLite store through the sqlkit client API", long_about = None)]
struct Cli {
    /// Store file to open (created if missing)
    #[arg(long, default_value = "test.db")]
    db: PathBuf,

    /// Use an in-memory store instead of a file
    #[arg(long, conflicts_with = "fresh")]
    memory: bool,

    /// Delete the store file before opening it
    #[arg(long)]
    fresh: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = ?e.kind(), "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = if cli.memory {
        SqliteConfig::memory()
    } else {
        if cli.fresh {
            remove_store(&cli.db)?;
        }
        SqliteConfig::file(cli.db.to_string_lossy())
    };

    let conn = SqliteConnection::open(&config)?;
    let report = sqlkit_demo::run(&conn)?;
    tracing::debug!(rows = report.rows.len(), "walkthrough finished");
    conn.close()
}

fn remove_store(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed existing store");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
