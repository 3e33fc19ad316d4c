//! contactlink command-line entry point.
//!
//! # Responsibility
//! - Resolve identities against a local contact store from the shell.
//! - Keep output machine-readable: the identify view is printed as JSON.
//!
//! # Exit codes
//! - `0` success, `1` internal failure, `2` invalid input.

use clap::{Parser, Subcommand};
use contactlink_core::db::open_db;
use contactlink_core::{default_log_level, identify_contact, init_logging, IdentifyError};
use log::error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Command-line arguments for contactlink.
#[derive(Parser, Debug)]
#[command(name = "contactlink")]
#[command(about = "Resolve customer identity across partial contact records")]
#[command(version)]
struct Args {
    /// SQLite contact store
    #[arg(long, default_value = "contactlink.sqlite3", env = "CONTACTLINK_DB")]
    db: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "CONTACTLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "CONTACTLINK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify an (email, phone) submission and print the consolidated contact
    Identify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "phone")]
        phone_number: Option<String>,
    },
    /// Print core ping and version
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(log_dir) = args.log_dir.as_ref() {
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, &log_dir.to_string_lossy()) {
            eprintln!("contactlink: {err}");
            return ExitCode::from(1);
        }
    }

    match args.command {
        Command::Ping => {
            println!("contactlink_core ping={}", contactlink_core::ping());
            println!("contactlink_core version={}", contactlink_core::core_version());
            ExitCode::SUCCESS
        }
        Command::Identify {
            email,
            phone_number,
        } => run_identify(&args.db, email.as_deref(), phone_number.as_deref()),
    }
}

fn run_identify(db: &Path, email: Option<&str>, phone_number: Option<&str>) -> ExitCode {
    let mut conn = match open_db(db) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("contactlink: failed to open `{}`: {err}", db.display());
            return ExitCode::from(1);
        }
    };

    match identify_contact(&mut conn, email, phone_number) {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("contactlink: failed to encode response: {err}");
                ExitCode::from(1)
            }
        },
        Err(err @ IdentifyError::InvalidInput) => {
            eprintln!("contactlink: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("event=cli_identify module=cli status=error error_code={}", err.code());
            eprintln!("contactlink: an internal error occurred while identifying the contact");
            ExitCode::from(1)
        }
    }
}
