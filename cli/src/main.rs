mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_init_local, cmd_inspect, cmd_sync};
use crate::config::{load_config, local_only_path};

#[derive(Parser)]
#[command(
    name = "platemate-sync",
    version,
    about = "Reconcile the PlateMate device database with the central store"
)]
struct Cli {
    /// Log every per-record decision
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Local SQLite database (overrides LOCAL_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    local_db: Option<PathBuf>,
    /// PostgreSQL connection string (overrides DATABASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync: restore empty local tables, then push local changes
    Sync {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
        /// Show table overviews before and after the run
        #[arg(long)]
        inspect: bool,
    },
    /// Create any missing tables in the local database
    InitLocal,
    /// Show which synchronized tables exist in each store and how many rows they hold
    Inspect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Commands::Sync {
        json: false,
        inspect: false,
    });

    match command {
        Commands::Sync { json, inspect } => {
            let config = load_config(cli.local_db, cli.database_url)?;
            cmd_sync(&config, json, inspect)
        }
        Commands::InitLocal => cmd_init_local(&local_only_path(cli.local_db)),
        Commands::Inspect { json } => {
            let config = load_config(cli.local_db, cli.database_url)?;
            cmd_inspect(&config, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_is_default_command() {
        let cli = Cli::try_parse_from(["platemate-sync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "platemate-sync",
            "sync",
            "--json",
            "--verbose",
            "--local-db",
            "/tmp/x.db",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.local_db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Some(Commands::Sync {
                json: true,
                inspect: false
            })
        ));
    }

    #[test]
    fn test_init_local_parses() {
        let cli = Cli::try_parse_from(["platemate-sync", "init-local"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::InitLocal)));
    }
}
