//! # evolog
//!
//! Operator binary for the evolog datastore migration engine.
//!
//! Concrete migration steps are provided by the hosting deployment (see
//! [`registered_migrations`]); the binary wires settings, logging, the
//! connection pool, and the handler together and maps errors to exit codes:
//! `0` success, `1` user-facing validation failure, `2` infrastructure
//! failure.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use evolog_events::sqlite::connection::{ConnectionConfig, ConnectionPool};
use evolog_events::{DatastoreError, new_file, run_migrations};
use evolog_migrations::{Migration, MigrationError, MigrationHandler};
use evolog_settings::{EvologSettings, load_settings, load_settings_from_path};

/// Exit code for user-facing validation failures.
const EXIT_VALIDATION: u8 = 1;
/// Exit code for infrastructure failures.
const EXIT_INFRASTRUCTURE: u8 = 2;

/// evolog datastore migration tool.
#[derive(Parser, Debug)]
#[command(name = "evolog", about = "Migrate the evolog event-sourced datastore")]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to the settings file (defaults to `~/.evolog/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite historic events up to the registered target index.
    Migrate {
        /// Also finalize when the run leaves staged rewrites behind.
        #[arg(long)]
        finalize: bool,
    },
    /// Promote staged rewrites into the live log after a prior migrate.
    Finalize,
    /// Report migration progress counters.
    Stats,
}

/// The migration steps this deployment ships.
///
/// Deployments embedding the engine append their steps here in target-index
/// order; the stock binary ships none.
fn registered_migrations() -> Vec<Box<dyn Migration>> {
    Vec::new()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::from(EXIT_VALIDATION);
        }
    };

    init_logging(&settings);

    match run(&cli, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn load(cli: &Cli) -> evolog_settings::Result<EvologSettings> {
    match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
}

fn init_logging(settings: &EvologSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli, settings: &EvologSettings) -> Result<(), MigrationError> {
    let pool = open_pool(cli, settings)?;
    run_migrations(&*pool.get().map_err(DatastoreError::from)?)?;

    let mut handler = MigrationHandler::new(pool);
    handler.register_migrations(registered_migrations())?;

    match cli.command {
        Command::Migrate { finalize } => {
            let finalize_needed = handler.migrate()?;
            if finalize {
                if finalize_needed {
                    handler.finalize()?;
                }
            } else if finalize_needed {
                println!("migration complete, finalization pending (run `evolog finalize`)");
            }
        }
        Command::Finalize => handler.finalize()?,
        Command::Stats => {
            let stats = handler.stats()?;
            println!("min_mi_positions:           {}", stats.min_mi_positions);
            println!("count_positions:            {}", stats.count_positions);
            println!("min_mi_migration_positions: {}", stats.min_mi_migration_positions);
            println!("count_migration_positions:  {}", stats.count_migration_positions);
            println!("target_migration_index:     {}", stats.target_migration_index);
        }
    }
    Ok(())
}

fn open_pool(cli: &Cli, settings: &EvologSettings) -> Result<ConnectionPool, MigrationError> {
    let path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.database.path));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            DatastoreError::BadCoding(format!(
                "cannot create database directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    let config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
        cache_size_kib: settings.database.cache_size_kib,
    };
    let pool = new_file(&path.to_string_lossy(), &config)?;
    Ok(pool)
}

/// Map an error to the operator exit code.
fn exit_code(err: &MigrationError) -> u8 {
    match err {
        MigrationError::Datastore(
            DatastoreError::Sqlite(_) | DatastoreError::Pool(_) | DatastoreError::Schema { .. },
        ) => EXIT_INFRASTRUCTURE,
        _ => EXIT_VALIDATION,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
