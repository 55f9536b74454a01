//! Schema migration runner for the datastore database.
//!
//! Schema migrations are embedded at compile time via [`include_str!`] and
//! executed in version order, each inside its own transaction. The
//! `schema_version` table tracks applied versions; running the migrator is
//! idempotent.
//!
//! Not to be confused with the *data* migrations this repository exists for:
//! this module only evolves the engine's own tables.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{DatastoreError, Result};

/// A single schema migration with a version number and SQL to execute.
struct SchemaMigration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All schema migrations in version order.
const MIGRATIONS: &[SchemaMigration] = &[SchemaMigration {
    version: 1,
    description: "Complete schema — log, staging, keyframes, models",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending schema migrations on the given connection.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                description = migration.description,
                "schema migration already applied, skipping"
            );
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying schema migration"
        );

        apply_migration(conn, migration)?;
        applied += 1;
    }

    Ok(applied)
}

/// Return the highest applied schema version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DatastoreError::Schema {
            message: format!("failed to read schema_version: {e}"),
        })?;
    Ok(version)
}

/// Return the latest schema version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| DatastoreError::Schema {
        message: format!("failed to create schema_version table: {e}"),
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &SchemaMigration) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| DatastoreError::Schema {
            message: format!(
                "failed to begin transaction for v{}: {e}",
                migration.version
            ),
        })?;

    tx.execute_batch(migration.sql)
        .map_err(|e| DatastoreError::Schema {
            message: format!(
                "schema migration v{} ({}) failed: {e}",
                migration.version, migration.description
            ),
        })?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) \
             VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| DatastoreError::Schema {
            message: format!(
                "failed to record v{} in schema_version: {e}",
                migration.version
            ),
        })?;

    tx.commit().map_err(|e| DatastoreError::Schema {
        message: format!("failed to commit v{}: {e}", migration.version),
    })?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
