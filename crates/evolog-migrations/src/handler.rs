//! The orchestrating [`MigrationHandler`] — the engine's entry point.
//!
//! Owns the connection pool and the registered migration steps, decides
//! whether migration or finalization is needed, and drives the position
//! migrator and the finalizer accordingly.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use evolog_core::MigrationIndex;
use evolog_events::sqlite::connection::{ConnectionPool, PooledConnection};
use evolog_events::sqlite::repositories::{MigrationPositionRepo, PositionRepo};
use evolog_events::DatastoreError;

use crate::errors::{MigrationError, Result};
use crate::finalize::Finalizer;
use crate::migrater::PositionMigrator;
use crate::migration::Migration;

/// Snapshot of the migration-relevant table aggregates.
///
/// Minimum indices default to 1 when the corresponding table is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationStats {
    /// `min(migration_index)` over live positions.
    pub min_mi_positions: MigrationIndex,
    /// Number of live positions.
    pub count_positions: i64,
    /// `min(migration_index)` over checkpointed positions.
    pub min_mi_migration_positions: MigrationIndex,
    /// Number of checkpointed positions.
    pub count_migration_positions: i64,
    /// The index the registered steps migrate to.
    pub target_migration_index: MigrationIndex,
}

impl fmt::Display for MigrationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "positions: {} (min MI {}), migration_positions: {} (min MI {}), target MI: {}",
            self.count_positions,
            self.min_mi_positions,
            self.count_migration_positions,
            self.min_mi_migration_positions,
            self.target_migration_index
        )
    }
}

/// Orchestrates migration runs over one datastore.
pub struct MigrationHandler {
    pool: ConnectionPool,
    migrations: BTreeMap<MigrationIndex, Box<dyn Migration>>,
    target_migration_index: MigrationIndex,
}

impl MigrationHandler {
    /// Create a handler with no registered migrations (target index 1).
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            migrations: BTreeMap::new(),
            target_migration_index: 1,
        }
    }

    /// Register migration steps.
    ///
    /// Targets must form the contiguous range `2..=T` once all registrations
    /// are in; gaps, duplicates, and indices below 2 are rejected.
    pub fn register_migrations(
        &mut self,
        migrations: impl IntoIterator<Item = Box<dyn Migration>>,
    ) -> Result<()> {
        for migration in migrations {
            let target = migration.target_migration_index();
            if target < 2 {
                return Err(MigrationError::InvalidSetup(format!(
                    "target migration index must be >= 2, got {target}"
                )));
            }
            if self.migrations.insert(target, migration).is_some() {
                return Err(MigrationError::InvalidSetup(format!(
                    "duplicate migration with target index {target}"
                )));
            }
        }

        let max = self.migrations.keys().max().copied().unwrap_or(1);
        for index in 2..=max {
            if !self.migrations.contains_key(&index) {
                return Err(MigrationError::InvalidSetup(format!(
                    "missing migration with target index {index}"
                )));
            }
        }
        self.target_migration_index = max;
        Ok(())
    }

    /// The index the registered steps migrate to (1 when none).
    pub fn target_migration_index(&self) -> MigrationIndex {
        self.target_migration_index
    }

    /// Current table aggregates plus the registered target.
    pub fn stats(&self) -> Result<MigrationStats> {
        let conn = self.conn()?;
        Ok(MigrationStats {
            min_mi_positions: PositionRepo::min_migration_index(&conn)?.unwrap_or(1),
            count_positions: PositionRepo::count(&conn)?,
            min_mi_migration_positions: MigrationPositionRepo::min_migration_index(&conn)?
                .unwrap_or(1),
            count_migration_positions: MigrationPositionRepo::count(&conn)?,
            target_migration_index: self.target_migration_index,
        })
    }

    /// Migrate the datastore up to the registered target index.
    ///
    /// Returns whether finalization is (still) needed.
    pub fn migrate(&self) -> Result<bool> {
        let stats = self.stats()?;
        let target = self.target_migration_index;

        if stats.count_positions == 0 {
            info!("empty datastore, nothing to migrate");
            return Ok(false);
        }
        if stats.min_mi_positions == target {
            info!(
                current = target,
                "no migrations to apply, the datastore is up to date"
            );
            return Ok(false);
        }
        if stats.min_mi_migration_positions == target
            && stats.count_positions == stats.count_migration_positions
        {
            info!(
                current = target,
                "no migrations to apply, but finalizing is still needed"
            );
            return Ok(true);
        }
        if stats.min_mi_positions < 1 || stats.min_mi_migration_positions < 1 {
            return Err(MigrationError::MismatchingMigrationIndices(format!(
                "the datastore has an invalid migration index: \
                 MI of positions table={}; MI of migration_positions table={}",
                stats.min_mi_positions, stats.min_mi_migration_positions
            )));
        }

        let conn = self.conn()?;
        PositionMigrator::new(target, &self.migrations).run(&conn)?;
        Ok(true)
    }

    /// Finalize a completed migration run.
    ///
    /// Requires every position to be checkpointed at the target index.
    /// Re-running after a successful finalization is a harmless rebuild —
    /// finalization is idempotent.
    pub fn finalize(&self) -> Result<()> {
        let stats = self.stats()?;
        let target = self.target_migration_index;
        let fully_checkpointed = stats.count_migration_positions == stats.count_positions
            && stats.min_mi_migration_positions == target;
        let already_finalized =
            stats.count_migration_positions == 0 && stats.min_mi_positions == target;
        if stats.count_positions > 0 && !fully_checkpointed && !already_finalized {
            return Err(MigrationError::NotFinalizable(format!(
                "positions are not fully migrated to index {target} ({stats})"
            )));
        }

        let conn = self.conn()?;
        Finalizer::new(target).run(&conn)
    }

    /// Migrate and, if needed, finalize in one call.
    pub fn migrate_and_finalize(&self) -> Result<()> {
        if self.migrate()? {
            self.finalize()?;
        }
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get().map_err(DatastoreError::from)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
