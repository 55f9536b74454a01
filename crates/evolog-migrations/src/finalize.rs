//! Finalization — promoting staged rewrites into the live log.
//!
//! One transaction: swap staged events into `events` per position, clear
//! staging and checkpoints, bump every position to the target index, rebuild
//! the derived `models` table by replaying the whole log, and drop all
//! keyframes. Every step is a set-deletion, wholesale replacement, or full
//! rebuild, so re-running converges to the same state.

use rusqlite::Connection;
use tracing::info;

use evolog_core::MigrationIndex;
use evolog_events::replay_events;
use evolog_events::sqlite::repositories::{
    EventRepo, KeyframeRepo, MigrationPositionRepo, ModelRepo, PositionRepo, StagingEventRepo,
};
use evolog_events::DatastoreError;

use crate::errors::Result;

/// Promotes staged rewrites into the live tables.
pub struct Finalizer {
    target_migration_index: MigrationIndex,
}

impl Finalizer {
    /// Create a finalizer for the given target index.
    pub fn new(target_migration_index: MigrationIndex) -> Self {
        Self {
            target_migration_index,
        }
    }

    /// Run finalization in a single transaction.
    pub fn run(&self, conn: &Connection) -> Result<()> {
        let tx = conn.unchecked_transaction().map_err(DatastoreError::from)?;

        // 1. Replace live events per migrated position. Iterating the
        //    checkpoint table (not staging) also covers positions whose
        //    rewritten image is empty: their live events are deleted.
        let mut swapped = 0usize;
        for position in checkpointed_positions(&tx)? {
            let _ = EventRepo::delete_by_position(&tx, position)?;
            for row in StagingEventRepo::get_by_position(&tx, position)? {
                let event = row.to_event()?;
                let _ = EventRepo::insert(&tx, position, &event, row.weight)?;
            }
            swapped += 1;
        }

        // 2.–4. Clear staging state and bump every position to the target.
        let _ = StagingEventRepo::clear(&tx)?;
        let _ = MigrationPositionRepo::clear(&tx)?;
        let _ = PositionRepo::set_all_migration_indices(&tx, self.target_migration_index)?;

        // 5. Rebuild the derived models table from the (now migrated) log.
        let models = replay_events(&EventRepo::all_ordered(&tx)?)?;
        ModelRepo::replace_all(&tx, &models)?;

        // 6. Keyframes refer to superseded indices now.
        let _ = KeyframeRepo::clear(&tx)?;

        tx.commit().map_err(DatastoreError::from)?;
        info!(
            positions = swapped,
            models = models.len(),
            target = self.target_migration_index,
            "finalization complete"
        );
        Ok(())
    }
}

/// Positions with a checkpoint entry, ascending.
fn checkpointed_positions(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT position FROM migration_positions ORDER BY position ASC")
            .map_err(DatastoreError::from)?;
    let positions = stmt
        .query_map([], |row| row.get(0))
        .map_err(DatastoreError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(DatastoreError::from)?;
    Ok(positions)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
