//! The position migrator — walks the log and runs the step chain.
//!
//! For every position that still needs work, the migrator runs the chain
//! `S → S+1 → … → T` (where `S` is the position's current index and `T` the
//! global target), rewriting events through tandem keyframe accessors and
//! diff-writing the result into staging. Each position commits in its own
//! transaction with the `migration_positions` checkpoint as the last write,
//! so an interrupted run resumes at the first unfinished position.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::{debug, info};

use evolog_core::{MigrationIndex, Position};
use evolog_events::sqlite::repositories::{
    EventRepo, MigrationPositionRepo, PositionRepo, StagingEventRepo,
};
use evolog_events::sqlite::row_types::PositionRow;
use evolog_events::{DatastoreError, Event};

use crate::errors::{MigrationError, Result};
use crate::keyframes::{DatabaseKeyframeAccessor, InitialKeyframeAccessor, KeyframeAccessor};
use crate::migration::{Migration, PositionData};

/// Walks positions in order and migrates each to the target index.
pub(crate) struct PositionMigrator<'a> {
    target_migration_index: MigrationIndex,
    migrations: &'a BTreeMap<MigrationIndex, Box<dyn Migration>>,
}

impl<'a> PositionMigrator<'a> {
    pub(crate) fn new(
        target_migration_index: MigrationIndex,
        migrations: &'a BTreeMap<MigrationIndex, Box<dyn Migration>>,
    ) -> Self {
        Self {
            target_migration_index,
            migrations,
        }
    }

    /// Run one migration pass over every position that needs work.
    pub(crate) fn run(&self, conn: &Connection) -> Result<()> {
        // One read transaction: compute the start position and fetch the
        // worklist plus its anchor.
        let read_tx = conn.unchecked_transaction().map_err(DatastoreError::from)?;
        let Some(start_position) = self.start_position(&read_tx)? else {
            return Ok(());
        };
        let positions = PositionRepo::get_from(&read_tx, start_position)?;
        let anchor = PositionRepo::get_preceding(&read_tx, start_position)?;
        read_tx.commit().map_err(DatastoreError::from)?;

        let mut anchor = anchor;
        for position in positions {
            let tx = conn.unchecked_transaction().map_err(DatastoreError::from)?;

            // Sanity check: migration indices never rise with the position.
            if let Some(previous) = &anchor {
                if position.migration_index > previous.migration_index {
                    return Err(MigrationError::MismatchingMigrationIndices(format!(
                        "position {} has a higher migration index than its predecessor (position {})",
                        position.position, previous.position
                    )));
                }
            }

            let last_position = anchor.as_ref().map_or(0, |row| row.position);
            self.migrate_position(&tx, &position, last_position)?;
            tx.commit().map_err(DatastoreError::from)?;
            anchor = Some(position);
        }
        Ok(())
    }

    /// The oldest position that still needs work: the maximum of the oldest
    /// live position below the target and the oldest staged position below
    /// the target (falling back to the oldest live position beyond the
    /// staged range — the "staging ahead of some positions" resume case).
    fn start_position(&self, conn: &Connection) -> Result<Option<Position>> {
        let target = self.target_migration_index;
        let Some(min_live) = PositionRepo::min_position_below_index(conn, target)? else {
            return Ok(None);
        };

        let min_staged = match MigrationPositionRepo::min_position_below_index(conn, target)? {
            Some(position) => Some(position),
            None => match MigrationPositionRepo::max_position(conn)? {
                Some(max_staged) => PositionRepo::min_position_above(conn, max_staged)?,
                None => None,
            },
        };

        Ok(Some(match min_staged {
            Some(min_staged) => min_live.max(min_staged),
            None => min_live,
        }))
    }

    /// Run the step chain for one position and record the checkpoint.
    fn migrate_position(
        &self,
        conn: &Connection,
        position: &PositionRow,
        last_position: Position,
    ) -> Result<()> {
        let (source_index, mut events_from_staging) =
            match MigrationPositionRepo::get(conn, position.position)? {
                Some(index) => (index, true),
                None => (position.migration_index, false),
            };

        info!(
            position = position.position,
            from = source_index,
            to = self.target_migration_index,
            "migrating position"
        );

        let position_data = position_data(position)?;
        for source in source_index..self.target_migration_index {
            let target = source + 1;
            debug!(target, "running migration step");
            let is_last_step = target == self.target_migration_index;

            let (mut old_accessor, mut new_accessor) =
                accessors(conn, last_position, source, target, position.position, is_last_step)?;

            let migration = self.migrations.get(&target).ok_or_else(|| {
                MigrationError::InvalidSetup(format!("no migration with target index {target}"))
            })?;

            let rows = if events_from_staging {
                StagingEventRepo::get_by_position(conn, position.position)?
            } else {
                // Only the first step reads the live log.
                events_from_staging = true;
                EventRepo::get_by_position(conn, position.position)?
            };
            let old_events = rows
                .iter()
                .map(|row| row.to_event())
                .collect::<evolog_events::Result<Vec<Event>>>()?;

            let new_events = migration.migrate(
                &old_events,
                old_accessor.as_mut(),
                new_accessor.as_mut(),
                &position_data,
            )?;
            StagingEventRepo::diff_write(conn, position.position, &new_events)?;

            old_accessor.move_to_next_position(conn)?;
            if is_last_step {
                // The new accessor only advances once the position is fully
                // migrated.
                new_accessor.move_to_next_position(conn)?;
            }
        }

        MigrationPositionRepo::upsert(conn, position.position, self.target_migration_index)?;
        Ok(())
    }
}

/// Build the tandem accessors for one step of one position.
fn accessors(
    conn: &Connection,
    last_position: Position,
    source_index: MigrationIndex,
    target_index: MigrationIndex,
    current_position: Position,
    is_last_step: bool,
) -> Result<(Box<dyn KeyframeAccessor>, Box<dyn KeyframeAccessor>)> {
    if last_position == 0 {
        // First position ever migrated: both worlds start empty.
        Ok((
            Box::new(InitialKeyframeAccessor::new(source_index, current_position, true)),
            Box::new(InitialKeyframeAccessor::new(
                target_index,
                current_position,
                is_last_step,
            )),
        ))
    } else {
        Ok((
            Box::new(DatabaseKeyframeAccessor::new(
                conn,
                last_position,
                source_index,
                current_position,
                true,
            )?),
            Box::new(DatabaseKeyframeAccessor::new(
                conn,
                last_position,
                target_index,
                current_position,
                is_last_step,
            )?),
        ))
    }
}

/// Convert a position row into the metadata handed to steps.
fn position_data(row: &PositionRow) -> Result<PositionData> {
    let information = row
        .information
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(DatastoreError::from)?;
    Ok(PositionData {
        position: row.position,
        timestamp: row.timestamp.clone(),
        user_id: row.user_id,
        information,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use evolog_events::sqlite::run_migrations;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn seed_position(conn: &Connection, position: Position, migration_index: MigrationIndex) {
        PositionRepo::insert(
            conn,
            &PositionRow {
                position,
                migration_index,
                timestamp: "2025-01-01T00:00:00Z".into(),
                user_id: 0,
                information: None,
            },
        )
        .unwrap();
    }

    fn create_event(fqid: &str, value: i64) -> Event {
        let mut fields = serde_json::Map::new();
        fields.insert("f".into(), json!(value));
        Event::create(fqid.parse().unwrap(), fields)
    }

    fn noop_migrations(target: MigrationIndex) -> BTreeMap<MigrationIndex, Box<dyn Migration>> {
        struct Noop(MigrationIndex);
        impl Migration for Noop {
            fn target_migration_index(&self) -> MigrationIndex {
                self.0
            }
        }
        (2..=target)
            .map(|index| (index, Box::new(Noop(index)) as Box<dyn Migration>))
            .collect()
    }

    #[test]
    fn start_position_with_no_unmigrated_positions() {
        let conn = setup();
        seed_position(&conn, 1, 2);
        let migrations = noop_migrations(2);
        let migrator = PositionMigrator::new(2, &migrations);
        assert_eq!(migrator.start_position(&conn).unwrap(), None);
    }

    #[test]
    fn start_position_is_oldest_live_below_target() {
        let conn = setup();
        seed_position(&conn, 1, 1);
        seed_position(&conn, 2, 1);
        let migrations = noop_migrations(2);
        let migrator = PositionMigrator::new(2, &migrations);
        assert_eq!(migrator.start_position(&conn).unwrap(), Some(1));
    }

    #[test]
    fn start_position_skips_fully_staged_prefix() {
        let conn = setup();
        for p in 1..=3 {
            seed_position(&conn, p, 1);
        }
        // Positions 1 and 2 already staged at the target.
        MigrationPositionRepo::upsert(&conn, 1, 2).unwrap();
        MigrationPositionRepo::upsert(&conn, 2, 2).unwrap();

        let migrations = noop_migrations(2);
        let migrator = PositionMigrator::new(2, &migrations);
        assert_eq!(migrator.start_position(&conn).unwrap(), Some(3));
    }

    #[test]
    fn start_position_revisits_stale_staging() {
        let conn = setup();
        for p in 1..=3 {
            seed_position(&conn, p, 1);
        }
        // A prior run staged positions 1-3 at index 2; target is now 3.
        for p in 1..=3 {
            MigrationPositionRepo::upsert(&conn, p, 2).unwrap();
        }

        let migrations = noop_migrations(3);
        let migrator = PositionMigrator::new(3, &migrations);
        assert_eq!(migrator.start_position(&conn).unwrap(), Some(1));
    }

    #[test]
    fn run_migrates_everything_and_checkpoints() {
        let conn = setup();
        for p in 1..=3 {
            seed_position(&conn, p, 1);
            EventRepo::insert(&conn, p, &create_event(&format!("a/{p}"), p), 1).unwrap();
        }

        let migrations = noop_migrations(2);
        PositionMigrator::new(2, &migrations).run(&conn).unwrap();

        for p in 1..=3 {
            assert_eq!(MigrationPositionRepo::get(&conn, p).unwrap(), Some(2));
            assert_eq!(StagingEventRepo::get_by_position(&conn, p).unwrap().len(), 1);
        }
    }

    #[test]
    fn run_rejects_rising_migration_indices() {
        let conn = setup();
        seed_position(&conn, 1, 1);
        seed_position(&conn, 2, 3);
        EventRepo::insert(&conn, 1, &create_event("a/1", 1), 1).unwrap();
        EventRepo::insert(&conn, 2, &create_event("a/2", 2), 1).unwrap();

        let migrations = noop_migrations(4);
        let err = PositionMigrator::new(4, &migrations).run(&conn).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MismatchingMigrationIndices(_)
        ));
    }

    #[test]
    fn missing_step_is_invalid_setup() {
        let conn = setup();
        seed_position(&conn, 1, 1);
        EventRepo::insert(&conn, 1, &create_event("a/1", 1), 1).unwrap();

        let migrations = BTreeMap::new();
        let err = PositionMigrator::new(2, &migrations).run(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidSetup(_)));
    }
}
