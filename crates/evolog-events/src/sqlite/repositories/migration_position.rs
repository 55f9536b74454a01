//! Checkpoint repository — the `migration_positions` table.
//!
//! Maps each position to the highest migration index that has already
//! rewritten its staged image. The upsert is the last statement of every
//! per-position migration transaction, which makes it the resume marker.

use rusqlite::{Connection, OptionalExtension, params};

use evolog_core::{MigrationIndex, Position};

use crate::errors::Result;

/// Checkpoint repository — stateless, every method takes `&Connection`.
pub struct MigrationPositionRepo;

impl MigrationPositionRepo {
    /// The recorded migration index for a position, if any.
    pub fn get(conn: &Connection, position: Position) -> Result<Option<MigrationIndex>> {
        let index = conn
            .query_row(
                "SELECT migration_index FROM migration_positions WHERE position = ?1",
                params![position],
                |row| row.get(0),
            )
            .optional()?;
        Ok(index)
    }

    /// Insert or overwrite the recorded index for a position.
    pub fn upsert(conn: &Connection, position: Position, index: MigrationIndex) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO migration_positions (position, migration_index) VALUES (?1, ?2)
             ON CONFLICT(position) DO UPDATE SET migration_index = excluded.migration_index",
            params![position, index],
        )?;
        Ok(())
    }

    /// Minimum recorded migration index.
    pub fn min_migration_index(conn: &Connection) -> Result<Option<MigrationIndex>> {
        let min: Option<MigrationIndex> = conn
            .query_row(
                "SELECT MIN(migration_index) FROM migration_positions",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(min)
    }

    /// Oldest recorded position whose index is below `index`.
    pub fn min_position_below_index(
        conn: &Connection,
        index: MigrationIndex,
    ) -> Result<Option<Position>> {
        let min: Option<Position> = conn
            .query_row(
                "SELECT MIN(position) FROM migration_positions WHERE migration_index < ?1",
                params![index],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(min)
    }

    /// Highest recorded position, if any.
    pub fn max_position(conn: &Connection) -> Result<Option<Position>> {
        let max: Option<Position> = conn
            .query_row("SELECT MAX(position) FROM migration_positions", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(max)
    }

    /// Total checkpoint count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM migration_positions", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Delete all checkpoints. Returns rows deleted.
    pub fn clear(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM migration_positions", [])?;
        Ok(changed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = setup();
        assert_eq!(MigrationPositionRepo::get(&conn, 1).unwrap(), None);
    }

    #[test]
    fn upsert_inserts_then_overwrites() {
        let conn = setup();
        MigrationPositionRepo::upsert(&conn, 1, 2).unwrap();
        assert_eq!(MigrationPositionRepo::get(&conn, 1).unwrap(), Some(2));

        MigrationPositionRepo::upsert(&conn, 1, 3).unwrap();
        assert_eq!(MigrationPositionRepo::get(&conn, 1).unwrap(), Some(3));
        assert_eq!(MigrationPositionRepo::count(&conn).unwrap(), 1);
    }

    #[test]
    fn aggregates() {
        let conn = setup();
        assert_eq!(MigrationPositionRepo::min_migration_index(&conn).unwrap(), None);
        assert_eq!(MigrationPositionRepo::max_position(&conn).unwrap(), None);

        MigrationPositionRepo::upsert(&conn, 1, 3).unwrap();
        MigrationPositionRepo::upsert(&conn, 2, 2).unwrap();

        assert_eq!(
            MigrationPositionRepo::min_migration_index(&conn).unwrap(),
            Some(2)
        );
        assert_eq!(MigrationPositionRepo::max_position(&conn).unwrap(), Some(2));
        assert_eq!(
            MigrationPositionRepo::min_position_below_index(&conn, 3).unwrap(),
            Some(2)
        );
        assert_eq!(
            MigrationPositionRepo::min_position_below_index(&conn, 2).unwrap(),
            None
        );
    }

    #[test]
    fn clear() {
        let conn = setup();
        MigrationPositionRepo::upsert(&conn, 1, 2).unwrap();
        MigrationPositionRepo::upsert(&conn, 2, 2).unwrap();
        assert_eq!(MigrationPositionRepo::clear(&conn).unwrap(), 2);
        assert_eq!(MigrationPositionRepo::count(&conn).unwrap(), 0);
    }
}
