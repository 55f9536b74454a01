//! Position repository — the `positions` table.
//!
//! Positions are append-only and never deleted; the only mutation the engine
//! performs is the finalizer's wholesale migration-index bump.

use rusqlite::{Connection, OptionalExtension, params};

use evolog_core::{MigrationIndex, Position};

use crate::errors::Result;
use crate::sqlite::row_types::PositionRow;

/// Position repository — stateless, every method takes `&Connection`.
pub struct PositionRepo;

impl PositionRepo {
    /// Insert a position row.
    pub fn insert(conn: &Connection, row: &PositionRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO positions (position, migration_index, timestamp, user_id, information)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.position,
                row.migration_index,
                row.timestamp,
                row.user_id,
                row.information,
            ],
        )?;
        Ok(())
    }

    /// Get a single position.
    pub fn get(conn: &Connection, position: Position) -> Result<Option<PositionRow>> {
        let row = conn
            .query_row(
                "SELECT position, migration_index, timestamp, user_id, information
                 FROM positions WHERE position = ?1",
                params![position],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All positions ≥ `start`, ordered ascending.
    pub fn get_from(conn: &Connection, start: Position) -> Result<Vec<PositionRow>> {
        let mut stmt = conn.prepare(
            "SELECT position, migration_index, timestamp, user_id, information
             FROM positions WHERE position >= ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map(params![start], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The position immediately preceding `position`, if any.
    pub fn get_preceding(conn: &Connection, position: Position) -> Result<Option<PositionRow>> {
        let row = conn
            .query_row(
                "SELECT position, migration_index, timestamp, user_id, information
                 FROM positions WHERE position < ?1 ORDER BY position DESC LIMIT 1",
                params![position],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Minimum migration index over all positions.
    pub fn min_migration_index(conn: &Connection) -> Result<Option<MigrationIndex>> {
        let min: Option<MigrationIndex> = conn
            .query_row("SELECT MIN(migration_index) FROM positions", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(min)
    }

    /// Oldest position whose migration index is below `index`.
    pub fn min_position_below_index(
        conn: &Connection,
        index: MigrationIndex,
    ) -> Result<Option<Position>> {
        let min: Option<Position> = conn
            .query_row(
                "SELECT MIN(position) FROM positions WHERE migration_index < ?1",
                params![index],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(min)
    }

    /// Oldest position strictly greater than `position`.
    pub fn min_position_above(conn: &Connection, position: Position) -> Result<Option<Position>> {
        let min: Option<Position> = conn
            .query_row(
                "SELECT MIN(position) FROM positions WHERE position > ?1",
                params![position],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(min)
    }

    /// Highest position, if any.
    pub fn max_position(conn: &Connection) -> Result<Option<Position>> {
        let max: Option<Position> = conn
            .query_row("SELECT MAX(position) FROM positions", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(max)
    }

    /// Total position count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Set every position's migration index to `index`. Returns rows changed.
    pub fn set_all_migration_indices(conn: &Connection, index: MigrationIndex) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE positions SET migration_index = ?1",
            params![index],
        )?;
        Ok(changed)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionRow> {
        Ok(PositionRow {
            position: row.get(0)?,
            migration_index: row.get(1)?,
            timestamp: row.get(2)?,
            user_id: row.get(3)?,
            information: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
