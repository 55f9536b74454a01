//! Staging event repository — the `migration_events` table.
//!
//! Rewritten events live here until finalization. [`StagingEventRepo::diff_write`]
//! replaces a position's staged image with minimal row churn so that primary
//! keys stay stable when the same position is migrated again.

use rusqlite::{Connection, params};

use evolog_core::Position;

use crate::errors::Result;
use crate::event::Event;
use crate::sqlite::repositories::event::{EventRepo, data_column};
use crate::sqlite::row_types::EventRow;

/// Staging event repository — stateless, every method takes `&Connection`.
pub struct StagingEventRepo;

impl StagingEventRepo {
    /// All staged events of one position, ordered by weight.
    pub fn get_by_position(conn: &Connection, position: Position) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, position, fqid, type, data, weight
             FROM migration_events WHERE position = ?1 ORDER BY weight ASC",
        )?;
        let rows = stmt
            .query_map(params![position], EventRepo::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Staged row ids of one position, ordered by weight.
    pub fn ids_by_position(conn: &Connection, position: Position) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT id FROM migration_events WHERE position = ?1 ORDER BY weight ASC",
        )?;
        let ids = stmt
            .query_map(params![position], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Overwrite one staged row in place.
    pub fn update(conn: &Connection, id: i64, event: &Event, weight: i64) -> Result<()> {
        let _ = conn.execute(
            "UPDATE migration_events SET fqid = ?1, type = ?2, data = ?3, weight = ?4
             WHERE id = ?5",
            params![
                event.fqid().to_string(),
                event.kind().as_str(),
                data_column(event)?,
                weight,
                id,
            ],
        )?;
        Ok(())
    }

    /// Insert a staged event.
    pub fn insert(
        conn: &Connection,
        position: Position,
        event: &Event,
        weight: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO migration_events (position, fqid, type, data, weight)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                position,
                event.fqid().to_string(),
                event.kind().as_str(),
                data_column(event)?,
                weight,
            ],
        )?;
        Ok(())
    }

    /// Delete staged rows by id. Returns rows deleted.
    pub fn delete_ids(conn: &Connection, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "DELETE FROM migration_events WHERE id IN ({})",
            placeholders.join(", ")
        );
        let params: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let changed = conn.execute(&sql, params.as_slice())?;
        Ok(changed)
    }

    /// Distinct positions that have staged events, ascending.
    pub fn positions_with_events(conn: &Connection) -> Result<Vec<Position>> {
        let mut stmt = conn
            .prepare("SELECT DISTINCT position FROM migration_events ORDER BY position ASC")?;
        let positions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(positions)
    }

    /// Total staged event count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM migration_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete all staged events. Returns rows deleted.
    pub fn clear(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM migration_events", [])?;
        Ok(changed)
    }

    /// Replace the staged image of `position` with `new_events`.
    ///
    /// Existing rows are overwritten in weight order, surplus rows are
    /// deleted, missing rows are inserted; weights are renumbered 1..n.
    /// An empty `new_events` deletes the position's staged image entirely.
    pub fn diff_write(conn: &Connection, position: Position, new_events: &[Event]) -> Result<()> {
        let old_ids = Self::ids_by_position(conn, position)?;

        let mut weight: i64 = 0;
        for (id, event) in old_ids.iter().zip(new_events.iter()) {
            weight += 1;
            Self::update(conn, *id, event, weight)?;
        }

        if old_ids.len() > new_events.len() {
            let _ = Self::delete_ids(conn, &old_ids[new_events.len()..])?;
        }

        for event in new_events.iter().skip(old_ids.len()) {
            weight += 1;
            Self::insert(conn, position, event, weight)?;
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
