//! Live event repository — the `events` table.
//!
//! The live log is append-only from the writer's perspective; the finalizer
//! is the only component that replaces rows (swapping in staged rewrites).

use rusqlite::{Connection, params};

use evolog_core::Position;

use crate::errors::Result;
use crate::event::Event;
use crate::sqlite::row_types::EventRow;

/// Serialize an event's payload for the `data` column (`None` for kinds
/// without a payload).
pub(crate) fn data_column(event: &Event) -> Result<Option<String>> {
    match event.data() {
        serde_json::Value::Null => Ok(None),
        other => Ok(Some(serde_json::to_string(&other)?)),
    }
}

/// Live event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Insert an event at the given position and weight. Returns the row id.
    pub fn insert(
        conn: &Connection,
        position: Position,
        event: &Event,
        weight: i64,
    ) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO events (position, fqid, type, data, weight)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                position,
                event.fqid().to_string(),
                event.kind().as_str(),
                data_column(event)?,
                weight,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All events of one position, ordered by weight.
    pub fn get_by_position(conn: &Connection, position: Position) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, position, fqid, type, data, weight
             FROM events WHERE position = ?1 ORDER BY weight ASC",
        )?;
        let rows = stmt
            .query_map(params![position], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The whole log, ordered by position then weight. Used for replay.
    pub fn all_ordered(conn: &Connection) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, position, fqid, type, data, weight
             FROM events ORDER BY position ASC, weight ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Events of positions in `(from, to]`, ordered by position then weight.
    ///
    /// Used by keyframe reconstruction to replay a bounded slice of the log.
    pub fn range_ordered(
        conn: &Connection,
        after: Position,
        up_to: Position,
    ) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, position, fqid, type, data, weight
             FROM events WHERE position > ?1 AND position <= ?2
             ORDER BY position ASC, weight ASC",
        )?;
        let rows = stmt
            .query_map(params![after, up_to], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete all events of one position. Returns rows deleted.
    pub fn delete_by_position(conn: &Connection, position: Position) -> Result<usize> {
        let changed = conn.execute("DELETE FROM events WHERE position = ?1", params![position])?;
        Ok(changed)
    }

    /// Total event count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    pub(crate) fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
        Ok(EventRow {
            id: row.get(0)?,
            position: row.get(1)?,
            fqid: row.get(2)?,
            event_type: row.get(3)?,
            data: row.get(4)?,
            weight: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
