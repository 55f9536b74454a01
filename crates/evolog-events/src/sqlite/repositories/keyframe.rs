//! Keyframe repository — `migration_keyframes` and
//! `migration_keyframe_models`.
//!
//! A keyframe is the full model snapshot at `(position, migration_index)`,
//! one row per model. Snapshots are immutable once written; re-migrating a
//! position replaces its keyframe wholesale.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};

use evolog_core::{Fqid, MigrationIndex, Position};

use crate::errors::Result;
use crate::model::Model;

/// Keyframe repository — stateless, every method takes `&Connection`.
pub struct KeyframeRepo;

impl KeyframeRepo {
    /// Load the model set of the keyframe at `(position, migration_index)`.
    pub fn get(
        conn: &Connection,
        position: Position,
        migration_index: MigrationIndex,
    ) -> Result<Option<BTreeMap<Fqid, Model>>> {
        let keyframe_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM migration_keyframes
                 WHERE position = ?1 AND migration_index = ?2",
                params![position, migration_index],
                |row| row.get(0),
            )
            .optional()?;
        match keyframe_id {
            Some(id) => Ok(Some(Self::load_models(conn, id)?)),
            None => Ok(None),
        }
    }

    /// The newest keyframe at `migration_index` with position ≤ `position`,
    /// as `(position, models)`.
    pub fn latest_at_or_before(
        conn: &Connection,
        position: Position,
        migration_index: MigrationIndex,
    ) -> Result<Option<(Position, BTreeMap<Fqid, Model>)>> {
        let found: Option<(i64, Position)> = conn
            .query_row(
                "SELECT id, position FROM migration_keyframes
                 WHERE migration_index = ?1 AND position <= ?2
                 ORDER BY position DESC LIMIT 1",
                params![migration_index, position],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match found {
            Some((id, at)) => Ok(Some((at, Self::load_models(conn, id)?))),
            None => Ok(None),
        }
    }

    /// Write (or replace) the keyframe at `(position, migration_index)`.
    pub fn replace(
        conn: &Connection,
        position: Position,
        migration_index: MigrationIndex,
        models: &BTreeMap<Fqid, Model>,
    ) -> Result<()> {
        // Model rows cascade with the keyframe row.
        let _ = conn.execute(
            "DELETE FROM migration_keyframes WHERE position = ?1 AND migration_index = ?2",
            params![position, migration_index],
        )?;
        let _ = conn.execute(
            "INSERT INTO migration_keyframes (position, migration_index) VALUES (?1, ?2)",
            params![position, migration_index],
        )?;
        let keyframe_id = conn.last_insert_rowid();

        let mut stmt = conn.prepare(
            "INSERT INTO migration_keyframe_models (keyframe_id, fqid, data)
             VALUES (?1, ?2, ?3)",
        )?;
        for (fqid, model) in models {
            let _ = stmt.execute(params![
                keyframe_id,
                fqid.to_string(),
                serde_json::to_string(&model.to_value())?,
            ])?;
        }
        Ok(())
    }

    /// Number of stored keyframes.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM migration_keyframes", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Delete all keyframes (model rows cascade). Returns keyframes deleted.
    pub fn clear(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM migration_keyframes", [])?;
        Ok(changed)
    }

    fn load_models(conn: &Connection, keyframe_id: i64) -> Result<BTreeMap<Fqid, Model>> {
        let mut stmt = conn.prepare(
            "SELECT fqid, data FROM migration_keyframe_models WHERE keyframe_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![keyframe_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut models = BTreeMap::new();
        for (fqid, data) in rows {
            let fqid: Fqid = fqid.parse()?;
            let model = Model::from_value(serde_json::from_str(&data)?)?;
            let _ = models.insert(fqid, model);
        }
        Ok(models)
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
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn models(entries: &[(&str, i64)]) -> BTreeMap<Fqid, Model> {
        entries
            .iter()
            .map(|(fqid, value)| {
                let mut fields = serde_json::Map::new();
                fields.insert("f".into(), json!(value));
                (fqid.parse().unwrap(), Model::new(fields, 1))
            })
            .collect()
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = setup();
        assert!(KeyframeRepo::get(&conn, 1, 2).unwrap().is_none());
    }

    #[test]
    fn replace_and_get_roundtrip() {
        let conn = setup();
        let snapshot = models(&[("a/1", 1), ("a/2", 2)]);
        KeyframeRepo::replace(&conn, 1, 2, &snapshot).unwrap();

        let loaded = KeyframeRepo::get(&conn, 1, 2).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn replace_overwrites_existing_snapshot() {
        let conn = setup();
        KeyframeRepo::replace(&conn, 1, 2, &models(&[("a/1", 1)])).unwrap();
        KeyframeRepo::replace(&conn, 1, 2, &models(&[("a/2", 2)])).unwrap();

        let loaded = KeyframeRepo::get(&conn, 1, 2).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&"a/2".parse().unwrap()));
        assert_eq!(KeyframeRepo::count(&conn).unwrap(), 1);
    }

    #[test]
    fn keyframes_are_addressed_by_position_and_index() {
        let conn = setup();
        KeyframeRepo::replace(&conn, 1, 2, &models(&[("a/1", 1)])).unwrap();
        KeyframeRepo::replace(&conn, 1, 3, &models(&[("a/2", 2)])).unwrap();

        assert!(KeyframeRepo::get(&conn, 1, 2).unwrap().is_some());
        assert!(KeyframeRepo::get(&conn, 1, 3).unwrap().is_some());
        assert!(KeyframeRepo::get(&conn, 2, 2).unwrap().is_none());
    }

    #[test]
    fn latest_at_or_before_picks_newest_matching() {
        let conn = setup();
        KeyframeRepo::replace(&conn, 1, 2, &models(&[("a/1", 1)])).unwrap();
        KeyframeRepo::replace(&conn, 3, 2, &models(&[("a/3", 3)])).unwrap();
        KeyframeRepo::replace(&conn, 5, 3, &models(&[("a/5", 5)])).unwrap();

        let (position, loaded) = KeyframeRepo::latest_at_or_before(&conn, 4, 2)
            .unwrap()
            .unwrap();
        assert_eq!(position, 3);
        assert!(loaded.contains_key(&"a/3".parse().unwrap()));

        assert!(KeyframeRepo::latest_at_or_before(&conn, 4, 5).unwrap().is_none());
    }

    #[test]
    fn clear_cascades_model_rows() {
        let conn = setup();
        KeyframeRepo::replace(&conn, 1, 2, &models(&[("a/1", 1)])).unwrap();
        assert_eq!(KeyframeRepo::clear(&conn).unwrap(), 1);

        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_keyframe_models", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
