//! Derived model repository — the `models` table.
//!
//! The table is a pure projection of the event log: the writer maintains it
//! incrementally, the finalizer rebuilds it wholesale after a migration.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};

use evolog_core::Fqid;

use crate::errors::Result;
use crate::model::Model;

/// Derived model repository — stateless, every method takes `&Connection`.
pub struct ModelRepo;

impl ModelRepo {
    /// Load one model.
    pub fn get(conn: &Connection, fqid: &Fqid) -> Result<Option<Model>> {
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM models WHERE fqid = ?1",
                params![fqid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(Model::from_value(serde_json::from_str(&data)?)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite one model.
    pub fn upsert(conn: &Connection, fqid: &Fqid, model: &Model) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO models (fqid, data, deleted) VALUES (?1, ?2, ?3)
             ON CONFLICT(fqid) DO UPDATE SET data = excluded.data, deleted = excluded.deleted",
            params![
                fqid.to_string(),
                serde_json::to_string(&model.to_value())?,
                model.deleted,
            ],
        )?;
        Ok(())
    }

    /// Replace the whole table with the given model set.
    pub fn replace_all(conn: &Connection, models: &BTreeMap<Fqid, Model>) -> Result<()> {
        let _ = conn.execute("DELETE FROM models", [])?;
        let mut stmt =
            conn.prepare("INSERT INTO models (fqid, data, deleted) VALUES (?1, ?2, ?3)")?;
        for (fqid, model) in models {
            let _ = stmt.execute(params![
                fqid.to_string(),
                serde_json::to_string(&model.to_value())?,
                model.deleted,
            ])?;
        }
        Ok(())
    }

    /// Whether a model row exists (deleted or not).
    pub fn exists(conn: &Connection, fqid: &Fqid) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM models WHERE fqid = ?1)",
            params![fqid.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Total model count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
