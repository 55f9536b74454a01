//! Database row types mapping `SQLite` rows to Rust structs.
//!
//! These represent the raw row shape, not the public API types. Conversion
//! to [`Event`] values happens via [`EventRow::to_event`].

use serde_json::Value;

use evolog_core::{MigrationIndex, Position};

use crate::errors::Result;
use crate::event::Event;

/// Raw row of the `positions` table.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRow {
    /// Position number.
    pub position: Position,
    /// Migration index the position was written under.
    pub migration_index: MigrationIndex,
    /// ISO 8601 timestamp of the commit.
    pub timestamp: String,
    /// Id of the committing user.
    pub user_id: i64,
    /// Opaque commit information (JSON text).
    pub information: Option<String>,
}

/// Raw row of the `events` / `migration_events` tables.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRow {
    /// Row id.
    pub id: i64,
    /// Owning position.
    pub position: Position,
    /// Target fqid text.
    pub fqid: String,
    /// Kind discriminator string.
    pub event_type: String,
    /// Kind-specific payload (JSON text, NULL for delete/restore).
    pub data: Option<String>,
    /// 1-based order within the position.
    pub weight: i64,
}

impl EventRow {
    /// Parse the row back into an [`Event`] value.
    pub fn to_event(&self) -> Result<Event> {
        let kind = self.event_type.parse()?;
        let fqid: evolog_core::Fqid = self.fqid.parse()?;
        let data = self
            .data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;
        Event::from_parts(kind, fqid, data)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn row(event_type: &str, data: Option<&str>) -> EventRow {
        EventRow {
            id: 1,
            position: 1,
            fqid: "a/1".into(),
            event_type: event_type.into(),
            data: data.map(String::from),
            weight: 1,
        }
    }

    #[test]
    fn to_event_create() {
        let event = row("create", Some(r#"{"f": 3}"#)).to_event().unwrap();
        assert_eq!(event.kind(), EventKind::Create);
        assert_eq!(event.fqid().to_string(), "a/1");
    }

    #[test]
    fn to_event_delete_without_data() {
        let event = row("delete", None).to_event().unwrap();
        assert_eq!(event.kind(), EventKind::Delete);
    }

    #[test]
    fn to_event_rejects_unknown_type() {
        assert!(row("explode", None).to_event().is_err());
    }

    #[test]
    fn to_event_rejects_bad_fqid() {
        let mut bad = row("delete", None);
        bad.fqid = "nonsense".into();
        assert!(bad.to_event().is_err());
    }

    #[test]
    fn to_event_rejects_bad_json() {
        assert!(row("create", Some("not json")).to_event().is_err());
    }
}
