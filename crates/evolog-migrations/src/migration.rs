//! The migration step contract.
//!
//! A step declares its `target_migration_index` (≥ 2 — index 1 is the
//! origin schema) and rewrites the events of one position from index
//! `target - 1` to `target`. Most steps only implement the per-event hook
//! [`Migration::migrate_event`]; steps that must see a whole position at
//! once override [`Migration::migrate`] instead.
//!
//! Steps are pure with respect to process-external state. They may read
//! both accessors freely through the [`MigrationContext`] but never mutate
//! them directly — the default driver applies original events to the old
//! accessor and produced events to the new one.

use serde_json::Value;

use evolog_core::{MigrationIndex, Position};
use evolog_events::Event;

use crate::errors::Result;
use crate::keyframes::KeyframeAccessor;

/// Metadata of the position being migrated.
#[derive(Clone, Debug)]
pub struct PositionData {
    /// Position number.
    pub position: Position,
    /// ISO 8601 commit timestamp.
    pub timestamp: String,
    /// Id of the committing user.
    pub user_id: i64,
    /// Opaque commit information.
    pub information: Option<Value>,
}

/// Read-only view handed to the per-event hook: both accessors plus the
/// position metadata. The accessors reflect every event up to — but not
/// including — the event currently being rewritten.
pub struct MigrationContext<'a> {
    /// The model world at the step's source index.
    pub old_accessor: &'a dyn KeyframeAccessor,
    /// The model world at the step's target index.
    pub new_accessor: &'a dyn KeyframeAccessor,
    /// Metadata of the position being migrated.
    pub position: &'a PositionData,
}

/// A migration step.
pub trait Migration {
    /// The index this step migrates *to*. Must be ≥ 2.
    fn target_migration_index(&self) -> MigrationIndex;

    /// Rewrite one event.
    ///
    /// - `None` — pass the event through unchanged
    /// - `Some(vec![])` — drop the event
    /// - `Some(events)` — emit the replacements in order
    ///
    /// The default passes everything through.
    fn migrate_event(&self, event: &Event, ctx: &MigrationContext<'_>) -> Result<Option<Vec<Event>>> {
        let _ = (event, ctx);
        Ok(None)
    }

    /// Rewrite a whole position.
    ///
    /// The default iterates the events, consults
    /// [`migrate_event`](Self::migrate_event), applies each original event
    /// to the old accessor and each produced event to the new accessor in
    /// order, and returns the produced list.
    fn migrate(
        &self,
        events: &[Event],
        old_accessor: &mut dyn KeyframeAccessor,
        new_accessor: &mut dyn KeyframeAccessor,
        position: &PositionData,
    ) -> Result<Vec<Event>> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let produced = {
                let ctx = MigrationContext {
                    old_accessor: &*old_accessor,
                    new_accessor: &*new_accessor,
                    position,
                };
                self.migrate_event(event, &ctx)?
            };
            let produced = produced.unwrap_or_else(|| vec![event.clone()]);

            old_accessor.apply_event(event)?;
            for new_event in &produced {
                new_accessor.apply_event(new_event)?;
            }
            out.extend(produced);
        }
        Ok(out)
    }
}

/// Stock step renaming a field across every event kind of one collection.
pub struct RenameFieldMigration {
    /// The index this step migrates to.
    pub target_migration_index: MigrationIndex,
    /// Collection whose models carry the field.
    pub collection: String,
    /// Field name under the source schema.
    pub old_field: String,
    /// Field name under the target schema.
    pub new_field: String,
}

impl RenameFieldMigration {
    fn rename_in_map(&self, fields: &mut serde_json::Map<String, Value>) {
        if let Some(value) = fields.remove(&self.old_field) {
            let _ = fields.insert(self.new_field.clone(), value);
        }
    }
}

impl Migration for RenameFieldMigration {
    fn target_migration_index(&self) -> MigrationIndex {
        self.target_migration_index
    }

    fn migrate_event(
        &self,
        event: &Event,
        _ctx: &MigrationContext<'_>,
    ) -> Result<Option<Vec<Event>>> {
        if event.fqid().collection() != self.collection {
            return Ok(None);
        }
        let mut event = event.clone();
        match &mut event {
            Event::Create(e) => self.rename_in_map(&mut e.fields),
            Event::Update(e) => self.rename_in_map(&mut e.fields),
            Event::DeleteFields(e) => {
                for field in &mut e.fields {
                    if *field == self.old_field {
                        field.clone_from(&self.new_field);
                    }
                }
            }
            Event::ListUpdate(e) => {
                if let Some(values) = e.add.remove(&self.old_field) {
                    let _ = e.add.insert(self.new_field.clone(), values);
                }
                if let Some(values) = e.remove.remove(&self.old_field) {
                    let _ = e.remove.insert(self.new_field.clone(), values);
                }
            }
            Event::Delete(_) | Event::Restore(_) => return Ok(None),
        }
        Ok(Some(vec![event]))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
