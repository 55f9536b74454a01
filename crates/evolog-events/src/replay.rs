//! Replaying event rows into the model world.
//!
//! The fold is the ground truth of the datastore: the derived `models` table
//! and every keyframe must equal the result of replaying the corresponding
//! event slice in `(position, weight)` order.

use std::collections::BTreeMap;

use evolog_core::Fqid;

use crate::errors::Result;
use crate::model::Model;
use crate::sqlite::row_types::EventRow;

/// Fold ordered event rows into a model map, starting from `models`.
pub fn replay_events_into(
    models: &mut BTreeMap<Fqid, Model>,
    rows: &[EventRow],
) -> Result<()> {
    for row in rows {
        let event = row.to_event()?;
        event.apply(models, row.position)?;
    }
    Ok(())
}

/// Fold ordered event rows into a fresh model map.
pub fn replay_events(rows: &[EventRow]) -> Result<BTreeMap<Fqid, Model>> {
    let mut models = BTreeMap::new();
    replay_events_into(&mut models, rows)?;
    Ok(models)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
