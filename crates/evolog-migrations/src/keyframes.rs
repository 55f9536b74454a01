//! Keyframe accessors — the model-world views presented to migration steps.
//!
//! An accessor is bound to `(last_position, migration_index,
//! current_position)`: it exposes every model as of `last_position` under
//! `migration_index`, accumulates events of `current_position` in memory,
//! and commits the accumulated view as the keyframe at `(current_position,
//! migration_index)` when the migrator advances it.
//!
//! Two flavors share the [`KeyframeAccessor`] interface:
//!
//! - [`InitialKeyframeAccessor`] — only valid for `last_position == 0`
//!   (nothing has ever been migrated); starts from an empty model world.
//! - [`DatabaseKeyframeAccessor`] — starts from the persisted keyframe at
//!   `(last_position, migration_index)`, reconstructing and persisting it
//!   from the nearest earlier keyframe if it is missing.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::debug;

use evolog_core::{Fqid, MigrationIndex, Position};
use evolog_events::sqlite::repositories::{
    EventRepo, KeyframeRepo, MigrationPositionRepo, PositionRepo, StagingEventRepo,
};
use evolog_events::{Event, Model, replay_events_into};

use crate::errors::Result;

/// Read/apply interface over the model world at a specific
/// `(last_position, migration_index, current_position)`.
pub trait KeyframeAccessor {
    /// The model, or `None` if it never existed at this view.
    fn get_model(&self, fqid: &Fqid) -> Option<&Model>;

    /// All models of the view, soft-deleted ones included.
    fn get_all_models(&self) -> &BTreeMap<Fqid, Model>;

    /// Fold one event of the current position into the in-memory view.
    fn apply_event(&mut self, event: &Event) -> Result<()>;

    /// Commit the accumulated view as the keyframe at `(current_position,
    /// migration_index)` (if this accessor persists) and advance
    /// `last_position` to `current_position`.
    fn move_to_next_position(&mut self, conn: &Connection) -> Result<()>;
}

/// State shared by both accessor flavors.
struct AccessorState {
    models: BTreeMap<Fqid, Model>,
    migration_index: MigrationIndex,
    last_position: Position,
    current_position: Position,
    persist: bool,
}

impl AccessorState {
    fn apply_event(&mut self, event: &Event) -> Result<()> {
        event.apply(&mut self.models, self.current_position)?;
        Ok(())
    }

    fn move_to_next_position(&mut self, conn: &Connection) -> Result<()> {
        if self.persist {
            KeyframeRepo::replace(conn, self.current_position, self.migration_index, &self.models)?;
        }
        self.last_position = self.current_position;
        Ok(())
    }
}

/// Accessor for the very first migrated position (`last_position == 0`).
pub struct InitialKeyframeAccessor {
    state: AccessorState,
}

impl InitialKeyframeAccessor {
    /// Create an accessor over the empty model world.
    pub fn new(
        migration_index: MigrationIndex,
        current_position: Position,
        persist: bool,
    ) -> Self {
        Self {
            state: AccessorState {
                models: BTreeMap::new(),
                migration_index,
                last_position: 0,
                current_position,
                persist,
            },
        }
    }
}

impl KeyframeAccessor for InitialKeyframeAccessor {
    fn get_model(&self, fqid: &Fqid) -> Option<&Model> {
        self.state.models.get(fqid)
    }

    fn get_all_models(&self) -> &BTreeMap<Fqid, Model> {
        &self.state.models
    }

    fn apply_event(&mut self, event: &Event) -> Result<()> {
        self.state.apply_event(event)
    }

    fn move_to_next_position(&mut self, conn: &Connection) -> Result<()> {
        self.state.move_to_next_position(conn)
    }
}

/// Accessor backed by persisted keyframes.
pub struct DatabaseKeyframeAccessor {
    state: AccessorState,
}

impl DatabaseKeyframeAccessor {
    /// Create an accessor whose starting model set is the keyframe at
    /// `(last_position, migration_index)`.
    ///
    /// If that keyframe is missing it is reconstructed by replaying forward
    /// from the nearest earlier keyframe at the same index — using staged
    /// events where a position has already been migrated and live events
    /// otherwise — and the reconstruction is persisted for the next reader.
    pub fn new(
        conn: &Connection,
        last_position: Position,
        migration_index: MigrationIndex,
        current_position: Position,
        persist: bool,
    ) -> Result<Self> {
        let models = match KeyframeRepo::get(conn, last_position, migration_index)? {
            Some(models) => models,
            None => Self::reconstruct(conn, last_position, migration_index)?,
        };
        Ok(Self {
            state: AccessorState {
                models,
                migration_index,
                last_position,
                current_position,
                persist,
            },
        })
    }

    fn reconstruct(
        conn: &Connection,
        last_position: Position,
        migration_index: MigrationIndex,
    ) -> Result<BTreeMap<Fqid, Model>> {
        let (start, mut models) =
            match KeyframeRepo::latest_at_or_before(conn, last_position, migration_index)? {
                Some((position, models)) => (position, models),
                None => (0, BTreeMap::new()),
            };
        debug!(
            last_position,
            migration_index, from = start, "reconstructing keyframe"
        );

        for position in PositionRepo::get_from(conn, start + 1)?
            .into_iter()
            .take_while(|row| row.position <= last_position)
        {
            let rows = if MigrationPositionRepo::get(conn, position.position)?.is_some() {
                StagingEventRepo::get_by_position(conn, position.position)?
            } else {
                EventRepo::get_by_position(conn, position.position)?
            };
            replay_events_into(&mut models, &rows)?;
        }

        KeyframeRepo::replace(conn, last_position, migration_index, &models)?;
        Ok(models)
    }
}

impl KeyframeAccessor for DatabaseKeyframeAccessor {
    fn get_model(&self, fqid: &Fqid) -> Option<&Model> {
        self.state.models.get(fqid)
    }

    fn get_all_models(&self) -> &BTreeMap<Fqid, Model> {
        &self.state.models
    }

    fn apply_event(&mut self, event: &Event) -> Result<()> {
        self.state.apply_event(event)
    }

    fn move_to_next_position(&mut self, conn: &Connection) -> Result<()> {
        self.state.move_to_next_position(conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
