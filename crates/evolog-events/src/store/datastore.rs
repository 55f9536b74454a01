//! Transactional [`Datastore`] facade — the minimal writer and reader.
//!
//! The production write pipeline (locking, id reservation, notification)
//! lives outside this repository; this facade covers what the migration
//! engine and its operators actually need: seeding positions atomically,
//! keeping the derived `models` table in step, and reading models back.
//!
//! Every write runs in a single transaction — callers never observe partial
//! positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use evolog_core::{Fqid, Position, validate_collectionfield};

use crate::errors::{DatastoreError, Result};
use crate::event::Event;
use crate::model::Model;
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::event::EventRepo;
use crate::sqlite::repositories::model::ModelRepo;
use crate::sqlite::repositories::position::PositionRepo;
use crate::sqlite::row_types::PositionRow;

/// Nested list mutations of an update request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFields {
    /// Values to add, per field.
    #[serde(default)]
    pub add: BTreeMap<String, Vec<Value>>,
    /// Values to remove, per field.
    #[serde(default)]
    pub remove: BTreeMap<String, Vec<Value>>,
}

impl ListFields {
    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// A request event, as accepted on the wire.
///
/// The shapes match the JSON wire payloads exactly; an `update` carrying
/// both `fields` and `list_fields` is stored as two separate events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestEvent {
    /// Create a model.
    Create {
        /// Target model.
        fqid: Fqid,
        /// Initial fields.
        fields: Map<String, Value>,
    },
    /// Merge fields and/or mutate list fields.
    Update {
        /// Target model.
        fqid: Fqid,
        /// Fields to merge (null deletes).
        #[serde(default)]
        fields: Map<String, Value>,
        /// Optional list mutations.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list_fields: Option<ListFields>,
    },
    /// Unset fields.
    DeleteFields {
        /// Target model.
        fqid: Fqid,
        /// Field names to unset.
        fields: Vec<String>,
    },
    /// Mutate list fields.
    ListUpdate {
        /// Target model.
        fqid: Fqid,
        /// Values to add, per field.
        #[serde(default)]
        add: BTreeMap<String, Vec<Value>>,
        /// Values to remove, per field.
        #[serde(default)]
        remove: BTreeMap<String, Vec<Value>>,
    },
    /// Soft-delete a model.
    Delete {
        /// Target model.
        fqid: Fqid,
    },
    /// Reverse a soft-delete.
    Restore {
        /// Target model.
        fqid: Fqid,
    },
}

/// Translate a request event into the stored events it becomes.
///
/// An update with both `fields` and `list_fields` splits into an update
/// event followed by a listupdate event; a request that mutates nothing is
/// a [`DatastoreError::BadCoding`].
pub fn translate_request_event(request: RequestEvent) -> Result<Vec<Event>> {
    match request {
        RequestEvent::Create { fqid, fields } => Ok(vec![Event::create(fqid, fields)]),
        RequestEvent::Update {
            fqid,
            fields,
            list_fields,
        } => {
            let list_fields = list_fields.unwrap_or_default();
            let mut events = Vec::new();
            if !fields.is_empty() {
                events.push(Event::update(fqid.clone(), fields));
            }
            if !list_fields.is_empty() {
                events.push(Event::list_update(fqid, list_fields.add, list_fields.remove));
            }
            if events.is_empty() {
                return Err(DatastoreError::BadCoding(
                    "update request mutates nothing".into(),
                ));
            }
            Ok(events)
        }
        RequestEvent::DeleteFields { fqid, fields } => {
            Ok(vec![Event::delete_fields(fqid, fields)])
        }
        RequestEvent::ListUpdate { fqid, add, remove } => {
            Ok(vec![Event::list_update(fqid, add, remove)])
        }
        RequestEvent::Delete { fqid } => Ok(vec![Event::delete(fqid)]),
        RequestEvent::Restore { fqid } => Ok(vec![Event::restore(fqid)]),
    }
}

/// One atomic write: a set of request events committed as a single position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Id of the committing user.
    pub user_id: i64,
    /// Opaque commit information.
    #[serde(default)]
    pub information: Option<Value>,
    /// Events to commit, in order.
    pub events: Vec<RequestEvent>,
}

/// High-level datastore facade wrapping a connection pool.
pub struct Datastore {
    pool: ConnectionPool,
}

impl Datastore {
    /// Create a new facade over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Commit a write request as the next position.
    ///
    /// The new position carries the datastore's current minimum migration
    /// index (1 for an empty log), so the non-increasing index invariant
    /// holds without coordination. Returns the committed position.
    pub fn write(&self, request: &WriteRequest) -> Result<Position> {
        if request.events.is_empty() {
            return Err(DatastoreError::BadCoding(
                "write request contains no events".into(),
            ));
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let position = PositionRepo::max_position(&tx)?.unwrap_or(0) + 1;
        let migration_index = PositionRepo::min_migration_index(&tx)?.unwrap_or(1);
        let information = request
            .information
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        PositionRepo::insert(
            &tx,
            &PositionRow {
                position,
                migration_index,
                timestamp: chrono::Utc::now().to_rfc3339(),
                user_id: request.user_id,
                information,
            },
        )?;

        let mut touched: BTreeMap<Fqid, Model> = BTreeMap::new();
        let mut weight: i64 = 0;
        for request_event in request.events.iter().cloned() {
            for event in translate_request_event(request_event)? {
                for field in event.modified_fields() {
                    validate_collectionfield(event.fqid().collection(), &field)?;
                }

                weight += 1;
                let _ = EventRepo::insert(&tx, position, &event, weight)?;

                // Keep the derived models table in step.
                if !touched.contains_key(event.fqid()) {
                    if let Some(model) = ModelRepo::get(&tx, event.fqid())? {
                        let _ = touched.insert(event.fqid().clone(), model);
                    }
                }
                event.apply(&mut touched, position)?;
                if let Some(model) = touched.get(event.fqid()) {
                    ModelRepo::upsert(&tx, event.fqid(), model)?;
                }
            }
        }

        tx.commit()?;
        tracing::debug!(position, events = weight, "write committed");
        Ok(position)
    }

    /// Read one model from the derived table.
    pub fn get_model(&self, fqid: &Fqid) -> Result<Option<Model>> {
        ModelRepo::get(&*self.conn()?, fqid)
    }

    /// Whether a model row exists (deleted or not).
    pub fn model_exists(&self, fqid: &Fqid) -> Result<bool> {
        ModelRepo::exists(&*self.conn()?, fqid)
    }

    /// Highest committed position, if any.
    pub fn max_position(&self) -> Result<Option<Position>> {
        PositionRepo::max_position(&*self.conn()?)
    }

    /// Delete everything — log, staging, checkpoints, keyframes, models.
    pub fn truncate(&self) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM events;
             DELETE FROM migration_events;
             DELETE FROM migration_positions;
             DELETE FROM migration_keyframes;
             DELETE FROM models;
             DELETE FROM positions;",
        )?;
        tx.commit()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
