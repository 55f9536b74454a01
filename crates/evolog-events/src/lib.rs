//! # evolog-events
//!
//! The datastore substrate of evolog: the event value model and the `SQLite`
//! backend everything else is built on.
//!
//! - **Event model**: six-kind tagged [`Event`] with wire payloads, modified
//!   fields, and the replay fold [`Event::apply`]
//! - **Models**: the [`Model`] value derived by replaying events, carrying
//!   `meta_deleted` / `meta_position`
//! - **`SQLite` backend**: `rusqlite` facade with connection pool, versioned
//!   schema, and one repository per table
//! - **Datastore facade**: transactional position writer and model reader
//!   used to seed and inspect event logs
//! - **Replay**: whole-log fold rebuilding the derived models table

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod model;
pub mod replay;
pub mod sqlite;
pub mod store;

pub use errors::{DatastoreError, Result};
pub use event::{
    ALL_EVENT_KINDS, CreateEvent, DeleteEvent, DeleteFieldsEvent, Event, EventKind,
    ListUpdateEvent, RestoreEvent, UpdateEvent,
};
pub use model::{META_DELETED, META_POSITION, Model};
pub use replay::{replay_events, replay_events_into};
pub use sqlite::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, run_migrations,
};
pub use store::{Datastore, ListFields, RequestEvent, WriteRequest, translate_request_event};
