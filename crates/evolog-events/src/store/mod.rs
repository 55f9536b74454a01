//! High-level datastore facade.

pub mod datastore;

pub use datastore::{Datastore, ListFields, RequestEvent, WriteRequest, translate_request_event};
