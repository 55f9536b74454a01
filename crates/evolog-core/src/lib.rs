//! # evolog-core
//!
//! Foundation types for the evolog event-sourced datastore:
//!
//! - **[`Fqid`]**: the `collection/id` model identifier with bounded-length
//!   validation
//! - **[`Position`]**: the atomic commit counter of the event log
//! - **[`MigrationIndex`]**: the integer schema version carried by every
//!   position
//! - **[`InvalidFormat`]**: the error raised when an identifier violates its
//!   syntax or length bounds

#![deny(unsafe_code)]

pub mod errors;
pub mod fqid;

pub use errors::InvalidFormat;
pub use fqid::{
    COLLECTION_MAX_LEN, COLLECTIONFIELD_MAX_LEN, FQID_MAX_LEN, Fqid, validate_collectionfield,
};

/// Position in the event log. Positions start at 1 and increase
/// monotonically; each one identifies an atomic commit.
pub type Position = i64;

/// Integer version of the event schema. Every position carries the index it
/// was written under; index 1 is the origin schema.
pub type MigrationIndex = i64;
