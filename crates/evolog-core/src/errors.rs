//! Foundation error types shared by every evolog crate.

use thiserror::Error;

/// An identifier (fqid, collection, or collectionfield) violates its syntax
/// or exceeds its bounded length.
///
/// This is always a caller error: the offending value is embedded in the
/// message so it can be surfaced to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid format: {0}")]
pub struct InvalidFormat(pub String);

impl InvalidFormat {
    /// Build from anything displayable.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
