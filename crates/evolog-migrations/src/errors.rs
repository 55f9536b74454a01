//! Error types for the migration engine.

use thiserror::Error;

use evolog_events::DatastoreError;

/// Errors that can occur while migrating or finalizing.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Underlying datastore failure — includes lifecycle violations raised
    /// by a buggy migration step applying events through an accessor.
    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// Structural violation of the migration-index monotonicity invariants.
    /// Never retried.
    #[error("mismatching migration indices: {0}")]
    MismatchingMigrationIndices(String),

    /// The registered migration set is unusable (gap in target indices,
    /// duplicate target, index below 2).
    #[error("invalid migration setup: {0}")]
    InvalidSetup(String),

    /// Finalization was requested while positions are not fully migrated.
    #[error("cannot finalize: {0}")]
    NotFinalizable(String),
}

/// Convenience type alias for migration results.
pub type Result<T> = std::result::Result<T, MigrationError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatching_indices_display() {
        let err = MigrationError::MismatchingMigrationIndices("position 3 rises".into());
        assert_eq!(
            err.to_string(),
            "mismatching migration indices: position 3 rises"
        );
    }

    #[test]
    fn datastore_error_is_transparent() {
        let err: MigrationError = DatastoreError::ModelExists("a/1".into()).into();
        assert_eq!(err.to_string(), "model already exists: a/1");
    }

    #[test]
    fn invalid_setup_display() {
        let err = MigrationError::InvalidSetup("missing target index 3".into());
        assert_eq!(err.to_string(), "invalid migration setup: missing target index 3");
    }
}
