//! The [`Model`] value — the replay-derived state of one fqid.
//!
//! A model is a JSON field map plus the two reserved meta fields:
//! `meta_deleted` (true iff the most recent lifecycle event was a delete)
//! and `meta_position` (the position that last touched the model). The meta
//! fields live inside the serialized JSON so snapshots stay self-describing.

use serde_json::{Map, Value};

use evolog_core::Position;

use crate::errors::{DatastoreError, Result};

/// Reserved field carrying the soft-delete flag.
pub const META_DELETED: &str = "meta_deleted";

/// Reserved field carrying the position that last touched the model.
pub const META_POSITION: &str = "meta_position";

/// The replay-derived value of an fqid at a given position.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    /// User fields (never contains the reserved meta fields).
    pub fields: Map<String, Value>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Position that last touched this model.
    pub position: Position,
}

impl Model {
    /// A fresh, live model with the given fields.
    pub fn new(fields: Map<String, Value>, position: Position) -> Self {
        Self {
            fields,
            deleted: false,
            position,
        }
    }

    /// Serialize to the canonical JSON object, meta fields included.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        let _ = map.insert(META_DELETED.to_string(), Value::Bool(self.deleted));
        let _ = map.insert(META_POSITION.to_string(), Value::from(self.position));
        Value::Object(map)
    }

    /// Parse the canonical JSON object form, splitting off the meta fields.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(DatastoreError::BadCoding(
                "model data is not a JSON object".into(),
            ));
        };
        let deleted = match map.remove(META_DELETED) {
            Some(Value::Bool(b)) => b,
            None => false,
            Some(other) => {
                return Err(DatastoreError::BadCoding(format!(
                    "meta_deleted is not a bool: {other}"
                )));
            }
        };
        let position = match map.remove(META_POSITION) {
            Some(v) => v.as_i64().ok_or_else(|| {
                DatastoreError::BadCoding(format!("meta_position is not an integer: {v}"))
            })?,
            None => 0,
        };
        Ok(Self {
            fields: map,
            deleted,
            position,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_value_includes_meta_fields() {
        let mut fields = Map::new();
        let _ = fields.insert("f".into(), json!(3));
        let model = Model::new(fields, 7);

        let value = model.to_value();
        assert_eq!(value["f"], 3);
        assert_eq!(value[META_DELETED], false);
        assert_eq!(value[META_POSITION], 7);
    }

    #[test]
    fn from_value_splits_meta_fields() {
        let model = Model::from_value(json!({
            "f": "hello",
            "meta_deleted": true,
            "meta_position": 4,
        }))
        .unwrap();

        assert_eq!(model.fields.len(), 1);
        assert_eq!(model.fields["f"], "hello");
        assert!(model.deleted);
        assert_eq!(model.position, 4);
    }

    #[test]
    fn roundtrip() {
        let mut fields = Map::new();
        let _ = fields.insert("a".into(), json!([1, 2, 3]));
        let _ = fields.insert("b".into(), json!({"nested": true}));
        let model = Model {
            fields,
            deleted: true,
            position: 12,
        };

        let back = Model::from_value(model.to_value()).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn from_value_rejects_non_object() {
        assert!(Model::from_value(json!([1, 2])).is_err());
        assert!(Model::from_value(json!("x")).is_err());
    }

    #[test]
    fn from_value_rejects_bad_meta_types() {
        assert!(Model::from_value(json!({"meta_deleted": "yes"})).is_err());
        assert!(Model::from_value(json!({"meta_position": "first"})).is_err());
    }
}
