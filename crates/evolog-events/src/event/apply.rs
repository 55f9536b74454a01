//! Folding events into the model world.
//!
//! [`Event::apply`] mutates a model map in place, enforcing the lifecycle
//! preconditions: create requires the target to be absent or soft-deleted,
//! update/deletefields/listupdate require a live target, restore requires a
//! soft-deleted target. Violations indicate a buggy migration step and are
//! surfaced with the offending fqid.

use std::collections::BTreeMap;

use serde_json::Value;

use evolog_core::{Fqid, Position};

use crate::errors::{DatastoreError, Result};
use crate::model::Model;

use super::Event;

impl Event {
    /// Apply this event to `models`, stamping touched models with `position`.
    pub fn apply(&self, models: &mut BTreeMap<Fqid, Model>, position: Position) -> Result<()> {
        match self {
            Self::Create(e) => {
                if models.get(&e.fqid).is_some_and(|m| !m.deleted) {
                    return Err(DatastoreError::ModelExists(e.fqid.to_string()));
                }
                let _ = models.insert(e.fqid.clone(), Model::new(e.fields.clone(), position));
            }
            Self::Update(e) => {
                let model = live_model(models, &e.fqid)?;
                for (field, value) in &e.fields {
                    if value.is_null() {
                        let _ = model.fields.remove(field);
                    } else {
                        let _ = model.fields.insert(field.clone(), value.clone());
                    }
                }
                model.position = position;
            }
            Self::DeleteFields(e) => {
                let model = live_model(models, &e.fqid)?;
                for field in &e.fields {
                    let _ = model.fields.remove(field);
                }
                model.position = position;
            }
            Self::ListUpdate(e) => {
                let model = live_model(models, &e.fqid)?;
                for (field, values) in &e.add {
                    let list = list_field(model, field)?;
                    for value in values {
                        if !list.contains(value) {
                            list.push(value.clone());
                        }
                    }
                }
                for (field, values) in &e.remove {
                    if model.fields.contains_key(field) {
                        let list = list_field(model, field)?;
                        list.retain(|v| !values.contains(v));
                    }
                }
                model.position = position;
            }
            Self::Delete(e) => {
                let model = live_model(models, &e.fqid)?;
                model.deleted = true;
                model.position = position;
            }
            Self::Restore(e) => {
                let model = models
                    .get_mut(&e.fqid)
                    .ok_or_else(|| DatastoreError::ModelDoesNotExist(e.fqid.to_string()))?;
                if !model.deleted {
                    return Err(DatastoreError::ModelNotDeleted(e.fqid.to_string()));
                }
                model.deleted = false;
                model.position = position;
            }
        }
        Ok(())
    }
}

/// Fetch a model that must exist and must not be soft-deleted.
fn live_model<'a>(
    models: &'a mut BTreeMap<Fqid, Model>,
    fqid: &Fqid,
) -> Result<&'a mut Model> {
    match models.get_mut(fqid) {
        Some(model) if !model.deleted => Ok(model),
        _ => Err(DatastoreError::ModelDoesNotExist(fqid.to_string())),
    }
}

/// Fetch a field as a mutable array, materializing an empty one if absent.
fn list_field<'a>(model: &'a mut Model, field: &str) -> Result<&'a mut Vec<Value>> {
    let entry = model
        .fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    entry.as_array_mut().ok_or_else(|| {
        DatastoreError::BadCoding(format!("list update on non-array field: {field}"))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::{Map, json};

    fn fqid(s: &str) -> Fqid {
        s.parse().unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn world() -> BTreeMap<Fqid, Model> {
        BTreeMap::new()
    }

    #[test]
    fn create_inserts_live_model() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!(3))]))
            .apply(&mut models, 1)
            .unwrap();

        let model = &models[&fqid("a/1")];
        assert_eq!(model.fields["f"], 3);
        assert!(!model.deleted);
        assert_eq!(model.position, 1);
    }

    #[test]
    fn create_over_live_model_fails() {
        let mut models = world();
        Event::create(fqid("a/1"), Map::new())
            .apply(&mut models, 1)
            .unwrap();
        let err = Event::create(fqid("a/1"), Map::new())
            .apply(&mut models, 2)
            .unwrap_err();
        assert_matches!(err, DatastoreError::ModelExists(f) if f == "a/1");
    }

    #[test]
    fn create_over_soft_deleted_model_replaces_it() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!(1))]))
            .apply(&mut models, 1)
            .unwrap();
        Event::delete(fqid("a/1")).apply(&mut models, 2).unwrap();
        Event::create(fqid("a/1"), fields(&[("g", json!(2))]))
            .apply(&mut models, 3)
            .unwrap();

        let model = &models[&fqid("a/1")];
        assert!(!model.deleted);
        assert!(!model.fields.contains_key("f"));
        assert_eq!(model.fields["g"], 2);
        assert_eq!(model.position, 3);
    }

    #[test]
    fn update_merges_and_null_deletes() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!(1)), ("g", json!(2))]))
            .apply(&mut models, 1)
            .unwrap();
        Event::update(fqid("a/1"), fields(&[("f", json!(null)), ("h", json!(3))]))
            .apply(&mut models, 2)
            .unwrap();

        let model = &models[&fqid("a/1")];
        assert!(!model.fields.contains_key("f"));
        assert_eq!(model.fields["g"], 2);
        assert_eq!(model.fields["h"], 3);
        assert_eq!(model.position, 2);
    }

    #[test]
    fn update_missing_model_fails() {
        let mut models = world();
        let err = Event::update(fqid("a/1"), Map::new())
            .apply(&mut models, 1)
            .unwrap_err();
        assert_matches!(err, DatastoreError::ModelDoesNotExist(_));
    }

    #[test]
    fn update_soft_deleted_model_fails() {
        let mut models = world();
        Event::create(fqid("a/1"), Map::new())
            .apply(&mut models, 1)
            .unwrap();
        Event::delete(fqid("a/1")).apply(&mut models, 2).unwrap();
        let err = Event::update(fqid("a/1"), Map::new())
            .apply(&mut models, 3)
            .unwrap_err();
        assert_matches!(err, DatastoreError::ModelDoesNotExist(_));
    }

    #[test]
    fn delete_fields_ignores_missing_fields() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!(1))]))
            .apply(&mut models, 1)
            .unwrap();
        Event::delete_fields(fqid("a/1"), vec!["f".into(), "missing".into()])
            .apply(&mut models, 2)
            .unwrap();

        let model = &models[&fqid("a/1")];
        assert!(model.fields.is_empty());
        assert_eq!(model.position, 2);
    }

    #[test]
    fn list_update_unions_and_differences() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!([1, 2]))]))
            .apply(&mut models, 1)
            .unwrap();

        let mut add = BTreeMap::new();
        let _ = add.insert("f".to_string(), vec![json!(2), json!(3)]);
        let _ = add.insert("g".to_string(), vec![json!(9)]);
        let mut remove = BTreeMap::new();
        let _ = remove.insert("f".to_string(), vec![json!(1)]);
        let _ = remove.insert("missing".to_string(), vec![json!(0)]);
        Event::list_update(fqid("a/1"), add, remove)
            .apply(&mut models, 2)
            .unwrap();

        let model = &models[&fqid("a/1")];
        assert_eq!(model.fields["f"], json!([2, 3]));
        assert_eq!(model.fields["g"], json!([9]));
        assert!(!model.fields.contains_key("missing"));
    }

    #[test]
    fn list_update_on_non_array_field_fails() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!("scalar"))]))
            .apply(&mut models, 1)
            .unwrap();

        let mut add = BTreeMap::new();
        let _ = add.insert("f".to_string(), vec![json!(1)]);
        let err = Event::list_update(fqid("a/1"), add, BTreeMap::new())
            .apply(&mut models, 2)
            .unwrap_err();
        assert_matches!(err, DatastoreError::BadCoding(_));
    }

    #[test]
    fn delete_then_restore_lifecycle() {
        let mut models = world();
        Event::create(fqid("a/1"), fields(&[("f", json!(1))]))
            .apply(&mut models, 1)
            .unwrap();
        Event::delete(fqid("a/1")).apply(&mut models, 2).unwrap();
        assert!(models[&fqid("a/1")].deleted);
        assert_eq!(models[&fqid("a/1")].position, 2);

        Event::restore(fqid("a/1")).apply(&mut models, 3).unwrap();
        let model = &models[&fqid("a/1")];
        assert!(!model.deleted);
        assert_eq!(model.fields["f"], 1);
        assert_eq!(model.position, 3);
    }

    #[test]
    fn delete_missing_or_deleted_model_fails() {
        let mut models = world();
        assert_matches!(
            Event::delete(fqid("a/1")).apply(&mut models, 1),
            Err(DatastoreError::ModelDoesNotExist(_))
        );

        Event::create(fqid("a/1"), Map::new())
            .apply(&mut models, 1)
            .unwrap();
        Event::delete(fqid("a/1")).apply(&mut models, 2).unwrap();
        assert_matches!(
            Event::delete(fqid("a/1")).apply(&mut models, 3),
            Err(DatastoreError::ModelDoesNotExist(_))
        );
    }

    #[test]
    fn restore_live_model_fails() {
        let mut models = world();
        Event::create(fqid("a/1"), Map::new())
            .apply(&mut models, 1)
            .unwrap();
        assert_matches!(
            Event::restore(fqid("a/1")).apply(&mut models, 2),
            Err(DatastoreError::ModelNotDeleted(f)) if f == "a/1"
        );
    }

    #[test]
    fn restore_missing_model_fails() {
        let mut models = world();
        assert_matches!(
            Event::restore(fqid("a/1")).apply(&mut models, 1),
            Err(DatastoreError::ModelDoesNotExist(_))
        );
    }

    proptest! {
        // Delete followed by restore must preserve the field map exactly.
        #[test]
        fn delete_restore_preserves_fields(
            values in proptest::collection::btree_map("[a-z]{1,8}", -1000i64..1000, 0..8)
        ) {
            let mut fields = Map::new();
            for (k, v) in &values {
                let _ = fields.insert(k.clone(), json!(v));
            }
            let mut models = world();
            Event::create(fqid("a/1"), fields.clone()).apply(&mut models, 1).unwrap();
            Event::delete(fqid("a/1")).apply(&mut models, 2).unwrap();
            Event::restore(fqid("a/1")).apply(&mut models, 3).unwrap();

            let model = &models[&fqid("a/1")];
            prop_assert_eq!(&model.fields, &fields);
            prop_assert!(!model.deleted);
        }

        // Adding values twice is idempotent on the resulting list.
        #[test]
        fn list_add_is_idempotent(values in proptest::collection::vec(-100i64..100, 0..8)) {
            let mut models = world();
            Event::create(fqid("a/1"), Map::new()).apply(&mut models, 1).unwrap();

            let mut add = BTreeMap::new();
            let _ = add.insert("f".to_string(), values.iter().map(|v| json!(v)).collect::<Vec<_>>());
            let event = Event::list_update(fqid("a/1"), add, BTreeMap::new());
            event.apply(&mut models, 2).unwrap();
            let first = models[&fqid("a/1")].fields["f"].clone();
            event.apply(&mut models, 3).unwrap();
            prop_assert_eq!(&models[&fqid("a/1")].fields["f"], &first);
        }
    }
}
