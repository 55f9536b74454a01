//! The tagged event value model.
//!
//! Six event kinds cover every mutation of the model world. Events are plain
//! values: a migration step receives them, may rewrite them freely, and the
//! backend serializes them back into the `type` / `fqid` / `data` columns.
//!
//! The `data` column holds the kind-specific payload *without* the fqid
//! (which has its own column): a field map for create/update, a name list
//! for deletefields, `{add, remove}` maps for listupdate, and `NULL` for
//! delete/restore.

mod apply;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use evolog_core::Fqid;

use crate::errors::{DatastoreError, Result};

/// All event kind discriminators, in wire order.
pub const ALL_EVENT_KINDS: &[EventKind] = &[
    EventKind::Create,
    EventKind::Update,
    EventKind::DeleteFields,
    EventKind::ListUpdate,
    EventKind::Delete,
    EventKind::Restore,
];

/// Event kind discriminator. Serializes to the exact lowercase string stored
/// in the `type` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Model creation.
    #[serde(rename = "create")]
    Create,
    /// Field-wise merge; a null value deletes the field.
    #[serde(rename = "update")]
    Update,
    /// Unset the listed fields.
    #[serde(rename = "deletefields")]
    DeleteFields,
    /// Set-union / set-difference on array-valued fields.
    #[serde(rename = "listupdate")]
    ListUpdate,
    /// Soft-delete the model.
    #[serde(rename = "delete")]
    Delete,
    /// Reverse a soft-delete.
    #[serde(rename = "restore")]
    Restore,
}

impl EventKind {
    /// The wire string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::DeleteFields => "deletefields",
            Self::ListUpdate => "listupdate",
            Self::Delete => "delete",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "deletefields" => Ok(Self::DeleteFields),
            "listupdate" => Ok(Self::ListUpdate),
            "delete" => Ok(Self::Delete),
            "restore" => Ok(Self::Restore),
            other => Err(DatastoreError::BadCoding(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}

/// Creates a model with the given fields.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateEvent {
    /// Target model.
    pub fqid: Fqid,
    /// Initial fields.
    pub fields: Map<String, Value>,
}

/// Field-wise merge into an existing model. A null value deletes the field.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateEvent {
    /// Target model.
    pub fqid: Fqid,
    /// Fields to merge.
    pub fields: Map<String, Value>,
}

/// Unsets the listed fields of an existing model.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteFieldsEvent {
    /// Target model.
    pub fqid: Fqid,
    /// Field names to unset. Missing fields are ignored.
    pub fields: Vec<String>,
}

/// Set-union / set-difference on array-valued fields. A missing target field
/// is treated as the empty list.
#[derive(Clone, Debug, PartialEq)]
pub struct ListUpdateEvent {
    /// Target model.
    pub fqid: Fqid,
    /// Values to add, per field. Already-present values are skipped.
    pub add: BTreeMap<String, Vec<Value>>,
    /// Values to remove, per field.
    pub remove: BTreeMap<String, Vec<Value>>,
}

/// Soft-deletes a model.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteEvent {
    /// Target model.
    pub fqid: Fqid,
}

/// Reverses a soft-delete.
#[derive(Clone, Debug, PartialEq)]
pub struct RestoreEvent {
    /// Target model.
    pub fqid: Fqid,
}

/// A single event of the log, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// `create`
    Create(CreateEvent),
    /// `update`
    Update(UpdateEvent),
    /// `deletefields`
    DeleteFields(DeleteFieldsEvent),
    /// `listupdate`
    ListUpdate(ListUpdateEvent),
    /// `delete`
    Delete(DeleteEvent),
    /// `restore`
    Restore(RestoreEvent),
}

impl Event {
    /// Convenience constructor for a create event.
    pub fn create(fqid: Fqid, fields: Map<String, Value>) -> Self {
        Self::Create(CreateEvent { fqid, fields })
    }

    /// Convenience constructor for an update event.
    pub fn update(fqid: Fqid, fields: Map<String, Value>) -> Self {
        Self::Update(UpdateEvent { fqid, fields })
    }

    /// Convenience constructor for a deletefields event.
    pub fn delete_fields(fqid: Fqid, fields: Vec<String>) -> Self {
        Self::DeleteFields(DeleteFieldsEvent { fqid, fields })
    }

    /// Convenience constructor for a listupdate event.
    pub fn list_update(
        fqid: Fqid,
        add: BTreeMap<String, Vec<Value>>,
        remove: BTreeMap<String, Vec<Value>>,
    ) -> Self {
        Self::ListUpdate(ListUpdateEvent { fqid, add, remove })
    }

    /// Convenience constructor for a delete event.
    pub fn delete(fqid: Fqid) -> Self {
        Self::Delete(DeleteEvent { fqid })
    }

    /// Convenience constructor for a restore event.
    pub fn restore(fqid: Fqid) -> Self {
        Self::Restore(RestoreEvent { fqid })
    }

    /// The kind discriminator.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Create(_) => EventKind::Create,
            Self::Update(_) => EventKind::Update,
            Self::DeleteFields(_) => EventKind::DeleteFields,
            Self::ListUpdate(_) => EventKind::ListUpdate,
            Self::Delete(_) => EventKind::Delete,
            Self::Restore(_) => EventKind::Restore,
        }
    }

    /// The target model.
    pub fn fqid(&self) -> &Fqid {
        match self {
            Self::Create(e) => &e.fqid,
            Self::Update(e) => &e.fqid,
            Self::DeleteFields(e) => &e.fqid,
            Self::ListUpdate(e) => &e.fqid,
            Self::Delete(e) => &e.fqid,
            Self::Restore(e) => &e.fqid,
        }
    }

    /// Replace the target model. Used by fqid-rewriting migrations.
    pub fn set_fqid(&mut self, fqid: Fqid) {
        match self {
            Self::Create(e) => e.fqid = fqid,
            Self::Update(e) => e.fqid = fqid,
            Self::DeleteFields(e) => e.fqid = fqid,
            Self::ListUpdate(e) => e.fqid = fqid,
            Self::Delete(e) => e.fqid = fqid,
            Self::Restore(e) => e.fqid = fqid,
        }
    }

    /// The kind-specific payload for the `data` column.
    pub fn data(&self) -> Value {
        match self {
            Self::Create(e) => Value::Object(e.fields.clone()),
            Self::Update(e) => Value::Object(e.fields.clone()),
            Self::DeleteFields(e) => Value::from(e.fields.clone()),
            Self::ListUpdate(e) => {
                let to_obj = |map: &BTreeMap<String, Vec<Value>>| {
                    Value::Object(
                        map.iter()
                            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                            .collect(),
                    )
                };
                serde_json::json!({ "add": to_obj(&e.add), "remove": to_obj(&e.remove) })
            }
            Self::Delete(_) | Self::Restore(_) => Value::Null,
        }
    }

    /// Rebuild an event from its stored columns.
    pub fn from_parts(kind: EventKind, fqid: Fqid, data: Option<Value>) -> Result<Self> {
        let bad = |what: &str| {
            DatastoreError::BadCoding(format!("malformed {kind} event data: expected {what}"))
        };
        match kind {
            EventKind::Create => match data {
                Some(Value::Object(fields)) => Ok(Self::Create(CreateEvent { fqid, fields })),
                _ => Err(bad("field object")),
            },
            EventKind::Update => match data {
                Some(Value::Object(fields)) => Ok(Self::Update(UpdateEvent { fqid, fields })),
                _ => Err(bad("field object")),
            },
            EventKind::DeleteFields => match data {
                Some(Value::Array(items)) => {
                    let fields = items
                        .into_iter()
                        .map(|v| match v {
                            Value::String(s) => Ok(s),
                            _ => Err(bad("field name list")),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Self::DeleteFields(DeleteFieldsEvent { fqid, fields }))
                }
                _ => Err(bad("field name list")),
            },
            EventKind::ListUpdate => match data {
                Some(Value::Object(mut map)) => {
                    let parse = |value: Option<Value>| -> Result<BTreeMap<String, Vec<Value>>> {
                        match value {
                            None | Some(Value::Null) => Ok(BTreeMap::new()),
                            Some(Value::Object(obj)) => obj
                                .into_iter()
                                .map(|(field, v)| match v {
                                    Value::Array(items) => Ok((field, items)),
                                    _ => Err(bad("array values")),
                                })
                                .collect(),
                            Some(_) => Err(bad("add/remove objects")),
                        }
                    };
                    let add = parse(map.remove("add"))?;
                    let remove = parse(map.remove("remove"))?;
                    Ok(Self::ListUpdate(ListUpdateEvent { fqid, add, remove }))
                }
                _ => Err(bad("add/remove objects")),
            },
            EventKind::Delete => Ok(Self::Delete(DeleteEvent { fqid })),
            EventKind::Restore => Ok(Self::Restore(RestoreEvent { fqid })),
        }
    }

    /// The field names this event touches (added, overwritten, or removed).
    ///
    /// Delete and restore events name no fields and return the empty set.
    pub fn modified_fields(&self) -> BTreeSet<String> {
        match self {
            Self::Create(e) => e.fields.keys().cloned().collect(),
            Self::Update(e) => e.fields.keys().cloned().collect(),
            Self::DeleteFields(e) => e.fields.iter().cloned().collect(),
            Self::ListUpdate(e) => e.add.keys().chain(e.remove.keys()).cloned().collect(),
            Self::Delete(_) | Self::Restore(_) => BTreeSet::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fqid(s: &str) -> Fqid {
        s.parse().unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn kind_strings_roundtrip() {
        for kind in ALL_EVENT_KINDS {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!("truncate".parse::<EventKind>().is_err());
    }

    #[test]
    fn create_data_is_field_object() {
        let event = Event::create(fqid("a/1"), fields(&[("f", json!(3))]));
        assert_eq!(event.kind(), EventKind::Create);
        assert_eq!(event.data(), json!({"f": 3}));
    }

    #[test]
    fn delete_fields_data_is_name_list() {
        let event = Event::delete_fields(fqid("a/1"), vec!["f".into(), "g".into()]);
        assert_eq!(event.data(), json!(["f", "g"]));
    }

    #[test]
    fn list_update_data_shape() {
        let mut add = BTreeMap::new();
        let _ = add.insert("f".to_string(), vec![json!(3)]);
        let event = Event::list_update(fqid("a/1"), add, BTreeMap::new());
        assert_eq!(event.data(), json!({"add": {"f": [3]}, "remove": {}}));
    }

    #[test]
    fn delete_and_restore_have_null_data() {
        assert_eq!(Event::delete(fqid("a/1")).data(), Value::Null);
        assert_eq!(Event::restore(fqid("a/1")).data(), Value::Null);
    }

    #[test]
    fn from_parts_roundtrip_all_kinds() {
        let mut add = BTreeMap::new();
        let _ = add.insert("f".to_string(), vec![json!(1), json!(2)]);
        let events = vec![
            Event::create(fqid("a/1"), fields(&[("f", json!(3))])),
            Event::update(fqid("a/1"), fields(&[("f", json!(null))])),
            Event::delete_fields(fqid("a/1"), vec!["f".into()]),
            Event::list_update(fqid("a/1"), add, BTreeMap::new()),
            Event::delete(fqid("a/1")),
            Event::restore(fqid("a/1")),
        ];
        for event in events {
            let data = match event.data() {
                Value::Null => None,
                other => Some(other),
            };
            let back = Event::from_parts(event.kind(), event.fqid().clone(), data).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn from_parts_rejects_wrong_shapes() {
        assert!(Event::from_parts(EventKind::Create, fqid("a/1"), None).is_err());
        assert!(Event::from_parts(EventKind::Update, fqid("a/1"), Some(json!([1]))).is_err());
        assert!(Event::from_parts(EventKind::DeleteFields, fqid("a/1"), Some(json!({}))).is_err());
        assert!(
            Event::from_parts(EventKind::DeleteFields, fqid("a/1"), Some(json!([1]))).is_err()
        );
        assert!(
            Event::from_parts(EventKind::ListUpdate, fqid("a/1"), Some(json!({"add": [1]})))
                .is_err()
        );
    }

    #[test]
    fn list_update_from_parts_defaults_missing_maps() {
        let event =
            Event::from_parts(EventKind::ListUpdate, fqid("a/1"), Some(json!({}))).unwrap();
        let Event::ListUpdate(e) = event else {
            panic!("wrong kind");
        };
        assert!(e.add.is_empty());
        assert!(e.remove.is_empty());
    }

    #[test]
    fn set_fqid_rewrites_target() {
        let mut event = Event::delete(fqid("a/1"));
        event.set_fqid(fqid("a/2"));
        assert_eq!(event.fqid().to_string(), "a/2");
    }

    #[test]
    fn modified_fields_per_kind() {
        let event = Event::create(fqid("a/1"), fields(&[("f", json!(1)), ("g", json!(2))]));
        assert_eq!(
            event.modified_fields(),
            BTreeSet::from(["f".to_string(), "g".to_string()])
        );

        let event = Event::delete_fields(fqid("a/1"), vec!["x".into()]);
        assert_eq!(event.modified_fields(), BTreeSet::from(["x".to_string()]));

        let mut add = BTreeMap::new();
        let _ = add.insert("f".to_string(), vec![json!(1)]);
        let mut remove = BTreeMap::new();
        let _ = remove.insert("g".to_string(), vec![json!(2)]);
        let event = Event::list_update(fqid("a/1"), add, remove);
        assert_eq!(
            event.modified_fields(),
            BTreeSet::from(["f".to_string(), "g".to_string()])
        );

        assert!(Event::delete(fqid("a/1")).modified_fields().is_empty());
        assert!(Event::restore(fqid("a/1")).modified_fields().is_empty());
    }
}
