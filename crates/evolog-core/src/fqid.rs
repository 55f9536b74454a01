//! The [`Fqid`] identifier — `"<collection>/<id>"`.
//!
//! Collections are short lowercase names (`^[a-z]([a-z_]*[a-z])?$`), ids are
//! positive integers, and the rendered identifier is bounded by
//! [`FQID_MAX_LEN`]. All constructors validate; an `Fqid` value is proof the
//! identifier is well-formed.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::InvalidFormat;

/// Maximum length of a collection name.
pub const COLLECTION_MAX_LEN: usize = 32;

/// Maximum length of a rendered fqid (`collection/id`).
pub const FQID_MAX_LEN: usize = 48;

/// Maximum length of a rendered collectionfield (`collection/field`).
pub const COLLECTIONFIELD_MAX_LEN: usize = 255;

static COLLECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z]([a-z_]*[a-z])?$").expect("static regex"));

/// A fully qualified model id: collection plus positive integer id.
///
/// Stored in split form; [`fmt::Display`] renders the canonical
/// `collection/id` text used in SQL columns and wire payloads.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fqid {
    collection: String,
    id: i64,
}

impl Fqid {
    /// Build from collection and id, validating both parts and the rendered
    /// length.
    pub fn new(collection: &str, id: i64) -> Result<Self, InvalidFormat> {
        if collection.len() > COLLECTION_MAX_LEN {
            return Err(InvalidFormat(format!(
                "collection too long: {collection}"
            )));
        }
        if !COLLECTION_RE.is_match(collection) {
            return Err(InvalidFormat(format!(
                "invalid collection name: {collection}"
            )));
        }
        if id < 1 {
            return Err(InvalidFormat(format!("id must be positive: {id}")));
        }
        let fqid = Self {
            collection: collection.to_string(),
            id,
        };
        if fqid.to_string().len() > FQID_MAX_LEN {
            return Err(InvalidFormat(format!("fqid too long: {fqid}")));
        }
        Ok(fqid)
    }

    /// The collection part.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The numeric id part (always ≥ 1).
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Fqid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for Fqid {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (collection, id) = s
            .split_once('/')
            .ok_or_else(|| InvalidFormat(format!("not an fqid: {s}")))?;
        let id: i64 = id
            .parse()
            .map_err(|_| InvalidFormat(format!("not an fqid: {s}")))?;
        Self::new(collection, id)
    }
}

impl TryFrom<String> for Fqid {
    type Error = InvalidFormat;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Fqid> for String {
    fn from(fqid: Fqid) -> Self {
        fqid.to_string()
    }
}

/// Validate a `collection/field` pair against [`COLLECTIONFIELD_MAX_LEN`].
pub fn validate_collectionfield(collection: &str, field: &str) -> Result<(), InvalidFormat> {
    let rendered = format!("{collection}/{field}");
    if rendered.len() > COLLECTIONFIELD_MAX_LEN {
        return Err(InvalidFormat(format!(
            "collectionfield too long: {rendered}"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn new_and_display() {
        let fqid = Fqid::new("user", 42).unwrap();
        assert_eq!(fqid.collection(), "user");
        assert_eq!(fqid.id(), 42);
        assert_eq!(fqid.to_string(), "user/42");
    }

    #[test]
    fn parse_roundtrip() {
        let fqid: Fqid = "meeting_user/7".parse().unwrap();
        assert_eq!(fqid.collection(), "meeting_user");
        assert_eq!(fqid.id(), 7);
    }

    #[test]
    fn rejects_bad_collection_names() {
        for name in ["", "A", "1a", "a_", "_a", "a-b", "a/b"] {
            assert_matches!(Fqid::new(name, 1), Err(InvalidFormat(_)), "name: {name}");
        }
    }

    #[test]
    fn rejects_non_positive_ids() {
        assert_matches!(Fqid::new("a", 0), Err(InvalidFormat(_)));
        assert_matches!(Fqid::new("a", -3), Err(InvalidFormat(_)));
    }

    #[test]
    fn rejects_overlong_collection() {
        let name = "a".repeat(COLLECTION_MAX_LEN + 1);
        assert_matches!(Fqid::new(&name, 1), Err(InvalidFormat(_)));
    }

    #[test]
    fn rejects_overlong_fqid() {
        // 32-char collection is legal on its own, but a long id pushes the
        // rendered fqid over FQID_MAX_LEN.
        let name = "a".repeat(COLLECTION_MAX_LEN);
        assert!(Fqid::new(&name, 999_999_999_999_999).is_ok(), "exactly 48");
        assert_matches!(
            Fqid::new(&name, 9_999_999_999_999_999),
            Err(InvalidFormat(_))
        );
        assert!(Fqid::new(&name, 1).is_ok());
    }

    #[test]
    fn rejects_malformed_strings() {
        for s in ["a", "a/", "/1", "a/x", "a/1/2", "a/-1"] {
            assert_matches!(s.parse::<Fqid>(), Err(InvalidFormat(_)), "input: {s}");
        }
    }

    #[test]
    fn serde_as_string() {
        let fqid = Fqid::new("a", 1).unwrap();
        let json = serde_json::to_string(&fqid).unwrap();
        assert_eq!(json, "\"a/1\"");
        let back: Fqid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fqid);
    }

    #[test]
    fn serde_rejects_invalid() {
        assert!(serde_json::from_str::<Fqid>("\"not-an-fqid\"").is_err());
    }

    #[test]
    fn collectionfield_length() {
        assert!(validate_collectionfield("a", "f").is_ok());
        let field = "f".repeat(COLLECTIONFIELD_MAX_LEN);
        assert_matches!(
            validate_collectionfield("a", &field),
            Err(InvalidFormat(_))
        );
    }
}
