//! Typed field values and the field map every record carries.
//!
//! Records flow through connectors, the reconciliation loop, and the
//! transformation pipeline as a [`FieldMap`]: an ordered map of string keys
//! to a closed [`FieldValue`] union. Using a `BTreeMap` keeps key order
//! deterministic, so two maps are equal exactly when their serialized JSON
//! forms are equal, which is the comparison the sync engine relies on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ordered map of field names to typed values.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single field value.
///
/// Serializes untagged, so the JSON form is the natural one
/// (`"x"`, `42`, `4.2`, `true`, `null`, arrays, objects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Nested map.
    Map(FieldMap),
}

impl FieldValue {
    /// True for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow as a string, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float. Integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as a boolean, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an array, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a nested map, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Render a scalar value as display text.
    ///
    /// Arrays and maps return `None`; callers that need those should
    /// serialize instead.
    #[must_use]
    pub fn display_text(&self) -> Option<String> {
        match self {
            Self::Null => Some(String::new()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Array(_) | Self::Map(_) => None,
        }
    }

    /// Convert a `serde_json::Value` into a typed field value.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Self::Float(n.as_f64().unwrap_or(0.0)),
                Self::Integer,
            ),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to a `serde_json::Value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        Self::Array(items)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(map: FieldMap) -> Self {
        Self::Map(map)
    }
}

/// Build a [`FieldMap`] from a JSON object.
///
/// Non-object values yield an empty map.
#[must_use]
pub fn field_map_from_json(value: serde_json::Value) -> FieldMap {
    match FieldValue::from_json(value) {
        FieldValue::Map(map) => map,
        _ => FieldMap::new(),
    }
}

/// Serialize a field map to its canonical JSON object.
#[must_use]
pub fn field_map_to_json(fields: &FieldMap) -> serde_json::Value {
    FieldValue::Map(fields.clone()).to_json()
}

/// Look up a value by dot-separated path (`"address.city"`).
///
/// A plain key without dots is a direct lookup.
#[must_use]
pub fn get_path<'a>(fields: &'a FieldMap, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

/// SHA-256 checksum of a field map's canonical JSON, hex-encoded.
///
/// Key order is stable (`BTreeMap`), so equal maps always hash equal.
#[must_use]
pub fn checksum(fields: &FieldMap) -> String {
    let canonical = serde_json::to_vec(fields).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldMap {
        field_map_from_json(serde_json::json!({
            "name": "Ada",
            "age": 36,
            "score": 9.5,
            "active": true,
            "nickname": null,
            "tags": ["math", "engine"],
            "address": {"city": "London"}
        }))
    }

    #[test]
    fn test_from_json_types() {
        let map = sample();
        assert_eq!(map.get("name").unwrap().as_str(), Some("Ada"));
        assert_eq!(map.get("age").unwrap().as_i64(), Some(36));
        assert_eq!(map.get("score").unwrap().as_f64(), Some(9.5));
        assert_eq!(map.get("active").unwrap().as_bool(), Some(true));
        assert!(map.get("nickname").unwrap().is_null());
        assert_eq!(map.get("tags").unwrap().as_array().unwrap().len(), 2);
        assert!(map.get("address").unwrap().as_map().is_some());
    }

    #[test]
    fn test_json_roundtrip() {
        let map = sample();
        let back = field_map_from_json(field_map_to_json(&map));
        assert_eq!(back, map);
    }

    #[test]
    fn test_untagged_serde() {
        let value: FieldValue = serde_json::from_str("42").unwrap();
        assert_eq!(value, FieldValue::Integer(42));

        let value: FieldValue = serde_json::from_str("4.25").unwrap();
        assert_eq!(value, FieldValue::Float(4.25));

        let value: FieldValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(value, FieldValue::String("x".into()));

        assert_eq!(serde_json::to_string(&FieldValue::Null).unwrap(), "null");
    }

    #[test]
    fn test_integer_widens_to_float() {
        assert_eq!(FieldValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Integer(3).as_i64(), Some(3));
        assert_eq!(FieldValue::Float(3.5).as_i64(), None);
    }

    #[test]
    fn test_get_path() {
        let map = sample();
        assert_eq!(
            get_path(&map, "address.city").unwrap().as_str(),
            Some("London")
        );
        assert_eq!(get_path(&map, "name").unwrap().as_str(), Some("Ada"));
        assert!(get_path(&map, "address.zip").is_none());
        assert!(get_path(&map, "missing").is_none());
    }

    #[test]
    fn test_checksum_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(checksum(&a), checksum(&b));
        assert_eq!(checksum(&a).len(), 64);

        let mut c = sample();
        c.insert("age".into(), FieldValue::Integer(37));
        assert_ne!(checksum(&a), checksum(&c));
    }
}
