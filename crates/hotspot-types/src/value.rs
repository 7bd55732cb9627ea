//! Decoded message payloads.
//!
//! The viewer does not own the telemetry schema, so decoded messages are
//! carried as a map of field name to dynamically typed [`Value`]. Filter
//! bookkeeping needs totally ordered keys, which [`FilterKey`] provides
//! (floats are keyed by their bit pattern).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean field.
    Bool(bool),
    /// Signed integer field (enums are carried as integers).
    Int(i64),
    /// Floating-point field.
    Float(f64),
    /// UTF-8 text field.
    Text(String),
    /// Opaque byte field.
    Bytes(Vec<u8>),
    /// World-space position field.
    Pos3(Vec3),
}

impl Value {
    /// Numeric view of the value, used for radius and weight extraction.
    ///
    /// Booleans convert to `0.0`/`1.0`; text, bytes and positions have no
    /// numeric view.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub const fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f32),
            Self::Float(f) => Some(*f as f32),
            Self::Text(_) | Self::Bytes(_) | Self::Pos3(_) => None,
        }
    }

    /// Integer view of the value, used for enum label lookup.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Position view of the value.
    pub const fn as_pos3(&self) -> Option<Vec3> {
        match self {
            Self::Pos3(p) => Some(*p),
            _ => None,
        }
    }

    /// Totally ordered key for this value.
    pub fn filter_key(&self) -> FilterKey {
        match self {
            Self::Bool(b) => FilterKey::Bool(*b),
            Self::Int(i) => FilterKey::Int(*i),
            Self::Float(f) => FilterKey::Float(f.to_bits()),
            Self::Text(s) => FilterKey::Text(s.clone()),
            Self::Bytes(b) => FilterKey::Bytes(b.clone()),
            Self::Pos3(p) => FilterKey::Pos3([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]),
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "{} bytes", b.len()),
            Self::Pos3(p) => write!(f, "{p}"),
        }
    }
}

/// Hashable, totally ordered identity of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value, keyed by its IEEE-754 bit pattern.
    Float(u64),
    /// Text value.
    Text(String),
    /// Byte value.
    Bytes(Vec<u8>),
    /// Position value, keyed by component bit patterns.
    Pos3([u32; 3]),
}

/// A decoded telemetry message: field name to value.
///
/// Serialized transparently as the field map, which is also the binary
/// wire body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: BTreeMap<String, Value>,
}

impl Message {
    /// Create an empty message.
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_owned(), value);
        self
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(&mut self, name: String, value: Value) -> Option<Value> {
        self.fields.insert(name, value)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Iterate over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_keys_distinguish_bit_patterns() {
        let a = Value::Float(0.1).filter_key();
        let b = Value::Float(0.1).filter_key();
        let c = Value::Float(0.2).filter_key();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Int(3).as_f32().map(f32::to_bits), Some(3.0_f32.to_bits()));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert!(Value::Text("x".to_owned()).as_f32().is_none());
        assert!(Value::Pos3(Vec3::ZERO).as_pos3().is_some());
    }

    #[test]
    fn display_matches_field_kind() {
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "3 bytes");
        assert_eq!(Value::Text("rifle".to_owned()).to_string(), "rifle");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn message_serializes_as_plain_map() {
        let msg = Message::new().with("team", Value::Int(2));
        let json = serde_json::to_string(&msg).unwrap_or_default();
        assert_eq!(json, r#"{"team":{"Int":2}}"#);
    }
}
