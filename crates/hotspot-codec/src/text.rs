//! Schema-guided JSON conversion.
//!
//! Text payloads are JSON objects. Declared fields are converted according
//! to their [`FieldKind`]; members the schema does not declare are ignored
//! and `null` members are treated as absent. Positions are objects with
//! `x`, `y` and `z` members, any of which may be omitted (reads as zero).
//! Integers may also arrive as decimal strings, and bytes as an array of
//! numbers.

use hotspot_types::{FieldDef, FieldKind, Message, SchemaDef, Value, Vec3};
use serde_json::{Map, Number};

use crate::error::CodecError;

/// Decode a JSON payload.
///
/// # Errors
///
/// Returns [`CodecError::Text`] for invalid JSON, [`CodecError::NotAnObject`]
/// if the root is not an object, or [`CodecError::FieldKind`] if a declared
/// member has the wrong shape.
pub fn decode_text(schema: &SchemaDef, payload: &[u8]) -> Result<Message, CodecError> {
    let root: serde_json::Value = serde_json::from_slice(payload)?;
    let object = root.as_object().ok_or(CodecError::NotAnObject)?;

    let mut message = Message::new();
    for field in &schema.fields {
        match object.get(&field.name) {
            None | Some(serde_json::Value::Null) => {}
            Some(raw) => {
                let value = convert(field, raw).ok_or_else(|| CodecError::FieldKind {
                    field: field.name.clone(),
                    expected: field.kind,
                })?;
                message.insert(field.name.clone(), value);
            }
        }
    }
    Ok(message)
}

/// Encode every field of a message as a JSON object.
///
/// # Errors
///
/// Returns [`CodecError::Text`] if serialization fails.
pub fn encode_text(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut object = Map::new();
    for (name, value) in message.fields() {
        object.insert(name.to_owned(), to_json(value));
    }
    Ok(serde_json::to_vec(&serde_json::Value::Object(object))?)
}

fn convert(field: &FieldDef, raw: &serde_json::Value) -> Option<Value> {
    match field.kind {
        FieldKind::Bool => raw.as_bool().map(Value::Bool),
        FieldKind::Int => raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .map(Value::Int),
        FieldKind::Float => raw.as_f64().map(Value::Float),
        FieldKind::Text => raw.as_str().map(|s| Value::Text(s.to_owned())),
        FieldKind::Bytes => raw
            .as_array()?
            .iter()
            .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Value::Bytes),
        FieldKind::Pos3 => {
            let obj = raw.as_object()?;
            Some(Value::Pos3(Vec3::new(
                component(obj, "x")?,
                component(obj, "y")?,
                component(obj, "z")?,
            )))
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn component(obj: &Map<String, serde_json::Value>, name: &str) -> Option<f32> {
    match obj.get(name) {
        None | Some(serde_json::Value::Null) => Some(0.0),
        Some(v) => v.as_f64().map(|f| f as f32),
    }
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => float(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::Array(
            b.iter()
                .map(|n| serde_json::Value::Number(Number::from(*n)))
                .collect(),
        ),
        Value::Pos3(p) => {
            let mut obj = Map::new();
            obj.insert("x".to_owned(), float(f64::from(p.x)));
            obj.insert("y".to_owned(), float(f64::from(p.y)));
            obj.insert("z".to_owned(), float(f64::from(p.z)));
            serde_json::Value::Object(obj)
        }
    }
}

fn float(f: f64) -> serde_json::Value {
    Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hotspot_types::{Compression, Encoding, EnumStyle, SchemaRole, StorageKind};

    fn schema() -> SchemaDef {
        let field = |name: &str, kind| FieldDef {
            name: name.to_owned(),
            kind,
            tracked: false,
            enum_key: None,
            enum_style: EnumStyle::Single,
        };
        SchemaDef {
            name: "PlayerDamaged".to_owned(),
            role: SchemaRole::Event,
            encoding: Encoding::Text,
            compression: Compression::None,
            storage: StorageKind::None,
            fields: vec![
                field("position", FieldKind::Pos3),
                field("weapon", FieldKind::Int),
                field("name", FieldKind::Text),
                field("blob", FieldKind::Bytes),
                field("alive", FieldKind::Bool),
            ],
            point_events: Vec::new(),
        }
    }

    #[test]
    fn decodes_declared_members_only() {
        let payload = br#"{"position":{"x":1,"z":3},"weapon":"7","name":"bob","extra":1}"#;
        let msg = decode_text(&schema(), payload).unwrap();
        assert_eq!(msg.len(), 3);
        let pos = msg.get("position").and_then(Value::as_pos3).unwrap();
        assert_eq!(pos.y.to_bits(), 0.0_f32.to_bits());
        assert_eq!(pos.z.to_bits(), 3.0_f32.to_bits());
        assert_eq!(msg.get("weapon"), Some(&Value::Int(7)));
        assert!(msg.get("extra").is_none());
    }

    #[test]
    fn null_member_is_absent() {
        let msg = decode_text(&schema(), br#"{"name":null}"#).unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn wrong_shape_is_a_field_error() {
        let err = decode_text(&schema(), br#"{"alive":"yes"}"#).unwrap_err();
        assert!(matches!(err, CodecError::FieldKind { field, .. } if field == "alive"));
    }

    #[test]
    fn bytes_outside_u8_rejected() {
        assert!(decode_text(&schema(), br#"{"blob":[1,2,300]}"#).is_err());
    }

    #[test]
    fn non_object_root_rejected() {
        assert!(matches!(
            decode_text(&schema(), b"[1,2]"),
            Err(CodecError::NotAnObject)
        ));
    }

    #[test]
    fn encode_then_decode_keeps_bytes_and_flags() {
        let msg = Message::new()
            .with("blob", Value::Bytes(vec![0, 255]))
            .with("alive", Value::Bool(true));
        let bytes = encode_text(&msg).unwrap();
        assert_eq!(decode_text(&schema(), &bytes).unwrap(), msg);
    }
}
