//! Telemetry payload decoding for the Hotspot viewer.
//!
//! Each schema declares a static encoding flag. Text payloads are JSON
//! objects converted field by field using the declared kinds; binary
//! payloads are a bincode field map, optionally wrapped in a compression
//! envelope carrying the uncompressed size.
//!
//! Decoding is pure and reentrant: the ingestion task calls [`decode`] from
//! whatever thread the transport delivers on.
//!
//! # Modules
//!
//! - [`binary`] -- Binary bodies and the compression envelope
//! - [`text`] -- Schema-guided JSON conversion
//! - [`labels`] -- Enum tables and display labels for filter values
//! - [`error`] -- [`CodecError`]

pub mod binary;
pub mod error;
pub mod labels;
pub mod text;

use hotspot_types::{Encoding, Message, SchemaDef, Value};
use serde::de::DeserializeOwned;

pub use error::CodecError;
pub use labels::{EnumDef, EnumTable, EnumValue};

/// Decode a payload into a [`Message`] using the schema's encoding.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed, truncated or mistyped payloads.
pub fn decode(schema: &SchemaDef, payload: &[u8]) -> Result<Message, CodecError> {
    let message = match schema.encoding {
        Encoding::Text => text::decode_text(schema, payload)?,
        Encoding::Binary => {
            let body = binary::open(schema.compression, payload)?;
            binary::decode_body(&body)?
        }
    };
    check_kinds(schema, &message)?;
    Ok(message)
}

/// Encode a [`Message`] the way producers publish it for this schema.
///
/// Block-compressed schemas are always compressed.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails or the body is too large
/// for the envelope.
pub fn encode(schema: &SchemaDef, message: &Message) -> Result<Vec<u8>, CodecError> {
    match schema.encoding {
        Encoding::Text => text::encode_text(message),
        Encoding::Binary => {
            let body = binary::encode_body(message)?;
            binary::seal(schema.compression, &body, true)
        }
    }
}

/// Decode a payload straight into a typed structure.
///
/// Used for fixed-shape schemas such as enum tables.
///
/// # Errors
///
/// Returns [`CodecError`] if the payload does not match `T`.
pub fn decode_typed<T: DeserializeOwned>(
    schema: &SchemaDef,
    payload: &[u8],
) -> Result<T, CodecError> {
    match schema.encoding {
        Encoding::Text => Ok(serde_json::from_slice(payload)?),
        Encoding::Binary => {
            let body = binary::open(schema.compression, payload)?;
            Ok(bincode::deserialize(&body)?)
        }
    }
}

/// Declared fields present in the message must carry their declared kind.
fn check_kinds(schema: &SchemaDef, message: &Message) -> Result<(), CodecError> {
    use hotspot_types::FieldKind;

    for field in &schema.fields {
        let Some(value) = message.get(&field.name) else {
            continue;
        };
        let matches = matches!(
            (field.kind, value),
            (FieldKind::Bool, Value::Bool(_))
                | (FieldKind::Int, Value::Int(_))
                | (FieldKind::Float, Value::Float(_))
                | (FieldKind::Text, Value::Text(_))
                | (FieldKind::Bytes, Value::Bytes(_))
                | (FieldKind::Pos3, Value::Pos3(_))
        );
        if !matches {
            return Err(CodecError::FieldKind {
                field: field.name.clone(),
                expected: field.kind,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hotspot_types::{Compression, FieldDef, FieldKind, Vec3};
    use proptest::prelude::*;

    fn schema(encoding: Encoding, compression: Compression) -> SchemaDef {
        let field = |name: &str, kind| FieldDef {
            name: name.to_owned(),
            kind,
            tracked: false,
            enum_key: None,
            enum_style: hotspot_types::EnumStyle::Single,
        };
        SchemaDef {
            name: "PlayerDamaged".to_owned(),
            role: hotspot_types::SchemaRole::Event,
            encoding,
            compression,
            storage: hotspot_types::StorageKind::List,
            fields: vec![
                field("position", FieldKind::Pos3),
                field("radius", FieldKind::Float),
                field("damage", FieldKind::Float),
                field("weapon", FieldKind::Int),
            ],
            point_events: Vec::new(),
        }
    }

    fn sample(x: f32, y: f32, z: f32, radius: f64, damage: f64) -> Message {
        Message::new()
            .with("position", Value::Pos3(Vec3::new(x, y, z)))
            .with("radius", Value::Float(radius))
            .with("damage", Value::Float(damage))
            .with("weapon", Value::Int(3))
    }

    fn scalars(msg: &Message) -> (Vec3, f32, f32) {
        let pos = msg.get("position").and_then(Value::as_pos3).unwrap();
        let radius = msg.get("radius").and_then(Value::as_f32).unwrap();
        let damage = msg.get("damage").and_then(Value::as_f32).unwrap();
        (pos, radius, damage)
    }

    fn assert_same_bits(a: (Vec3, f32, f32), b: (Vec3, f32, f32)) {
        assert_eq!(a.0.x.to_bits(), b.0.x.to_bits());
        assert_eq!(a.0.y.to_bits(), b.0.y.to_bits());
        assert_eq!(a.0.z.to_bits(), b.0.z.to_bits());
        assert_eq!(a.1.to_bits(), b.1.to_bits());
        assert_eq!(a.2.to_bits(), b.2.to_bits());
    }

    proptest! {
        #[test]
        fn scalars_survive_every_encoding(
            x in -1.0e6_f32..1.0e6,
            y in -1.0e6_f32..1.0e6,
            z in -1.0e6_f32..1.0e6,
            radius in 0.0_f64..1.0e4,
            damage in -1.0e9_f64..1.0e9,
        ) {
            let msg = sample(x, y, z, radius, damage);
            for (encoding, compression) in [
                (Encoding::Text, Compression::None),
                (Encoding::Binary, Compression::None),
                (Encoding::Binary, Compression::Block),
            ] {
                let schema = schema(encoding, compression);
                let bytes = encode(&schema, &msg).unwrap();
                let decoded = decode(&schema, &bytes).unwrap();
                assert_same_bits(scalars(&decoded), scalars(&msg));
            }
        }
    }

    #[test]
    fn mistyped_binary_field_rejected() {
        let schema = schema(Encoding::Binary, Compression::None);
        let msg = Message::new().with("weapon", Value::Text("rifle".to_owned()));
        let bytes = encode(&schema, &msg).unwrap();
        assert!(matches!(
            decode(&schema, &bytes),
            Err(CodecError::FieldKind { .. })
        ));
    }

    #[test]
    fn garbage_binary_payload_is_an_error() {
        let schema = schema(Encoding::Binary, Compression::None);
        assert!(decode(&schema, &[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn typed_decode_reads_enum_table() {
        let mut schema = schema(Encoding::Text, Compression::None);
        schema.fields.clear();
        let payload = br#"{"enum_name":"Weapon","values":[{"name":"Rifle","value":1}]}"#;
        let def: EnumDef = decode_typed(&schema, payload).unwrap();
        assert_eq!(def.enum_name, "Weapon");
        assert_eq!(def.values.len(), 1);
    }
}
