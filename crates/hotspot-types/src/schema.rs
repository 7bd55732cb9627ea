//! Static schema registration table.
//!
//! Every telemetry message type the viewer understands is declared once at
//! startup (normally from the `schemas` section of `hotspot.yaml`). A schema
//! declares how its payloads are encoded, how its snapshot data is stored,
//! which fields are filterable, and which position fields describe point
//! events together with their radius and weight sources.
//!
//! # Example
//!
//! ```yaml
//! - name: PlayerDamaged
//!   role: event
//!   encoding: text
//!   storage: list
//!   fields:
//!     - { name: position, kind: pos3 }
//!     - { name: damage, kind: float }
//!     - { name: weapon, kind: int, tracked: true, enum_key: Weapon }
//!   point_events:
//!     - { field: position, radius: "2.5", weight: damage }
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::value::Message;

/// What a schema's messages mean to the viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRole {
    /// Point events that accumulate onto surfaces.
    #[default]
    Event,
    /// Entity state updates.
    Entity,
    /// Entity removal notices.
    EntityDeleted,
    /// Mesh geometry payloads.
    Mesh,
    /// Scene node updates.
    Node,
    /// Game log lines.
    Log,
    /// Enum name tables used for display labels.
    Enum,
}

impl SchemaRole {
    /// Whether messages of this role are routed to the scene collaborator
    /// via prefix subscriptions.
    pub const fn is_scene_update(self) -> bool {
        matches!(
            self,
            Self::Entity | Self::EntityDeleted | Self::Mesh | Self::Node | Self::Log
        )
    }
}

/// Payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Length-delimited binary body.
    #[default]
    Binary,
    /// Structured text (JSON).
    Text,
}

/// Compression envelope for binary payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Payload is the bare body.
    #[default]
    None,
    /// Payload carries a compression tag and the uncompressed size, followed
    /// by a possibly block-compressed body.
    Block,
}

/// Shape of a schema's snapshot data in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// A hash of key to payload.
    Hash,
    /// A list of payloads, oldest first.
    List,
    /// A single payload.
    Value,
    /// No snapshot is stored.
    #[default]
    None,
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Boolean.
    Bool,
    /// Signed integer (also used for enums).
    Int,
    /// Floating point.
    Float,
    /// Text.
    Text,
    /// Opaque bytes.
    Bytes,
    /// World-space position.
    Pos3,
}

impl FieldKind {
    /// Whether the field can feed a radius or weight.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Bool)
    }
}

/// How an enum-backed integer field maps to enum names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumStyle {
    /// The value equals exactly one enum number.
    #[default]
    Single,
    /// The value is a bitmask of enum numbers.
    Flags,
    /// The value is a bitmask whose bit `n` stands for enum number `n`.
    Indexed,
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in payloads.
    pub name: String,
    /// Declared type.
    pub kind: FieldKind,
    /// Whether distinct values of this field are offered as filters.
    #[serde(default)]
    pub tracked: bool,
    /// Enum table used to label values of this field.
    #[serde(default)]
    pub enum_key: Option<String>,
    /// How values map to the enum table.
    #[serde(default)]
    pub enum_style: EnumStyle,
}

/// A position field that turns messages into point events.
///
/// `radius` and `weight` are either float literals or the name of a numeric
/// sibling field evaluated per message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PointEventDef {
    /// Name of the `pos3` field.
    pub field: String,
    /// Radius literal or field name.
    #[serde(default)]
    pub radius: String,
    /// Weight literal or field name.
    #[serde(default)]
    pub weight: String,
}

/// A declared message type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaDef {
    /// Schema name; also the channel suffix.
    pub name: String,
    /// What the viewer does with these messages.
    #[serde(default)]
    pub role: SchemaRole,
    /// Payload encoding.
    #[serde(default)]
    pub encoding: Encoding,
    /// Compression envelope (binary encoding only).
    #[serde(default)]
    pub compression: Compression,
    /// Snapshot storage shape.
    #[serde(default)]
    pub storage: StorageKind,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Point-event position fields.
    #[serde(default)]
    pub point_events: Vec<PointEventDef>,
}

impl SchemaDef {
    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields flagged as tracked, in declaration order.
    pub fn tracked_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.tracked)
    }
}

/// Where a point event's radius or weight comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarSource {
    /// The same value for every record.
    Constant(f32),
    /// A numeric field read from each record.
    Field(String),
}

impl ScalarSource {
    /// Resolve a declared radius/weight string against its schema.
    ///
    /// A float literal becomes [`ScalarSource::Constant`]; the name of a
    /// numeric field becomes [`ScalarSource::Field`]. Anything else (empty,
    /// unknown field, non-numeric field) yields `None`.
    pub fn resolve(raw: &str, schema: &SchemaDef) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(literal) = raw.parse::<f32>() {
            return Some(Self::Constant(literal));
        }
        schema
            .field(raw)
            .filter(|f| f.kind.is_numeric())
            .map(|f| Self::Field(f.name.clone()))
    }

    /// Evaluate against a message. An absent or non-numeric field reads as `0.0`.
    pub fn evaluate(&self, message: &Message) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Field(name) => message
                .get(name)
                .and_then(crate::value::Value::as_f32)
                .unwrap_or(0.0),
        }
    }
}

/// Errors found while validating the schema table.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two schemas share a name.
    #[error("duplicate schema: {0}")]
    DuplicateSchema(String),

    /// A point event names a field the schema does not declare.
    #[error("schema {schema} declares point event on unknown field {field}")]
    UnknownPointField {
        /// The schema.
        schema: String,
        /// The missing field.
        field: String,
    },

    /// A point event names a field that is not a position.
    #[error("schema {schema} point event field {field} is not pos3")]
    PointFieldNotPosition {
        /// The schema.
        schema: String,
        /// The offending field.
        field: String,
    },
}

/// The validated set of schemas known to the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTable {
    schemas: Vec<SchemaDef>,
}

impl SchemaTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for duplicate names or point events whose
    /// field is missing or not a position.
    pub fn new(schemas: Vec<SchemaDef>) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for schema in &schemas {
            if !seen.insert(schema.name.as_str()) {
                return Err(SchemaError::DuplicateSchema(schema.name.clone()));
            }
            for point in &schema.point_events {
                let field = schema.field(&point.field).ok_or_else(|| {
                    SchemaError::UnknownPointField {
                        schema: schema.name.clone(),
                        field: point.field.clone(),
                    }
                })?;
                if field.kind != FieldKind::Pos3 {
                    return Err(SchemaError::PointFieldNotPosition {
                        schema: schema.name.clone(),
                        field: point.field.clone(),
                    });
                }
            }
        }
        Ok(Self { schemas })
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<&SchemaDef> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// All schemas in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaDef> {
        self.schemas.iter()
    }

    /// Schemas with the given role.
    pub fn with_role(&self, role: SchemaRole) -> impl Iterator<Item = &SchemaDef> {
        self.schemas.iter().filter(move |s| s.role == role)
    }

    /// Number of schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
