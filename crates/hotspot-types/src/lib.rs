//! Shared type definitions for the Hotspot telemetry viewer.
//!
//! This crate is the single source of truth for the data that crosses crate
//! boundaries: decoded messages and their field values, the static schema
//! registration table, world-space geometry, channel key conventions, and
//! the numeric range types produced by the range-reduction workflow.
//!
//! # Modules
//!
//! - [`geometry`] -- [`Vec3`] positions and axis-aligned [`Aabb`] bounds
//! - [`value`] -- Dynamic field [`Value`]s, hashable [`FilterKey`]s, [`Message`]
//! - [`schema`] -- [`SchemaDef`] and the [`SchemaTable`] built at startup
//! - [`keys`] -- Channel and storage key formatting
//! - [`range`] -- [`EventRange`] and readback [`SummaryPixel`]s

pub mod geometry;
pub mod keys;
pub mod range;
pub mod schema;
pub mod value;

pub use geometry::{Aabb, Vec3};
pub use range::{EventRange, SummaryPixel};
pub use schema::{
    Compression, Encoding, EnumStyle, FieldDef, FieldKind, PointEventDef, ScalarSource,
    SchemaDef, SchemaError, SchemaRole, SchemaTable, StorageKind,
};
pub use value::{FilterKey, Message, Value};
