//! Redis transport for the Hotspot viewer.
//!
//! Producers publish every telemetry message on a channel named after the
//! stream and schema, and additionally store it under the same key so a
//! viewer that connects late can backfill.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `event_streams` | List | Known stream identifiers, oldest first |
//! | `{stream}:{schema}` | Hash, List or String | Snapshot of a schema's messages |
//! | `{stream}:{schema}` | Channel | Live point events |
//! | `{stream}:{schema}*` | Channel pattern | Live scene messages |
//!
//! # Modules
//!
//! - [`redis`] -- [`RedisStore`] reads and [`Subscriber`] pub/sub
//! - [`session`] -- Stream activation, the ingestion task and stream list polling
//! - [`error`] -- [`StoreError`]

pub mod error;
pub mod redis;
pub mod session;

pub use error::StoreError;
pub use redis::{RedisStore, Subscriber};
pub use session::{IngestionTask, activate_stream, route, watch_streams};
