//! Event ingestion and incremental spatial integration for the Hotspot viewer.
//!
//! Telemetry events arrive continuously on a background task, are decoded,
//! and appended to one [`EventLog`] per event type. Once per main-loop tick
//! the [`integrator`] advances every surface's [`Cursor`] through the log of
//! the active event type, batching spatially relevant, filter-visible events
//! for the render collaborator. Each surface then keeps its display range
//! current through a [`RangeDriver`].
//!
//! # Data flow
//!
//! ```text
//! transport --> Ingestor::on_message --> decode --> FieldFilterState::observe
//!                                                    EventLog::append
//!                                  \--> SceneUpdate channel --> SceneSink
//!
//! ViewerContext::tick --> integrate(active type, surfaces) --> RenderBackend::accumulate
//!                     \--> RangeDriver::poll --> RenderBackend::request_readback
//! ```
//!
//! # Modules
//!
//! - [`config`] -- `hotspot.yaml` loading into typed structs
//! - [`event_log`] -- Append-only, thread-safe [`EventLog`]
//! - [`filter`] -- [`FieldFilterState`] and its inclusion rule
//! - [`surface`] -- [`Surface`], [`Cursor`], [`EventBatch`], [`RenderBackend`]
//! - [`integrator`] -- The incremental integration pass
//! - [`range`] -- [`RangeDriver`] state machine and [`RangeAggregate`]
//! - [`registry`] -- Event-type discovery and per-stream [`StreamSession`]s
//! - [`ingest`] -- Background decode/append path and [`SceneUpdate`]s
//! - [`context`] -- [`ViewerContext`], the explicit context driving each tick
//! - [`error`] -- [`ViewerError`]

pub mod config;
pub mod context;
pub mod error;
pub mod event_log;
pub mod filter;
pub mod ingest;
pub mod integrator;
pub mod range;
pub mod registry;
pub mod surface;

pub use config::{ConfigError, HotspotConfig, LogFormat};
pub use context::{SceneSink, TickReport, ViewerContext};
pub use error::ViewerError;
pub use event_log::{EventLog, EventRecord};
pub use filter::{DirtyFlag, FieldFilterState, FieldValue};
pub use ingest::{IngestOutcome, Ingestor, SceneKind, SceneUpdate};
pub use integrator::{IntegrationStats, MAX_EVENTS_PER_BATCH, integrate};
pub use range::{
    RangeAggregate, RangeDriver, RangePhase, ReadbackCompleter, ReadbackError, ReadbackHandle,
    ReadbackPoll, reduce_summary,
};
pub use registry::{
    EventType, EventTypeKey, EventTypeRegistry, SnapshotRequest, StreamSession, Subscription,
};
pub use surface::{Cursor, EventBatch, RenderBackend, Surface, SurfaceId};
