//! Event-type discovery and per-stream session state.
//!
//! An event type exists for every `(schema, position field)` pair declared
//! in the [`SchemaTable`]. Activating a stream builds a fresh
//! [`StreamSession`] holding one [`EventLog`] and [`FieldFilterState`] per
//! event type, plus the subscription and snapshot bookkeeping for that
//! stream. Nothing survives a stream switch: the previous session is simply
//! dropped once its ingestion task has been stopped.
//!
//! # Channel layout
//!
//! | Schema role | Subscription | Channel |
//! |-------------|--------------|---------|
//! | `event` | exact | `{stream}:{schema}` |
//! | `entity`, `entity_deleted`, `mesh`, `node`, `log` | pattern | `{stream}:{schema}*` |
//! | `enum` | none (snapshot only) | `{stream}:{schema}` |

use std::collections::BTreeMap;
use std::sync::Arc;

use hotspot_codec::EnumTable;
use hotspot_types::keys::{channel_key, channel_pattern, strip_stream};
use hotspot_types::{Message, PointEventDef, ScalarSource, SchemaDef, SchemaRole, SchemaTable, StorageKind};
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::event_log::{EventLog, EventRecord};
use crate::filter::{DirtyFlag, FieldFilterState};

/// Identity of an event type: a schema and one of its position fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTypeKey {
    /// Schema name.
    pub schema: String,
    /// Position field name.
    pub field: String,
}

impl EventTypeKey {
    /// Create a key.
    pub fn new(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            field: field.into(),
        }
    }
}

impl core::fmt::Display for EventTypeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.schema, self.field)
    }
}

/// A discovered event type with its log and filter state.
#[derive(Debug)]
pub struct EventType {
    key: EventTypeKey,
    schema: SchemaDef,
    radius: Option<ScalarSource>,
    weight: Option<ScalarSource>,
    log: EventLog,
    filters: FieldFilterState,
}

impl EventType {
    /// Build an event type for one point-event declaration of `schema`.
    ///
    /// A radius or weight that does not resolve leaves the type
    /// non-integrable; it still collects records and filter values.
    pub fn new(schema: &SchemaDef, point: &PointEventDef, dirty: Arc<DirtyFlag>) -> Self {
        let key = EventTypeKey::new(&schema.name, &point.field);
        let radius = ScalarSource::resolve(&point.radius, schema);
        let weight = ScalarSource::resolve(&point.weight, schema);
        if radius.is_none() {
            warn!(
                event_type = %key,
                radius = point.radius.as_str(),
                "Radius source not found, event type will not integrate"
            );
        }
        if weight.is_none() {
            warn!(
                event_type = %key,
                weight = point.weight.as_str(),
                "Weight source not found, event type will not integrate"
            );
        }
        let filters = FieldFilterState::new(schema.tracked_fields().map(|f| f.name.clone()), dirty);
        Self {
            key,
            schema: schema.clone(),
            radius,
            weight,
            log: EventLog::new(),
            filters,
        }
    }

    /// Identity.
    pub const fn key(&self) -> &EventTypeKey {
        &self.key
    }

    /// Schema the type belongs to.
    pub const fn schema(&self) -> &SchemaDef {
        &self.schema
    }

    /// Whether both radius and weight sources resolved.
    pub const fn is_integrable(&self) -> bool {
        self.radius.is_some() && self.weight.is_some()
    }

    /// The record log.
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// The filter state.
    pub const fn filters(&self) -> &FieldFilterState {
        &self.filters
    }

    /// Extract the point-event scalars from a message.
    ///
    /// Returns `None` when the position field is absent. Unresolved radius
    /// or weight sources read as `0.0`.
    pub fn extract(&self, message: &Arc<Message>) -> Option<EventRecord> {
        let position = message.get(&self.key.field)?.as_pos3()?;
        let scalar = |source: Option<&ScalarSource>| source.map_or(0.0, |s| s.evaluate(message));
        Some(EventRecord {
            message: Arc::clone(message),
            position,
            radius: scalar(self.radius.as_ref()),
            weight: scalar(self.weight.as_ref()),
        })
    }

    /// Observe the message's tracked values, then append it to the log.
    ///
    /// Filter bookkeeping happens first so that any record visible in the
    /// log already has its values registered. Returns the new record's
    /// index, or `None` if the message carries no position.
    pub fn ingest(&self, message: &Arc<Message>, labels: &EnumTable) -> Option<usize> {
        let Some(record) = self.extract(message) else {
            debug!(event_type = %self.key, "Message has no position, dropped");
            return None;
        };
        self.filters.observe_message(message, |name, value| {
            self.schema
                .field(name)
                .map_or_else(|| value.to_string(), |field| labels.label(field, value))
        });
        Some(self.log.append(record))
    }
}

/// A channel subscription.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Subscription {
    /// Exact channel name.
    Exact(String),
    /// Glob pattern.
    Pattern(String),
}

/// A snapshot key to backfill from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Store key; also the channel the entries are routed as.
    pub key: String,
    /// Schema of the stored payloads.
    pub schema: String,
    /// Shape of the stored data.
    pub storage: StorageKind,
}

/// Everything the viewer knows about the active stream.
#[derive(Debug)]
pub struct StreamSession {
    stream_id: String,
    schemas: Arc<SchemaTable>,
    event_types: Vec<Arc<EventType>>,
    channels: BTreeMap<String, Vec<Arc<EventType>>>,
    enums: RwLock<EnumTable>,
}

impl StreamSession {
    /// Discover the event types of `schemas` for `stream_id`.
    pub fn discover(stream_id: &str, schemas: Arc<SchemaTable>, dirty: &Arc<DirtyFlag>) -> Self {
        let mut event_types = Vec::new();
        let mut channels: BTreeMap<String, Vec<Arc<EventType>>> = BTreeMap::new();
        for schema in schemas.with_role(SchemaRole::Event) {
            for point in &schema.point_events {
                let event_type = Arc::new(EventType::new(schema, point, Arc::clone(dirty)));
                channels
                    .entry(channel_key(stream_id, &schema.name))
                    .or_default()
                    .push(Arc::clone(&event_type));
                event_types.push(event_type);
            }
        }
        info!(
            stream = stream_id,
            event_types = event_types.len(),
            channels = channels.len(),
            "Discovered event types"
        );
        Self {
            stream_id: stream_id.to_owned(),
            schemas,
            event_types,
            channels,
            enums: RwLock::new(EnumTable::new()),
        }
    }

    /// Stream identifier.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The schema table the session was discovered from.
    pub fn schemas(&self) -> &SchemaTable {
        &self.schemas
    }

    /// All event types in declaration order.
    pub fn event_types(&self) -> &[Arc<EventType>] {
        &self.event_types
    }

    /// Look up an event type.
    pub fn event_type(&self, key: &EventTypeKey) -> Option<&Arc<EventType>> {
        self.event_types.iter().find(|t| t.key() == key)
    }

    /// The first integrable event type in declaration order.
    pub fn first_integrable(&self) -> Option<&Arc<EventType>> {
        self.event_types.iter().find(|t| t.is_integrable())
    }

    /// Event types fed by an exact channel.
    pub fn channel(&self, channel: &str) -> Option<&[Arc<EventType>]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    /// Scene schema a channel belongs to, by longest name prefix.
    pub fn scene_schema(&self, channel: &str) -> Option<&SchemaDef> {
        let rest = strip_stream(&self.stream_id, channel)?;
        self.schemas
            .iter()
            .filter(|s| s.role.is_scene_update() && rest.starts_with(s.name.as_str()))
            .max_by_key(|s| s.name.len())
    }

    /// Subscriptions needed for this stream.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let exact = self.channels.keys().cloned().map(Subscription::Exact);
        let patterns = self
            .schemas
            .iter()
            .filter(|s| s.role.is_scene_update())
            .map(|s| Subscription::Pattern(channel_pattern(&self.stream_id, &s.name)));
        exact.chain(patterns).collect()
    }

    /// Snapshot keys to backfill, excluding enum tables.
    pub fn snapshot_requests(&self) -> Vec<SnapshotRequest> {
        self.requests_where(|s| s.role != SchemaRole::Enum)
    }

    /// Snapshot keys holding enum tables.
    pub fn enum_requests(&self) -> Vec<SnapshotRequest> {
        self.requests_where(|s| s.role == SchemaRole::Enum)
    }

    fn requests_where(&self, keep: impl Fn(&SchemaDef) -> bool) -> Vec<SnapshotRequest> {
        self.schemas
            .iter()
            .filter(|s| s.storage != StorageKind::None && keep(s))
            .map(|s| SnapshotRequest {
                key: channel_key(&self.stream_id, &s.name),
                schema: s.name.clone(),
                storage: s.storage,
            })
            .collect()
    }

    /// Replace the enum table used for filter labels.
    pub fn set_enums(&self, enums: EnumTable) {
        *self.enums.write() = enums;
    }

    /// Current enum table.
    pub fn enums(&self) -> RwLockReadGuard<'_, EnumTable> {
        self.enums.read()
    }
}

/// Owns the schema table and the active [`StreamSession`].
#[derive(Debug)]
pub struct EventTypeRegistry {
    schemas: Arc<SchemaTable>,
    session: Option<Arc<StreamSession>>,
    dirty: Arc<DirtyFlag>,
}

impl EventTypeRegistry {
    /// Create a registry with no active stream. `dirty` is raised by every
    /// filter state the registry creates.
    pub const fn new(schemas: Arc<SchemaTable>, dirty: Arc<DirtyFlag>) -> Self {
        Self {
            schemas,
            session: None,
            dirty,
        }
    }

    /// The schema table.
    pub fn schemas(&self) -> &Arc<SchemaTable> {
        &self.schemas
    }

    /// The active session, if any.
    pub const fn session(&self) -> Option<&Arc<StreamSession>> {
        self.session.as_ref()
    }

    /// Discard the active session and discover a new one for `stream_id`.
    pub fn activate(&mut self, stream_id: &str) -> Arc<StreamSession> {
        if let Some(previous) = self.session.take() {
            info!(from = previous.stream_id(), to = stream_id, "Switching event stream");
        }
        let session = Arc::new(StreamSession::discover(
            stream_id,
            Arc::clone(&self.schemas),
            &self.dirty,
        ));
        self.session = Some(Arc::clone(&session));
        self.dirty.mark();
        session
    }

    /// Discard the active session, if any. Returns the abandoned session.
    pub fn deactivate(&mut self) -> Option<Arc<StreamSession>> {
        let previous = self.session.take();
        if previous.is_some() {
            self.dirty.mark();
        }
        previous
    }
}
