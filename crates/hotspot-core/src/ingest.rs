//! Background ingestion path.
//!
//! The transport delivers `(channel, payload)` pairs on its own task.
//! [`Ingestor::on_message`] decodes each payload with its schema and routes
//! it:
//!
//! | Channel | Action |
//! |---------|--------|
//! | Exact event channel | observe filters, append to every event type of the schema |
//! | Scene schema prefix (`log` role) | re-emit through `tracing` at the message's level |
//! | Scene schema prefix (other roles) | forward a [`SceneUpdate`] to the main loop |
//! | Anything else | ignored |
//!
//! Snapshot backfill goes through the same path, keyed by the snapshot key,
//! which is identical to the live channel name.

use std::sync::Arc;

use hotspot_codec::{EnumDef, EnumTable};
use hotspot_types::{Message, SchemaRole, Value};
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, trace, warn};

use crate::registry::StreamSession;

/// Field carrying a log message's severity.
pub const LOG_LEVEL_FIELD: &str = "log_type";

/// Field carrying a log message's text.
pub const LOG_MESSAGE_FIELD: &str = "log_message";

/// What a scene update describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    /// Entity state.
    Entity,
    /// Entity removal.
    EntityDeleted,
    /// Mesh geometry.
    Mesh,
    /// Scene node.
    Node,
}

impl SceneKind {
    /// Kind for a scene role; `None` for roles that are not forwarded.
    pub const fn from_role(role: SchemaRole) -> Option<Self> {
        match role {
            SchemaRole::Entity => Some(Self::Entity),
            SchemaRole::EntityDeleted => Some(Self::EntityDeleted),
            SchemaRole::Mesh => Some(Self::Mesh),
            SchemaRole::Node => Some(Self::Node),
            SchemaRole::Event | SchemaRole::Log | SchemaRole::Enum => None,
        }
    }
}

/// A decoded scene message for the scene collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneUpdate {
    /// What the message describes.
    pub kind: SceneKind,
    /// Schema name.
    pub schema: String,
    /// Channel the message arrived on.
    pub channel: String,
    /// Decoded message.
    pub message: Message,
}

/// Result of routing one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended to this many event logs.
    Appended(usize),
    /// Forwarded as a scene update.
    Scene,
    /// Re-emitted as a log line.
    Logged,
    /// Decoding failed; the payload was dropped.
    Dropped,
    /// No schema claims the channel.
    Ignored,
}

/// Routes payloads for one stream session.
#[derive(Debug, Clone)]
pub struct Ingestor {
    session: Arc<StreamSession>,
    scene_tx: mpsc::UnboundedSender<SceneUpdate>,
}

impl Ingestor {
    /// Create an ingestor feeding `session` and forwarding scene updates to
    /// `scene_tx`.
    pub const fn new(session: Arc<StreamSession>, scene_tx: mpsc::UnboundedSender<SceneUpdate>) -> Self {
        Self { session, scene_tx }
    }

    /// The session being fed.
    pub const fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// Decode and route one payload.
    pub fn on_message(&self, channel: &str, payload: &[u8]) -> IngestOutcome {
        if let Some(event_types) = self.session.channel(channel) {
            let Some(schema) = event_types.first().map(|t| t.schema()) else {
                return IngestOutcome::Ignored;
            };
            let message = match hotspot_codec::decode(schema, payload) {
                Ok(message) => Arc::new(message),
                Err(e) => {
                    warn!(channel = channel, error = %e, "Failed to decode event, dropped");
                    return IngestOutcome::Dropped;
                }
            };
            let labels = self.session.enums();
            let appended = event_types
                .iter()
                .filter(|t| t.ingest(&message, &labels).is_some())
                .count();
            trace!(channel = channel, appended = appended, "Event ingested");
            return IngestOutcome::Appended(appended);
        }

        let Some(schema) = self.session.scene_schema(channel) else {
            debug!(channel = channel, "No schema for channel, ignored");
            return IngestOutcome::Ignored;
        };
        let message = match hotspot_codec::decode(schema, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel = channel, schema = schema.name.as_str(), error = %e, "Failed to decode scene message, dropped");
                return IngestOutcome::Dropped;
            }
        };

        if schema.role == SchemaRole::Log {
            emit_log(self.session.stream_id(), &message);
            return IngestOutcome::Logged;
        }
        let Some(kind) = SceneKind::from_role(schema.role) else {
            return IngestOutcome::Ignored;
        };
        let update = SceneUpdate {
            kind,
            schema: schema.name.clone(),
            channel: channel.to_owned(),
            message,
        };
        if self.scene_tx.send(update).is_err() {
            debug!(channel = channel, "Scene receiver closed, update discarded");
            return IngestOutcome::Ignored;
        }
        IngestOutcome::Scene
    }

    /// Route every snapshot entry stored under `key`.
    ///
    /// Returns the number of entries that were appended or forwarded.
    pub fn backfill<I>(&self, key: &str, payloads: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let routed = payloads
            .into_iter()
            .map(|payload| self.on_message(key, payload.as_ref()))
            .filter(|outcome| matches!(outcome, IngestOutcome::Appended(_) | IngestOutcome::Scene | IngestOutcome::Logged))
            .count();
        info!(key = key, routed = routed, "Snapshot backfilled");
        routed
    }

    /// Decode enum tables stored for `schema` and install them as the
    /// session's label source. Undecodable entries are skipped.
    ///
    /// Returns the number of enums loaded.
    pub fn load_enums<I>(&self, schema: &str, payloads: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let Some(def) = self.session.schemas().get(schema) else {
            warn!(schema = schema, "Unknown enum schema");
            return 0;
        };
        let mut table = EnumTable::new();
        for payload in payloads {
            match hotspot_codec::decode_typed::<EnumDef>(def, payload.as_ref()) {
                Ok(enum_def) => table.insert(enum_def),
                Err(e) => error!(schema = schema, error = %e, "Failed to decode enum table"),
            }
        }
        let loaded = table.len();
        self.session.set_enums(table);
        info!(stream = self.session.stream_id(), enums = loaded, "Enum tables loaded");
        loaded
    }
}

/// Severity of a game log message.
///
/// Severity is `0` (info), `1` (warning) or `2` (error); text severities
/// `"log"`, `"warning"` and `"error"` are accepted too. Anything else is
/// info.
pub fn log_level(message: &Message) -> Level {
    match message.get(LOG_LEVEL_FIELD) {
        Some(Value::Int(1)) => Level::WARN,
        Some(Value::Int(2)) => Level::ERROR,
        Some(Value::Text(t)) => match t.to_ascii_lowercase().as_str() {
            "warning" | "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        _ => Level::INFO,
    }
}

/// Re-emit a game log message at its own severity.
fn emit_log(stream: &str, message: &Message) {
    let text = match message.get(LOG_MESSAGE_FIELD) {
        Some(Value::Text(text)) => text.as_str(),
        _ => "",
    };
    let level = log_level(message);
    if level == Level::ERROR {
        error!(target: "game", stream = stream, "{text}");
    } else if level == Level::WARN {
        warn!(target: "game", stream = stream, "{text}");
    } else {
        info!(target: "game", stream = stream, "{text}");
    }
}
