//! Error types for the viewer core.

use crate::registry::EventTypeKey;

/// Errors returned by [`crate::ViewerContext`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// No stream has been activated yet.
    #[error("no active stream")]
    NoActiveStream,

    /// The event type is not known to the active stream.
    #[error("unknown event type: {0}")]
    UnknownEventType(EventTypeKey),

    /// The field is not a tracked field of the event type.
    #[error("event type {event_type} does not track field {field}")]
    UntrackedField {
        /// The event type.
        event_type: EventTypeKey,
        /// The field that was named.
        field: String,
    },

    /// The schema table failed validation.
    #[error("schema error: {0}")]
    Schema(#[from] hotspot_types::SchemaError),
}
