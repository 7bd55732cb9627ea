//! Stream activation and the background ingestion task.
//!
//! Activating a stream subscribes first and holds the message receiver
//! while the snapshot backfill runs, then drains live messages. Nothing
//! published after the subscription is missed; a message that lands in both
//! the snapshot and the live feed is ingested twice.

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::Value;
use futures::future::try_join_all;
use hotspot_core::{IngestOutcome, Ingestor};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::redis::{RedisStore, Subscriber};

/// Handle to a running ingestion task. Dropping it stops the task.
#[derive(Debug)]
pub struct IngestionTask {
    stream: String,
    handle: JoinHandle<()>,
}

impl IngestionTask {
    /// Stream being ingested.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Whether the task has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for IngestionTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Subscribe, backfill and start ingesting for the ingestor's session.
///
/// Any previous subscriptions on `subscriber` are dropped first. The caller
/// must drop the previous [`IngestionTask`] before calling this.
///
/// # Errors
///
/// Returns [`StoreError`] if subscribing or a snapshot read fails.
pub async fn activate_stream(
    store: &RedisStore,
    subscriber: &Subscriber,
    ingestor: Ingestor,
) -> Result<IngestionTask, StoreError> {
    let session = Arc::clone(ingestor.session());
    let stream = session.stream_id().to_owned();

    subscriber.unsubscribe_all().await?;
    let rx = subscriber.messages();
    subscriber.subscribe(&session.subscriptions()).await?;

    for request in session.enum_requests() {
        let payloads = store.snapshot(&request.key, request.storage).await?;
        ingestor.load_enums(&request.schema, payloads);
    }

    let requests = session.snapshot_requests();
    let snapshots = try_join_all(
        requests
            .iter()
            .map(|request| store.snapshot(&request.key, request.storage)),
    )
    .await?;
    for (request, payloads) in requests.iter().zip(snapshots) {
        ingestor.backfill(&request.key, payloads);
    }

    info!(stream = stream.as_str(), "Stream active, ingesting live messages");
    let handle = tokio::spawn(run_ingestion(ingestor, rx));
    Ok(IngestionTask { stream, handle })
}

/// Route one subscriber message.
pub fn route(ingestor: &Ingestor, channel: &str, value: &Value) -> IngestOutcome {
    value.as_bytes().map_or_else(
        || {
            warn!(channel = channel, kind = ?value.kind(), "Non-binary message, dropped");
            IngestOutcome::Dropped
        },
        |payload| ingestor.on_message(channel, payload),
    )
}

async fn run_ingestion(ingestor: Ingestor, mut rx: broadcast::Receiver<fred::types::Message>) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                route(&ingestor, &message.channel, &message.value);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    stream = ingestor.session().stream_id(),
                    skipped = skipped,
                    "Ingestion fell behind the subscriber, messages lost"
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(stream = ingestor.session().stream_id(), "Subscriber closed, ingestion stopped");
                break;
            }
        }
    }
}

/// Periodically re-read the stream list.
///
/// The returned receiver sees the list whenever it changes. Read failures
/// are logged and retried on the next interval.
pub fn watch_streams(
    store: RedisStore,
    list_key: String,
    interval: Duration,
) -> (watch::Receiver<Vec<String>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(Vec::new());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.list_streams(&list_key).await {
                Ok(streams) => {
                    let changed = tx.send_if_modified(|current| {
                        if *current == streams {
                            false
                        } else {
                            current.clone_from(&streams);
                            true
                        }
                    });
                    if changed {
                        debug!(streams = streams.len(), "Stream list changed");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to read stream list"),
            }
            if tx.is_closed() {
                break;
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hotspot_core::{DirtyFlag, StreamSession};
    use hotspot_types::SchemaTable;
    use tokio::sync::mpsc;

    use super::*;

    fn ingestor() -> Ingestor {
        let schemas = SchemaTable::new(shot_schema()).unwrap();
        let session = Arc::new(StreamSession::discover(
            "s1",
            Arc::new(schemas),
            &Arc::new(DirtyFlag::new()),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        Ingestor::new(session, tx)
    }

    fn shot_schema() -> Vec<hotspot_types::SchemaDef> {
        use hotspot_types::{
            Compression, Encoding, EnumStyle, FieldDef, FieldKind, PointEventDef, SchemaDef,
            SchemaRole, StorageKind,
        };
        vec![SchemaDef {
            name: "Shot".to_owned(),
            role: SchemaRole::Event,
            encoding: Encoding::Text,
            compression: Compression::None,
            storage: StorageKind::List,
            fields: vec![FieldDef {
                name: "position".to_owned(),
                kind: FieldKind::Pos3,
                tracked: false,
                enum_key: None,
                enum_style: EnumStyle::Single,
            }],
            point_events: vec![PointEventDef {
                field: "position".to_owned(),
                radius: "1.0".to_owned(),
                weight: "1.0".to_owned(),
            }],
        }]
    }

    #[test]
    fn binary_values_are_routed() {
        let ingestor = ingestor();
        let payload = br#"{"position":{"x":1.0,"y":0.0,"z":0.0}}"#.to_vec();
        assert_eq!(
            route(&ingestor, "s1:Shot", &Value::from(payload.as_slice())),
            IngestOutcome::Appended(1)
        );
    }

    #[test]
    fn non_binary_values_are_dropped() {
        let ingestor = ingestor();
        assert_eq!(
            route(&ingestor, "s1:Shot", &Value::Integer(4)),
            IngestOutcome::Dropped
        );
    }
}
