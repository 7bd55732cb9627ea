//! Headless viewer binary for Hotspot.
//!
//! Connects to the store, follows the stream list, ingests the active
//! stream in the background and accumulates the active event type onto the
//! configured surfaces once per tick.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `hotspot.yaml` (or `HOTSPOT_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the store and subscriber clients
//! 4. Build the viewer context and the headless backend
//! 5. Start polling the stream list
//! 6. Activate the initial stream, if configured
//! 7. Run the tick loop until Ctrl-C

mod error;
mod headless;
mod scene;

use std::path::PathBuf;
use std::time::Duration;

use hotspot_core::config::LoggingConfig;
use hotspot_core::{HotspotConfig, LogFormat, ViewerContext};
use hotspot_store::{IngestionTask, RedisStore, Subscriber, activate_stream, watch_streams};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;
use crate::headless::HeadlessBackend;
use crate::scene::SceneState;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration or the initial connection fails.
/// Stream activation failures are logged and retried.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        redis_url = config.redis.url.as_str(),
        schemas = config.schemas.len(),
        surfaces = config.surfaces.len(),
        "hotspot-viewer starting"
    );

    // 3. Connect.
    let (store, subscriber) = connect(&config).await?;

    // 4. Context and backend.
    let (mut context, mut backend) = build_context(&config)?;
    let mut scene = SceneState::default();

    // 5. Stream list.
    let (mut streams, _watcher) = watch_streams(
        store.clone(),
        config.streams.list_key.clone(),
        Duration::from_millis(config.streams.poll_interval_ms),
    );

    // 6. Initial stream.
    let mut ingestion: Option<IngestionTask> = None;
    if let Some(initial) = config.streams.initial.as_deref() {
        let mut viewer = Viewer {
            context: &mut context,
            backend: &mut backend,
            scene: &mut scene,
        };
        ingestion = viewer.switch_stream(initial, &store, &subscriber, None).await;
    }

    // 7. Tick loop.
    let mut ticker = tokio::time::interval(Duration::from_millis(config.viewer.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reconnect =
        tokio::time::interval(Duration::from_millis(config.streams.poll_interval_ms));
    reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        tick_interval_ms = config.viewer.tick_interval_ms,
        "Entering tick loop"
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = context.tick(Instant::now(), &mut backend, &mut scene);
                if report.ui_dirty {
                    log_event_types(&context);
                }
                if report.scene_updates > 0 {
                    debug!(
                        entities = scene.entities().len(),
                        meshes = scene.meshes().len(),
                        nodes = scene.nodes().len(),
                        "Scene updated"
                    );
                }
                if report.ranges_completed > 0 {
                    log_ranges(&context, &backend);
                }
            }
            changed = streams.changed() => {
                if changed.is_err() {
                    warn!("Stream list watcher stopped");
                    break;
                }
                let latest = streams.borrow_and_update().last().cloned();
                debug!(latest = ?latest, "Stream list changed");
                if config.streams.auto_connect && context.active_stream().is_none() {
                    let mut viewer = Viewer {
                        context: &mut context,
                        backend: &mut backend,
                        scene: &mut scene,
                    };
                    ingestion = viewer.auto_connect(latest, &store, &subscriber, ingestion.take()).await;
                }
            }
            _ = reconnect.tick() => {
                if config.streams.auto_connect && context.active_stream().is_none() {
                    let latest = streams.borrow().last().cloned();
                    let mut viewer = Viewer {
                        context: &mut context,
                        backend: &mut backend,
                        scene: &mut scene,
                    };
                    ingestion = viewer.auto_connect(latest, &store, &subscriber, ingestion.take()).await;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    drop(ingestion);
    info!("hotspot-viewer stopped");
    Ok(())
}

/// Main-loop state borrowed for a stream switch.
struct Viewer<'a> {
    context: &'a mut ViewerContext,
    backend: &'a mut HeadlessBackend,
    scene: &'a mut SceneState,
}

impl Viewer<'_> {
    /// Stop the previous ingestion task, reset all state and activate `stream`.
    ///
    /// A failed activation is logged and the half-activated stream is
    /// closed, so auto-connect can try again later.
    async fn switch_stream(
        &mut self,
        stream: &str,
        store: &RedisStore,
        subscriber: &Subscriber,
        previous: Option<IngestionTask>,
    ) -> Option<IngestionTask> {
        drop(previous);
        self.scene.clear();
        let ingestor = self.context.switch_stream(stream, &mut *self.backend);
        match activate_stream(store, subscriber, ingestor).await {
            Ok(task) => Some(task),
            Err(e) => {
                error!(stream = stream, error = %e, "Stream activation failed");
                self.context.close_stream(&mut *self.backend);
                self.scene.clear();
                None
            }
        }
    }

    /// Activate the newest listed stream, keeping `current` if there is none.
    async fn auto_connect(
        &mut self,
        latest: Option<String>,
        store: &RedisStore,
        subscriber: &Subscriber,
        current: Option<IngestionTask>,
    ) -> Option<IngestionTask> {
        match latest {
            Some(stream) => self.switch_stream(&stream, store, subscriber, current).await,
            None => current,
        }
    }
}

/// Open the command and subscriber connections.
async fn connect(config: &HotspotConfig) -> Result<(RedisStore, Subscriber), AppError> {
    let store = RedisStore::connect(&config.redis).await?;
    let subscriber = Subscriber::connect(&config.redis).await?;
    Ok((store, subscriber))
}

/// Build the viewer context with a headless grid for every surface.
fn build_context(config: &HotspotConfig) -> Result<(ViewerContext, HeadlessBackend), AppError> {
    let context = ViewerContext::from_config(config)?;
    let mut backend = HeadlessBackend::new();
    for surface in context.surfaces() {
        backend.add_surface(surface.id(), surface.bounds());
    }
    Ok((context, backend))
}

/// Load configuration from `HOTSPOT_CONFIG` or `hotspot.yaml`.
///
/// A missing file yields the defaults with environment overrides applied.
fn load_config() -> Result<HotspotConfig, AppError> {
    let path = std::env::var("HOTSPOT_CONFIG")
        .map_or_else(|_| PathBuf::from("hotspot.yaml"), PathBuf::from);
    if path.exists() {
        Ok(HotspotConfig::from_file(&path)?)
    } else {
        let mut config = HotspotConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Summarize event types and their filter values.
fn log_event_types(context: &ViewerContext) {
    let Some(session) = context.session() else {
        return;
    };
    let active = context.active_event_type().map(|t| t.key().clone());
    for event_type in session.event_types() {
        let filters = event_type.filters();
        let values: Vec<String> = filters
            .tracked_fields()
            .iter()
            .map(|field| {
                let labels: Vec<String> = filters
                    .values(field)
                    .into_iter()
                    .map(|(_, v)| if v.visible { v.label } else { format!("!{}", v.label) })
                    .collect();
                format!("{field}=[{}]", labels.join(", "))
            })
            .collect();
        let summary = values.join(" ");
        info!(
            event_type = %event_type.key(),
            active = active.as_ref() == Some(event_type.key()),
            integrable = event_type.is_integrable(),
            records = event_type.log().len(),
            filters = summary.as_str(),
            "Event type"
        );
    }
}

/// Report the aggregate event range and each surface's peak cell.
fn log_ranges(context: &ViewerContext, backend: &HeadlessBackend) {
    let range = context.event_range();
    info!(min = range.min, max = range.max, "Event range updated");
    for surface in context.surfaces() {
        let peak = backend
            .cells(surface.id())
            .and_then(|cells| cells.iter().copied().reduce(f32::max));
        debug!(
            surface = surface.name(),
            integrated = surface.cursor().position(),
            peak = ?peak,
            "Surface state"
        );
    }
}
