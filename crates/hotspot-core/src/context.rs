//! The explicit viewer context driven by the main loop.
//!
//! [`ViewerContext`] owns the registry, the surfaces and the aggregate
//! range. The ingestion task only ever sees an [`Ingestor`] for the current
//! session; everything else is touched from the main loop through
//! [`ViewerContext::tick`].

use std::sync::Arc;
use std::time::Duration;

use hotspot_types::{Aabb, EventRange, FilterKey, SchemaTable};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::HotspotConfig;
use crate::error::ViewerError;
use crate::filter::DirtyFlag;
use crate::ingest::{Ingestor, SceneUpdate};
use crate::integrator::{IntegrationStats, integrate};
use crate::range::{RangeAggregate, RangeDriver};
use crate::registry::{EventType, EventTypeKey, EventTypeRegistry, StreamSession};
use crate::surface::{RenderBackend, Surface, SurfaceId};

/// Scene-side collaborator receiving entity, mesh and node updates.
pub trait SceneSink {
    /// Apply one update.
    fn apply(&mut self, update: SceneUpdate);
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Scene updates handed to the sink.
    pub scene_updates: usize,
    /// Whether the event-type UI needs rebuilding.
    pub ui_dirty: bool,
    /// Integration work for the active event type.
    pub integration: IntegrationStats,
    /// Range readbacks that completed.
    pub ranges_completed: usize,
}

/// Viewer state shared by the UI and the main loop.
#[derive(Debug)]
pub struct ViewerContext {
    registry: EventTypeRegistry,
    surfaces: Vec<Surface>,
    next_surface: u32,
    active: Option<Arc<EventType>>,
    aggregate: RangeAggregate,
    ui_dirty: Arc<DirtyFlag>,
    scene_rx: Option<mpsc::UnboundedReceiver<SceneUpdate>>,
    retry_delay: Duration,
}

impl ViewerContext {
    /// Create a context with no stream and no surfaces.
    pub fn new(schemas: Arc<SchemaTable>, retry_delay: Duration) -> Self {
        let ui_dirty = Arc::new(DirtyFlag::new());
        Self {
            registry: EventTypeRegistry::new(schemas, Arc::clone(&ui_dirty)),
            surfaces: Vec::new(),
            next_surface: 0,
            active: None,
            aggregate: RangeAggregate::default(),
            ui_dirty,
            scene_rx: None,
            retry_delay,
        }
    }

    /// Build a context from configuration, creating the configured surfaces.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerError::Schema`] if the schema table is invalid.
    pub fn from_config(config: &HotspotConfig) -> Result<Self, ViewerError> {
        let schemas = Arc::new(config.schema_table()?);
        let mut context = Self::new(
            schemas,
            Duration::from_millis(config.viewer.readback_retry_ms),
        );
        for surface in &config.surfaces {
            context.add_surface(&surface.name, surface.bounds());
        }
        Ok(context)
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    /// Register a surface. Its cursor starts at zero, so the next tick
    /// integrates the whole log of the active event type into it.
    pub fn add_surface(&mut self, name: &str, bounds: Aabb) -> SurfaceId {
        let id = SurfaceId(self.next_surface);
        self.next_surface = self.next_surface.saturating_add(1);
        self.surfaces.push(Surface::new(
            id,
            name,
            bounds,
            RangeDriver::new(self.retry_delay),
        ));
        debug!(surface = %id, name = name, "Surface added");
        id
    }

    /// Remove a surface, abandoning any readback it had in flight.
    pub fn remove_surface(&mut self, id: SurfaceId) -> bool {
        let before = self.surfaces.len();
        self.surfaces.retain(|s| s.id() != id);
        let removed = self.surfaces.len() != before;
        if removed {
            self.aggregate.mark_dirty();
        }
        removed
    }

    /// All surfaces, in the order of the last integration pass.
    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    /// Look up a surface.
    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id() == id)
    }

    /// Clear every surface and restart its range workflow.
    pub fn reset_surfaces(&mut self, backend: &mut dyn RenderBackend) {
        for surface in &mut self.surfaces {
            surface.reset(backend);
        }
        self.aggregate.mark_dirty();
    }

    // =========================================================================
    // Streams and event types
    // =========================================================================

    /// The active stream session.
    pub const fn session(&self) -> Option<&Arc<StreamSession>> {
        self.registry.session()
    }

    /// Identifier of the active stream.
    pub fn active_stream(&self) -> Option<&str> {
        self.session().map(|s| s.stream_id())
    }

    /// Switch to `stream_id`.
    ///
    /// All logs, filters and surfaces are reset and the first integrable
    /// event type becomes active. Scene updates still queued for the old
    /// stream are discarded. The returned [`Ingestor`] feeds the new session;
    /// the caller must stop feeding the previous one.
    pub fn switch_stream(&mut self, stream_id: &str, backend: &mut dyn RenderBackend) -> Ingestor {
        let session = self.registry.activate(stream_id);
        let (scene_tx, scene_rx) = mpsc::unbounded_channel();
        self.scene_rx = Some(scene_rx);
        self.active = session.first_integrable().cloned();
        self.reset_surfaces(backend);
        info!(
            stream = stream_id,
            active = ?self.active.as_ref().map(|t| t.key()),
            "Active event stream"
        );
        Ingestor::new(session, scene_tx)
    }

    /// Abandon the active stream.
    ///
    /// Used when activating a stream failed part way. Surfaces are cleared,
    /// queued scene updates are dropped and no event type stays active, so
    /// the next stream switch starts from a clean state.
    pub fn close_stream(&mut self, backend: &mut dyn RenderBackend) {
        let Some(session) = self.registry.deactivate() else {
            return;
        };
        self.scene_rx = None;
        self.active = None;
        self.reset_surfaces(backend);
        info!(stream = session.stream_id(), "Event stream closed");
    }

    /// The event type being integrated.
    pub fn active_event_type(&self) -> Option<&Arc<EventType>> {
        self.active.as_ref()
    }

    /// Make `key` the integrated event type, resetting surfaces if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerError::NoActiveStream`] or
    /// [`ViewerError::UnknownEventType`].
    pub fn set_active_event_type(
        &mut self,
        key: &EventTypeKey,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), ViewerError> {
        let event_type = self.lookup(key)?;
        if self.active.as_ref().is_some_and(|a| a.key() == key) {
            return Ok(());
        }
        info!(event_type = %key, integrable = event_type.is_integrable(), "Active event type changed");
        self.active = Some(event_type);
        self.reset_surfaces(backend);
        self.ui_dirty.mark();
        Ok(())
    }

    /// Show or hide a value of a tracked field.
    ///
    /// A change raises the UI dirty flag, and surfaces are reset when the
    /// visibility of the active event type changed. Returns whether
    /// anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerError::NoActiveStream`],
    /// [`ViewerError::UnknownEventType`] or [`ViewerError::UntrackedField`].
    pub fn set_filter_visibility(
        &mut self,
        key: &EventTypeKey,
        field: &str,
        value: &FilterKey,
        visible: bool,
        backend: &mut dyn RenderBackend,
    ) -> Result<bool, ViewerError> {
        let event_type = self.lookup(key)?;
        if !event_type.filters().is_tracked(field) {
            return Err(ViewerError::UntrackedField {
                event_type: key.clone(),
                field: field.to_owned(),
            });
        }
        let changed = event_type.filters().set_visible(field, value, visible);
        if !changed {
            return Ok(false);
        }
        self.ui_dirty.mark();
        if self.active.as_ref().is_some_and(|a| a.key() == key) {
            self.reset_surfaces(backend);
        }
        Ok(true)
    }

    fn lookup(&self, key: &EventTypeKey) -> Result<Arc<EventType>, ViewerError> {
        let session = self.session().ok_or(ViewerError::NoActiveStream)?;
        session
            .event_type(key)
            .cloned()
            .ok_or_else(|| ViewerError::UnknownEventType(key.clone()))
    }

    // =========================================================================
    // Main loop
    // =========================================================================

    /// Aggregate display range across surfaces.
    pub const fn event_range(&self) -> EventRange {
        self.aggregate.range()
    }

    /// Run one main-loop tick.
    ///
    /// Order: drain scene updates into `sink`, consume the UI dirty flag,
    /// integrate the active event type, poll every range driver, then
    /// recompute the aggregate range if any surface range changed.
    pub fn tick(
        &mut self,
        now: Instant,
        backend: &mut dyn RenderBackend,
        sink: &mut dyn SceneSink,
    ) -> TickReport {
        let mut report = TickReport::default();

        if let Some(rx) = self.scene_rx.as_mut() {
            while let Ok(update) = rx.try_recv() {
                sink.apply(update);
                report.scene_updates = report.scene_updates.saturating_add(1);
            }
        }

        report.ui_dirty = self.ui_dirty.take();

        if let Some(active) = self.active.clone() {
            report.integration = integrate(&active, &mut self.surfaces, backend);
        }

        for surface in &mut self.surfaces {
            let id = surface.id();
            if surface.range_mut().poll(id, backend, now) {
                report.ranges_completed = report.ranges_completed.saturating_add(1);
                self.aggregate.mark_dirty();
            }
        }

        self.aggregate
            .recompute(self.surfaces.iter().map(|s| s.range().range()));
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use hotspot_types::{Message, SummaryPixel, Vec3};

    use super::*;
    use crate::ingest::SceneKind;
    use crate::range::{RangePhase, ReadbackHandle};
    use crate::registry::tests::schema_table;
    use crate::surface::EventBatch;

    /// Backend whose summary for each surface is `(0, events accumulated)`.
    #[derive(Default)]
    struct CountingBackend {
        totals: std::collections::BTreeMap<SurfaceId, usize>,
        clears: usize,
    }

    impl RenderBackend for CountingBackend {
        fn accumulate(&mut self, surface: SurfaceId, batch: &EventBatch) {
            let total = self.totals.entry(surface).or_default();
            *total = total.saturating_add(batch.len());
        }

        fn clear(&mut self, surface: SurfaceId) {
            self.totals.remove(&surface);
            self.clears = self.clears.saturating_add(1);
        }

        fn request_reduction(&mut self, _surface: SurfaceId) {}

        #[allow(clippy::cast_precision_loss)]
        fn request_readback(&mut self, surface: SurfaceId) -> ReadbackHandle {
            let total = self.totals.get(&surface).copied().unwrap_or(0) as f32;
            ReadbackHandle::ready(vec![SummaryPixel::min_max(0.0, total)])
        }
    }

    #[derive(Default)]
    struct CollectingSink(Vec<SceneUpdate>);

    impl SceneSink for CollectingSink {
        fn apply(&mut self, update: SceneUpdate) {
            self.0.push(update);
        }
    }

    fn damaged_payload(x: f32) -> Vec<u8> {
        format!(r#"{{"position":{{"x":{x},"y":0.0,"z":0.0}},"damage":1.0,"weapon":1,"team":2}}"#)
            .into_bytes()
    }

    fn context() -> (ViewerContext, CountingBackend) {
        let mut context = ViewerContext::new(schema_table(), Duration::from_millis(200));
        context.add_surface("floor", Aabb::new(Vec3::new(-10.0, -1.0, -1.0), Vec3::new(10.0, 1.0, 1.0)));
        (context, CountingBackend::default())
    }

    fn damaged_key() -> EventTypeKey {
        EventTypeKey::new("PlayerDamaged", "position")
    }

    #[test]
    fn tick_integrates_and_updates_range() {
        let (mut context, mut backend) = context();
        let ingestor = context.switch_stream("s1", &mut backend);
        for i in 0..3_u8 {
            ingestor.on_message("s1:PlayerDamaged", &damaged_payload(f32::from(i)));
        }

        let mut sink = CollectingSink::default();
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert!(report.ui_dirty);
        assert_eq!(report.integration.events, 3);
        assert_eq!(report.ranges_completed, 1);
        assert_eq!(context.event_range(), EventRange::new(0.0, 3.0));

        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert!(!report.ui_dirty);
        assert_eq!(report.integration, IntegrationStats::default());
        assert_eq!(report.ranges_completed, 0);
    }

    #[test]
    fn stream_switch_discards_everything() {
        let (mut context, mut backend) = context();
        let ingestor = context.switch_stream("s1", &mut backend);
        for i in 0..20_u8 {
            ingestor.on_message("s1:PlayerDamaged", &damaged_payload(f32::from(i)));
        }
        let mut sink = CollectingSink::default();
        context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(context.surfaces().first().unwrap().cursor().position(), 20);

        let fresh = context.switch_stream("s2", &mut backend);
        let active = context.active_event_type().unwrap();
        assert_eq!(active.log().len(), 0);
        assert_eq!(context.surfaces().first().unwrap().cursor().position(), 0);
        assert_eq!(context.active_stream(), Some("s2"));

        // The old ingestor's scene updates no longer reach the main loop.
        let schema = ingestor.session().schemas().get("GameEntityInfo").unwrap();
        let payload = hotspot_codec::encode(schema, &Message::new()).unwrap();
        ingestor.on_message("s1:GameEntityInfo", &payload);
        fresh.on_message("s2:GameEntityInfo", &payload);
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(report.scene_updates, 1);
        assert_eq!(sink.0.first().unwrap().kind, SceneKind::Entity);
    }

    #[test]
    fn closed_stream_can_be_reopened() {
        let (mut context, mut backend) = context();
        let ingestor = context.switch_stream("s1", &mut backend);
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(0.0));
        let mut sink = CollectingSink::default();
        context.tick(Instant::now(), &mut backend, &mut sink);
        let clears = backend.clears;

        context.close_stream(&mut backend);
        assert!(context.active_stream().is_none());
        assert!(context.active_event_type().is_none());
        assert_eq!(backend.clears, clears + 1);
        assert_eq!(context.surfaces().first().unwrap().cursor().position(), 0);

        // Messages still routed to the abandoned session go nowhere.
        let schema = ingestor.session().schemas().get("GameEntityInfo").unwrap();
        let payload = hotspot_codec::encode(schema, &Message::new()).unwrap();
        ingestor.on_message("s1:GameEntityInfo", &payload);
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(1.0));
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert!(report.ui_dirty);
        assert_eq!(report.scene_updates, 0);
        assert_eq!(report.integration, IntegrationStats::default());

        // Closing twice is a no-op.
        context.close_stream(&mut backend);
        assert_eq!(backend.clears, clears + 1);

        context.switch_stream("s1", &mut backend);
        assert_eq!(context.active_stream(), Some("s1"));
        assert_eq!(context.active_event_type().unwrap().log().len(), 0);
    }

    #[test]
    fn changing_active_type_resets_surfaces() {
        let (mut context, mut backend) = context();
        let ingestor = context.switch_stream("s1", &mut backend);
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(0.0));
        let mut sink = CollectingSink::default();
        context.tick(Instant::now(), &mut backend, &mut sink);
        let clears = backend.clears;

        context
            .set_active_event_type(&damaged_key(), &mut backend)
            .unwrap();
        assert_eq!(backend.clears, clears);

        let attacker = EventTypeKey::new("PlayerDamaged", "attacker_position");
        context.set_active_event_type(&attacker, &mut backend).unwrap();
        assert_eq!(backend.clears, clears + 1);
        let surface = context.surfaces().first().unwrap();
        assert_eq!(surface.cursor().position(), 0);
        assert_eq!(surface.range().phase(), RangePhase::ReductionRequested);

        assert!(matches!(
            context.set_active_event_type(&EventTypeKey::new("Nope", "x"), &mut backend),
            Err(ViewerError::UnknownEventType(_))
        ));
    }

    #[test]
    fn hiding_a_value_reintegrates_without_it() {
        let (mut context, mut backend) = context();
        let ingestor = context.switch_stream("s1", &mut backend);
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(0.0));
        let mut sink = CollectingSink::default();
        context.tick(Instant::now(), &mut backend, &mut sink);

        let key = damaged_key();
        assert!(context
            .set_filter_visibility(&key, "weapon", &FilterKey::Int(1), false, &mut backend)
            .unwrap());
        assert!(!context
            .set_filter_visibility(&key, "weapon", &FilterKey::Int(1), false, &mut backend)
            .unwrap());
        // Team 2 is still visible, so the event is still accumulated.
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert!(report.ui_dirty);
        assert_eq!(report.integration.events, 1);

        context
            .set_filter_visibility(&key, "team", &FilterKey::Int(2), false, &mut backend)
            .unwrap();
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(report.integration.events, 0);
        assert_eq!(context.event_range(), EventRange::new(0.0, 0.0));

        assert!(matches!(
            context.set_filter_visibility(&key, "damage", &FilterKey::Int(1), false, &mut backend),
            Err(ViewerError::UntrackedField { .. })
        ));
    }

    #[test]
    fn operations_need_a_stream() {
        let (mut context, mut backend) = context();
        assert!(matches!(
            context.set_active_event_type(&damaged_key(), &mut backend),
            Err(ViewerError::NoActiveStream)
        ));
        let mut sink = CollectingSink::default();
        let report = context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(report.integration, IntegrationStats::default());
        assert_eq!(context.event_range(), EventRange::ZERO);
    }

    #[test]
    fn removing_a_surface_recomputes_aggregate() {
        let (mut context, mut backend) = context();
        let far = context.add_surface("far", Aabb::new(Vec3::new(100.0, -1.0, -1.0), Vec3::new(101.0, 1.0, 1.0)));
        let ingestor = context.switch_stream("s1", &mut backend);
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(0.0));
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(100.5));
        ingestor.on_message("s1:PlayerDamaged", &damaged_payload(100.5));
        let mut sink = CollectingSink::default();
        context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(context.event_range(), EventRange::new(0.0, 2.0));

        assert!(context.remove_surface(far));
        assert!(!context.remove_surface(far));
        context.tick(Instant::now(), &mut backend, &mut sink);
        assert_eq!(context.event_range(), EventRange::new(0.0, 1.0));
    }
}
