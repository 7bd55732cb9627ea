//! Incremental spatial integration.
//!
//! Each pass walks every surface's cursor forward through the active event
//! type's log. Records that touch the surface and pass the filter are
//! gathered into batches of at most [`MAX_EVENTS_PER_BATCH`] and handed to
//! the backend; the cursor then moves past the last record examined, so no
//! record is ever accumulated onto the same surface twice.
//!
//! The log and filter read locks are held for the whole pass. Appends made
//! by the ingestion task wait for the pass to finish and are picked up on
//! the next one.

use tracing::trace;

use crate::registry::EventType;
use crate::surface::{EventBatch, RenderBackend, Surface};

/// Largest number of events accumulated in one backend call.
pub const MAX_EVENTS_PER_BATCH: usize = 10;

/// Work done by one integration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    /// Backend accumulate calls issued.
    pub batches: usize,
    /// Events accumulated across all surfaces.
    pub events: usize,
    /// Records examined across all surfaces.
    pub examined: usize,
    /// Surfaces that received at least one batch.
    pub surfaces_touched: usize,
}

/// Integrate newly appended records of `event_type` into `surfaces`.
///
/// Surfaces are processed in ascending cursor order (the slice is sorted in
/// place). Every surface that receives data has its range refresh
/// triggered. Non-integrable event types are skipped.
pub fn integrate(
    event_type: &EventType,
    surfaces: &mut [Surface],
    backend: &mut dyn RenderBackend,
) -> IntegrationStats {
    let mut stats = IntegrationStats::default();
    if surfaces.is_empty() || !event_type.is_integrable() {
        return stats;
    }

    let log = event_type.log().read();
    let filters = event_type.filters().read();
    surfaces.sort_by_key(|s| s.cursor().position());

    let mut batch = EventBatch::new();
    for surface in surfaces.iter_mut() {
        let mut touched = false;
        while surface.cursor().position() < log.len() {
            batch.clear();
            let start = surface.cursor().position();
            let mut next = start;
            for (index, record) in log.iter_from(start) {
                next = index.saturating_add(1);
                stats.examined = stats.examined.saturating_add(1);
                if surface.is_relevant(record)
                    && filters.includes(&record.message)
                    && batch.push(record)
                {
                    break;
                }
            }

            if !batch.is_empty() {
                backend.accumulate(surface.id(), &batch);
                stats.batches = stats.batches.saturating_add(1);
                stats.events = stats.events.saturating_add(batch.len());
                touched = true;
            }
            surface.cursor_mut().advance_to(next);
        }

        if touched {
            stats.surfaces_touched = stats.surfaces_touched.saturating_add(1);
            surface.range_mut().trigger();
        }
    }

    if stats.batches > 0 {
        trace!(
            event_type = %event_type.key(),
            batches = stats.batches,
            events = stats.events,
            "Integrated events"
        );
    }
    stats
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use hotspot_codec::EnumTable;
    use hotspot_types::{Aabb, FilterKey, Message, Value, Vec3};
    use proptest::prelude::*;

    use super::*;
    use crate::filter::DirtyFlag;
    use crate::range::{RangePhase, ReadbackHandle};
    use crate::registry::{EventTypeKey, StreamSession};
    use crate::registry::tests::schema_table;
    use crate::surface::SurfaceId;

    /// Backend recording every accumulate call.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<(SurfaceId, Vec<Vec3>)>,
    }

    impl RenderBackend for RecordingBackend {
        fn accumulate(&mut self, surface: SurfaceId, batch: &EventBatch) {
            self.calls.push((surface, batch.positions().to_vec()));
        }

        fn clear(&mut self, _surface: SurfaceId) {}

        fn request_reduction(&mut self, _surface: SurfaceId) {}

        fn request_readback(&mut self, _surface: SurfaceId) -> ReadbackHandle {
            ReadbackHandle::ready(Vec::new())
        }
    }

    fn session() -> StreamSession {
        StreamSession::discover("s1", schema_table(), &Arc::new(DirtyFlag::new()))
    }

    fn damaged(session: &StreamSession) -> &Arc<EventType> {
        session
            .event_type(&EventTypeKey::new("PlayerDamaged", "position"))
            .unwrap()
    }

    fn push(event_type: &EventType, x: f32, weapon: i64) {
        let message = Message::new()
            .with("position", Value::Pos3(Vec3::new(x, 0.0, 0.0)))
            .with("damage", Value::Float(1.0))
            .with("weapon", Value::Int(weapon));
        event_type.ingest(&Arc::new(message), &EnumTable::new());
    }

    fn surface(id: u32, min_x: f32, max_x: f32) -> Surface {
        Surface::new(
            SurfaceId(id),
            format!("s{id}"),
            Aabb::new(Vec3::new(min_x, -1.0, -1.0), Vec3::new(max_x, 1.0, 1.0)),
            crate::range::RangeDriver::default(),
        )
    }

    #[test]
    fn fifteen_relevant_events_make_two_batches() {
        let session = session();
        let event_type = damaged(&session);
        for i in 0..15_u8 {
            push(event_type, f32::from(i), 1);
        }
        let mut surfaces = vec![surface(0, -100.0, 100.0)];
        let mut backend = RecordingBackend::default();

        let stats = integrate(event_type, &mut surfaces, &mut backend);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.events, 15);
        let sizes: Vec<usize> = backend.calls.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(sizes, vec![10, 5]);
        assert_eq!(surfaces.first().unwrap().cursor().position(), 15);
        assert_eq!(
            surfaces.first().unwrap().range().phase(),
            RangePhase::ReductionRequested
        );
    }

    #[test]
    fn second_pass_without_appends_is_a_no_op() {
        let session = session();
        let event_type = damaged(&session);
        for i in 0..4_u8 {
            push(event_type, f32::from(i), 1);
        }
        let mut surfaces = vec![surface(0, -100.0, 100.0)];
        let mut backend = RecordingBackend::default();
        integrate(event_type, &mut surfaces, &mut backend);
        let stats = integrate(event_type, &mut surfaces, &mut backend);
        assert_eq!(stats, IntegrationStats::default());
        assert_eq!(backend.calls.len(), 1);
    }

    #[test]
    fn irrelevant_events_still_advance_cursor() {
        let session = session();
        let event_type = damaged(&session);
        push(event_type, 50.0, 1);
        push(event_type, 60.0, 1);
        let mut surfaces = vec![surface(0, -1.0, 1.0)];
        let mut backend = RecordingBackend::default();
        let stats = integrate(event_type, &mut surfaces, &mut backend);
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.examined, 2);
        assert_eq!(surfaces.first().unwrap().cursor().position(), 2);
        assert_eq!(surfaces.first().unwrap().range().phase(), RangePhase::Idle);
    }

    #[test]
    fn hidden_values_are_skipped() {
        let session = session();
        let event_type = damaged(&session);
        push(event_type, 0.0, 1);
        push(event_type, 0.0, 2);
        event_type
            .filters()
            .set_visible("weapon", &FilterKey::Int(2), false);
        let mut surfaces = vec![surface(0, -1.0, 1.0)];
        let mut backend = RecordingBackend::default();
        let stats = integrate(event_type, &mut surfaces, &mut backend);
        assert_eq!(stats.events, 1);
        assert_eq!(surfaces.first().unwrap().cursor().position(), 2);
    }

    #[test]
    fn surfaces_are_visited_in_cursor_order() {
        let session = session();
        let event_type = damaged(&session);
        push(event_type, 0.0, 1);
        let mut surfaces = vec![surface(0, -1.0, 1.0), surface(1, -1.0, 1.0)];
        let mut backend = RecordingBackend::default();
        integrate(event_type, &mut surfaces[..1], &mut backend);

        push(event_type, 0.0, 1);
        backend.calls.clear();
        integrate(event_type, &mut surfaces, &mut backend);
        let order: Vec<SurfaceId> = backend.calls.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![SurfaceId(1), SurfaceId(0)]);
        assert!(surfaces.iter().all(|s| s.cursor().position() == 2));
    }

    #[test]
    fn non_integrable_type_is_skipped() {
        let session = session();
        let fired = session
            .event_type(&EventTypeKey::new("WeaponFired", "position"))
            .unwrap();
        let message = Message::new().with("position", Value::Pos3(Vec3::ZERO));
        fired.ingest(&Arc::new(message), &EnumTable::new());
        let mut surfaces = vec![surface(0, -1.0, 1.0)];
        let mut backend = RecordingBackend::default();
        assert_eq!(
            integrate(fired, &mut surfaces, &mut backend),
            IntegrationStats::default()
        );
        assert_eq!(surfaces.first().unwrap().cursor().position(), 0);
    }

    proptest! {
        #[test]
        fn batches_never_exceed_cap(xs in proptest::collection::vec(-20.0_f32..20.0, 0..60)) {
            let session = session();
            let event_type = damaged(&session);
            for &x in &xs {
                push(event_type, x, 1);
            }
            let mut surfaces = vec![surface(0, -5.0, 5.0), surface(1, 0.0, 15.0)];
            let mut backend = RecordingBackend::default();
            let stats = integrate(event_type, &mut surfaces, &mut backend);

            prop_assert!(backend.calls.iter().all(|(_, p)| !p.is_empty() && p.len() <= MAX_EVENTS_PER_BATCH));
            prop_assert!(surfaces.iter().all(|s| s.cursor().position() == xs.len()));

            // Every relevant record is accumulated exactly once per surface.
            let expected: usize = surfaces
                .iter()
                .map(|s| {
                    xs.iter()
                        .filter(|&&x| s.bounds().overlaps_sphere(Vec3::new(x, 0.0, 0.0), 2.0))
                        .count()
                })
                .sum();
            prop_assert_eq!(stats.events, expected);
        }
    }
}
