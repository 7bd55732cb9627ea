//! Append-only record log, one per event type.
//!
//! The ingestion task appends while the main loop reads. Appends take the
//! write lock for the duration of a single push; readers hold a
//! [`EventLogReader`] guard for a whole integration pass so the records
//! they examine cannot move underneath them. Indices are stable for the
//! lifetime of the log.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hotspot_types::{Message, Vec3};
use parking_lot::{RwLock, RwLockReadGuard};

/// A decoded event with its point-event scalars extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// The decoded message, shared with the filter bookkeeping.
    pub message: Arc<Message>,
    /// World-space position.
    pub position: Vec3,
    /// Influence radius.
    pub radius: f32,
    /// Accumulation weight.
    pub weight: f32,
}

/// Ordered, append-only sequence of [`EventRecord`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
    len: AtomicUsize,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its index.
    pub fn append(&self, record: EventRecord) -> usize {
        let mut records = self.records.write();
        let index = records.len();
        records.push(record);
        self.len.store(records.len(), Ordering::Release);
        index
    }

    /// Number of records appended so far.
    ///
    /// Lock-free; may lag a concurrent append by one record.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the record at `index`.
    pub fn get(&self, index: usize) -> Option<EventRecord> {
        self.records.read().get(index).cloned()
    }

    /// Hold the log open for reading.
    pub fn read(&self) -> EventLogReader<'_> {
        EventLogReader {
            records: self.records.read(),
        }
    }
}

/// Read guard over an [`EventLog`]. Appends block while it is alive.
pub struct EventLogReader<'a> {
    records: RwLockReadGuard<'a, Vec<EventRecord>>,
}

impl EventLogReader<'_> {
    /// Number of records visible through this guard.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Option<&EventRecord> {
        self.records.get(index)
    }

    /// Records from `start` to the end, paired with their indices.
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (usize, &EventRecord)> {
        self.records
            .get(start..)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(move |(offset, record)| (start.saturating_add(offset), record))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(x: f32) -> EventRecord {
        EventRecord {
            message: Arc::new(Message::new()),
            position: Vec3::new(x, 0.0, 0.0),
            radius: 1.0,
            weight: 1.0,
        }
    }

    #[test]
    fn append_returns_sequential_indices() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.append(record(0.0)), 0);
        assert_eq!(log.append(record(1.0)), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().position.x.to_bits(), 1.0_f32.to_bits());
        assert!(log.get(2).is_none());
    }

    #[test]
    fn iter_from_past_end_is_empty() {
        let log = EventLog::new();
        log.append(record(0.0));
        let reader = log.read();
        assert_eq!(reader.iter_from(1).count(), 0);
        assert_eq!(reader.iter_from(5).count(), 0);
        let indices: Vec<usize> = reader.iter_from(0).map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn concurrent_appenders_lose_nothing() {
        let log = Arc::new(EventLog::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..250_u16 {
                        log.append(record(f32::from(i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 1000);
        assert_eq!(log.read().len(), 1000);
    }

    #[test]
    fn reader_scan_races_appender_in_order() {
        const TOTAL: usize = 20_000;
        let log = Arc::new(EventLog::new());
        let appender = {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..TOTAL {
                    log.append(record(i as f32));
                }
            })
        };

        let mut cursor = 0;
        let mut seen = 0_usize;
        while cursor < TOTAL {
            let reader = log.read();
            for (index, rec) in reader.iter_from(cursor) {
                assert_eq!(index, cursor);
                assert_eq!(rec.position.x.to_bits(), (index as f32).to_bits());
                cursor = index.saturating_add(1);
                seen = seen.saturating_add(1);
            }
            drop(reader);
            std::thread::yield_now();
        }
        appender.join().unwrap();
        assert_eq!(seen, TOTAL);
        assert_eq!(log.len(), TOTAL);
    }

    proptest! {
        #[test]
        fn resumed_scans_see_every_record_once(batches in proptest::collection::vec(0_usize..20, 1..30)) {
            let log = EventLog::new();
            let mut cursor = 0;
            let mut seen = Vec::new();
            let mut appended = 0_usize;
            for batch in batches {
                for _ in 0..batch {
                    prop_assert_eq!(log.append(record(appended as f32)), appended);
                    appended = appended.saturating_add(1);
                }
                let reader = log.read();
                for (index, _) in reader.iter_from(cursor) {
                    seen.push(index);
                    cursor = index.saturating_add(1);
                }
            }
            prop_assert_eq!(seen, (0..appended).collect::<Vec<_>>());
            prop_assert_eq!(log.len(), appended);
        }
    }
}
