//! Per-event-type filter bookkeeping.
//!
//! Every tracked field of an event type remembers each distinct value it has
//! seen together with a display label and a visibility flag. Values are
//! visible until the user hides them.
//!
//! # Inclusion rule
//!
//! A record passes the filter when any of the following holds:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | The event type tracks no fields | included |
//! | The record carries no value for any tracked field | included |
//! | Any tracked field's value on the record is visible | included |
//! | Otherwise | excluded |
//!
//! Fields are combined with OR: hiding a weapon does not hide an event whose
//! team is still visible.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hotspot_types::{FilterKey, Message, Value};
use parking_lot::{RwLock, RwLockReadGuard};

/// A flag raised by the ingestion task and consumed by the main loop.
#[derive(Debug, Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    /// Create a lowered flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raise the flag.
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lower the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Whether the flag is raised.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A distinct value seen on a tracked field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    /// Display label.
    pub label: String,
    /// Whether records carrying this value are shown.
    pub visible: bool,
}

#[derive(Debug)]
struct TrackedField {
    name: String,
    values: BTreeMap<FilterKey, FieldValue>,
}

impl TrackedField {
    fn find<'a>(fields: &'a [Self], name: &str) -> Option<&'a Self> {
        fields.iter().find(|f| f.name == name)
    }

    fn find_mut<'a>(fields: &'a mut [Self], name: &str) -> Option<&'a mut Self> {
        fields.iter_mut().find(|f| f.name == name)
    }
}

/// Filter state for one event type.
#[derive(Debug)]
pub struct FieldFilterState {
    fields: RwLock<Vec<TrackedField>>,
    dirty: Arc<DirtyFlag>,
}

impl FieldFilterState {
    /// Track the named fields. `dirty` is raised whenever a new value is seen.
    pub fn new<I, S>(tracked: I, dirty: Arc<DirtyFlag>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = tracked
            .into_iter()
            .map(|name| TrackedField {
                name: name.into(),
                values: BTreeMap::new(),
            })
            .collect();
        Self {
            fields: RwLock::new(fields),
            dirty,
        }
    }

    /// Names of the tracked fields in declaration order.
    pub fn tracked_fields(&self) -> Vec<String> {
        self.fields.read().iter().map(|f| f.name.clone()).collect()
    }

    /// Whether `field` is tracked.
    pub fn is_tracked(&self, field: &str) -> bool {
        TrackedField::find(&self.fields.read(), field).is_some()
    }

    /// Record that `value` was seen on `field`.
    ///
    /// New values start visible and raise the dirty flag; `label` is only
    /// evaluated for them. Untracked fields are ignored. Returns whether the
    /// value was new.
    pub fn observe(&self, field: &str, value: &Value, label: impl FnOnce() -> String) -> bool {
        let key = value.filter_key();
        if let Some(tracked) = TrackedField::find(&self.fields.read(), field) {
            if tracked.values.contains_key(&key) {
                return false;
            }
        } else {
            return false;
        }

        let mut fields = self.fields.write();
        let Some(tracked) = TrackedField::find_mut(&mut fields, field) else {
            return false;
        };
        if tracked.values.contains_key(&key) {
            return false;
        }
        tracked.values.insert(
            key,
            FieldValue {
                label: label(),
                visible: true,
            },
        );
        self.dirty.mark();
        true
    }

    /// Observe every tracked field present on `message`.
    ///
    /// Returns the number of new values.
    pub fn observe_message(&self, message: &Message, label: impl Fn(&str, &Value) -> String) -> usize {
        let names = self.tracked_fields();
        names
            .iter()
            .filter_map(|name| message.get(name).map(|value| (name, value)))
            .filter(|(name, value)| self.observe(name, value, || label(name, value)))
            .count()
    }

    /// Whether `value` is visible on `field`. Unseen values and untracked
    /// fields are visible.
    pub fn is_visible(&self, field: &str, value: &FilterKey) -> bool {
        TrackedField::find(&self.fields.read(), field)
            .and_then(|f| f.values.get(value))
            .is_none_or(|v| v.visible)
    }

    /// Change the visibility of a seen value.
    ///
    /// Returns whether anything changed; unseen values and untracked fields
    /// are left alone. The dirty flag is not raised.
    pub fn set_visible(&self, field: &str, value: &FilterKey, visible: bool) -> bool {
        let mut fields = self.fields.write();
        let Some(entry) =
            TrackedField::find_mut(&mut fields, field).and_then(|f| f.values.get_mut(value))
        else {
            return false;
        };
        if entry.visible == visible {
            return false;
        }
        entry.visible = visible;
        true
    }

    /// Distinct values seen on `field`, ordered by key.
    pub fn values(&self, field: &str) -> Vec<(FilterKey, FieldValue)> {
        TrackedField::find(&self.fields.read(), field)
            .map(|f| {
                f.values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hold the filter table open for a pass over many records.
    pub fn read(&self) -> FilterReader<'_> {
        FilterReader {
            fields: self.fields.read(),
        }
    }

    /// Evaluate the inclusion rule for a single message.
    pub fn includes(&self, message: &Message) -> bool {
        self.read().includes(message)
    }
}

/// Read guard over a [`FieldFilterState`].
pub struct FilterReader<'a> {
    fields: RwLockReadGuard<'a, Vec<TrackedField>>,
}

impl FilterReader<'_> {
    /// Whether `message` passes the inclusion rule.
    pub fn includes(&self, message: &Message) -> bool {
        let mut carries_tracked = false;
        for field in self.fields.iter() {
            let Some(value) = message.get(&field.name) else {
                continue;
            };
            carries_tracked = true;
            if field.values.get(&value.filter_key()).is_none_or(|v| v.visible) {
                return true;
            }
        }
        !carries_tracked
    }
}
