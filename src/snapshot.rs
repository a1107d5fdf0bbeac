use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::config::TimeUnit;

struct Entry {
    value: f64,
    unit: TimeUnit,
}

/// A point-in-time view of every registered metric's computed value.
///
/// Serializes as a flat `name -> value` map.
#[derive(Default)]
pub struct Snapshot {
    entries: HashMap<String, Entry, FnvBuildHasher>,
}

impl Snapshot {
    /// Gets the computed value for the given metric name.
    ///
    /// Returns `None` if the metric was not registered when the snapshot was
    /// taken.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.entries.get(name).map(|e| e.value)
    }

    /// Gets the rate-normalization unit of the given metric's config.
    pub fn unit(&self, name: &str) -> Option<TimeUnit> {
        self.entries.get(name).map(|e| e.unit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets a collection of the metric names and values.
    pub fn values(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value))
            .collect()
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, &entry.value)?;
        }
        map.end()
    }
}

/// Builder for creating a snapshot.
pub(crate) struct SnapshotBuilder {
    inner: Snapshot,
}

impl SnapshotBuilder {
    pub(crate) fn new() -> SnapshotBuilder {
        SnapshotBuilder {
            inner: Default::default(),
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: f64, unit: TimeUnit) {
        self.inner.entries.insert(name.to_owned(), Entry { value, unit });
    }

    pub(crate) fn into_inner(self) -> Snapshot {
        self.inner
    }
}
