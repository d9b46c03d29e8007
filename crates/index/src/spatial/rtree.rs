use std::collections::HashMap;

use foundation::bounds::Extent;
use rstar::{AABB, RTree, RTreeObject};

use crate::key::RecordKey;

/// R-tree entry: a record key and its extent.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IndexedExtent {
    pub key: RecordKey,
    pub extent: Extent,
}

impl RTreeObject for IndexedExtent {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.extent.min, self.extent.max)
    }
}

/// Result of a bulk removal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RemoveOutcome {
    pub removed: usize,
    /// The tree was rebuilt from survivors instead of deleting one by one.
    pub rebuilt: bool,
}

/// Extent index over record keys.
///
/// Records with an empty or non-finite extent (tabular records) are not
/// indexed and never match a query.
///
/// Ordering contract:
/// - `query` returns keys in ascending order.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedExtent>,
    extents: HashMap<RecordKey, Extent>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        self.extents.contains_key(&key)
    }

    pub fn extent(&self, key: RecordKey) -> Option<Extent> {
        self.extents.get(&key).copied()
    }

    /// Indexes `key`, replacing any previous extent. Returns `false` when the
    /// extent is not indexable.
    pub fn insert(&mut self, key: RecordKey, extent: Extent) -> bool {
        self.remove(key);
        if !indexable(&extent) {
            return false;
        }
        self.tree.insert(IndexedExtent { key, extent });
        self.extents.insert(key, extent);
        true
    }

    pub fn remove(&mut self, key: RecordKey) -> bool {
        let Some(extent) = self.extents.remove(&key) else {
            return false;
        };
        self.tree.remove(&IndexedExtent { key, extent }).is_some()
    }

    /// Removes many keys. When more than `rebuild_threshold` keys are
    /// requested, the survivors are bulk-loaded into a fresh tree instead.
    pub fn remove_many(
        &mut self,
        keys: impl IntoIterator<Item = RecordKey>,
        rebuild_threshold: usize,
    ) -> RemoveOutcome {
        let keys: Vec<RecordKey> = keys.into_iter().collect();
        if keys.len() <= rebuild_threshold {
            let removed = keys.into_iter().filter(|k| self.remove(*k)).count();
            return RemoveOutcome {
                removed,
                rebuilt: false,
            };
        }

        let removed = keys
            .iter()
            .filter(|k| self.extents.remove(k).is_some())
            .count();
        self.rebuild();
        tracing::debug!(
            removed,
            survivors = self.extents.len(),
            "spatial index rebuilt"
        );
        RemoveOutcome {
            removed,
            rebuilt: true,
        }
    }

    /// Bulk-loads a fresh tree from the tracked extents.
    pub fn rebuild(&mut self) {
        let entries: Vec<IndexedExtent> = self
            .extents
            .iter()
            .map(|(key, extent)| IndexedExtent {
                key: *key,
                extent: *extent,
            })
            .collect();
        self.tree = RTree::bulk_load(entries);
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.extents.clear();
    }

    /// Keys whose extent intersects `query` (closed bounds).
    pub fn query(&self, query: &Extent) -> Vec<RecordKey> {
        if !indexable(query) {
            return Vec::new();
        }
        let envelope = AABB::from_corners(query.min, query.max);
        let mut keys: Vec<RecordKey> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.key)
            .collect();
        keys.sort_unstable();
        keys
    }
}

fn indexable(extent: &Extent) -> bool {
    !extent.is_empty() && extent.min.iter().chain(&extent.max).all(|v| v.is_finite())
}
