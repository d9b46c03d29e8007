use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use foundation::math::precision::StableF64;
use foundation::time::{TimeRange, TimeSpan};

/// Items stored in a [`TimeIndex`].
pub trait Timed {
    type Key: Copy + Eq + Hash + Ord + Debug;

    fn key(&self) -> Self::Key;

    /// `None` marks a timeless ("all time") item.
    fn span(&self) -> Option<TimeSpan>;
}

/// Per-call query flags. The index keeps no filtering state between calls,
/// so mixing flags across interleaved queries is safe.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IntersectOptions {
    /// Return timeless items alongside the time matches.
    pub include_timeless: bool,
    /// Ignore hold ranges.
    pub exclude_hold: bool,
}

impl Default for IntersectOptions {
    fn default() -> Self {
        Self {
            include_timeless: true,
            exclude_hold: false,
        }
    }
}

impl IntersectOptions {
    pub fn timed_only() -> Self {
        Self {
            include_timeless: false,
            exclude_hold: true,
        }
    }
}

struct Slot<T> {
    item: T,
    span: Option<TimeSpan>,
    dims: Vec<bool>,
}

struct Dimension<T> {
    name: String,
    accessor: Box<dyn Fn(&T) -> bool>,
    filter: Option<bool>,
}

/// Multidimensional index over time-stamped items.
///
/// Timed items are bucketed by start time; the largest stored duration
/// bounds how far before a window's start an overlapping item can begin, so
/// a range query scans `[start - max_duration, end)` instead of every item.
/// Named boolean dimensions exclude items from results without removing
/// them.
///
/// Ordering contract:
/// - `intersection` returns keys in ascending `Key` order.
pub struct TimeIndex<T: Timed> {
    slots: HashMap<T::Key, Slot<T>>,
    by_start: BTreeMap<StableF64, BTreeSet<T::Key>>,
    ends: BTreeMap<StableF64, usize>,
    durations: BTreeMap<StableF64, usize>,
    timeless: BTreeSet<T::Key>,
    dimensions: Vec<Dimension<T>>,
    holds: Vec<TimeRange>,
}

impl<T: Timed> Default for TimeIndex<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            by_start: BTreeMap::new(),
            ends: BTreeMap::new(),
            durations: BTreeMap::new(),
            timeless: BTreeSet::new(),
            dimensions: Vec::new(),
            holds: Vec::new(),
        }
    }
}

impl<T: Timed> Debug for TimeIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeIndex")
            .field("len", &self.slots.len())
            .field("timeless", &self.timeless.len())
            .field(
                "dimensions",
                &self.dimensions.iter().map(|d| &d.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Timed> TimeIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.slots.contains_key(&key)
    }

    /// Inserts items; an item whose key is already present replaces the old
    /// entry, so repeated adds are idempotent.
    pub fn add(&mut self, items: impl IntoIterator<Item = T>) -> usize {
        let mut n = 0;
        for item in items {
            let key = item.key();
            self.unlink(key);
            self.link(item);
            n += 1;
        }
        n
    }

    pub fn remove(&mut self, keys: impl IntoIterator<Item = T::Key>) -> usize {
        keys.into_iter().filter(|k| self.unlink(*k)).count()
    }

    /// Replaces an existing entry, re-evaluating its span and dimensions.
    /// Absent keys are ignored.
    pub fn update(&mut self, item: T) -> bool {
        let key = item.key();
        if !self.unlink(key) {
            return false;
        }
        self.link(item);
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_start.clear();
        self.ends.clear();
        self.durations.clear();
        self.timeless.clear();
    }

    /// Registers (or replaces) a named boolean dimension. Existing items are
    /// evaluated immediately. A new dimension starts unfiltered.
    pub fn add_dimension(&mut self, name: &str, accessor: impl Fn(&T) -> bool + 'static) {
        let accessor: Box<dyn Fn(&T) -> bool> = Box::new(accessor);
        match self.dimensions.iter().position(|d| d.name == name) {
            Some(idx) => {
                for slot in self.slots.values_mut() {
                    slot.dims[idx] = accessor(&slot.item);
                }
                self.dimensions[idx].accessor = accessor;
            }
            None => {
                for slot in self.slots.values_mut() {
                    slot.dims.push(accessor(&slot.item));
                }
                self.dimensions.push(Dimension {
                    name: name.to_string(),
                    accessor,
                    filter: None,
                });
            }
        }
    }

    /// Sets (`Some(value)`: keep only items whose dimension equals `value`)
    /// or clears (`None`) a dimension filter. Filters compose by AND.
    ///
    /// Returns `false` for an unknown dimension.
    pub fn filter_dimension(&mut self, name: &str, value: Option<bool>) -> bool {
        match self.dimensions.iter_mut().find(|d| d.name == name) {
            Some(d) => {
                d.filter = value;
                true
            }
            None => false,
        }
    }

    pub fn set_holds(&mut self, holds: Vec<TimeRange>) {
        self.holds = holds;
    }

    pub fn holds(&self) -> &[TimeRange] {
        &self.holds
    }

    /// Keys of items overlapping `range` that pass every dimension filter.
    ///
    /// `TimeRange::UNBOUNDED` returns every passing timed item. An empty
    /// index returns an empty list for any range.
    pub fn intersection(&self, range: TimeRange, opts: IntersectOptions) -> Vec<T::Key> {
        let mut hits: BTreeSet<T::Key> = BTreeSet::new();

        self.scan(range, &mut hits);
        if !opts.exclude_hold && !range.is_unbounded() {
            for hold in &self.holds {
                self.scan(*hold, &mut hits);
            }
        }

        if opts.include_timeless {
            for key in &self.timeless {
                if let Some(slot) = self.slots.get(key)
                    && self.passes(slot)
                {
                    hits.insert(*key);
                }
            }
        }

        hits.into_iter().collect()
    }

    /// Overall time bounds of timed items: min start to max end.
    ///
    /// Returns a zero-width span at epoch 0 when no timed item is present.
    pub fn range(&self) -> TimeSpan {
        match (self.by_start.keys().next(), self.ends.keys().next_back()) {
            (Some(start), Some(end)) => TimeSpan::new(start.0, end.0),
            _ => TimeSpan::new(0.0, 0.0),
        }
    }

    fn max_duration(&self) -> f64 {
        self.durations.keys().next_back().map_or(0.0, |d| d.0)
    }

    fn scan(&self, range: TimeRange, hits: &mut BTreeSet<T::Key>) {
        if range.is_unbounded() {
            for keys in self.by_start.values() {
                for key in keys {
                    if let Some(slot) = self.slots.get(key)
                        && self.passes(slot)
                    {
                        hits.insert(*key);
                    }
                }
            }
            return;
        }
        if range.is_empty() {
            return;
        }

        let lo = range.start - self.max_duration();
        if lo.is_nan() || !(lo < range.end) {
            return;
        }
        for keys in self.by_start.range(StableF64(lo)..StableF64(range.end)).map(|(_, v)| v) {
            for key in keys {
                let Some(slot) = self.slots.get(key) else {
                    continue;
                };
                let Some(span) = slot.span else { continue };
                if span.overlaps(range) && self.passes(slot) {
                    hits.insert(*key);
                }
            }
        }
    }

    fn passes(&self, slot: &Slot<T>) -> bool {
        self.dimensions
            .iter()
            .zip(&slot.dims)
            .all(|(d, v)| d.filter.is_none_or(|want| want == *v))
    }

    fn link(&mut self, item: T) {
        let key = item.key();
        let span = item.span();
        let dims = self.dimensions.iter().map(|d| (d.accessor)(&item)).collect();

        match span {
            Some(s) => {
                self.by_start
                    .entry(StableF64(s.start.0))
                    .or_default()
                    .insert(key);
                *self.ends.entry(StableF64(s.end.0)).or_insert(0) += 1;
                *self.durations.entry(StableF64(s.duration())).or_insert(0) += 1;
            }
            None => {
                self.timeless.insert(key);
            }
        }

        self.slots.insert(key, Slot { item, span, dims });
    }

    fn unlink(&mut self, key: T::Key) -> bool {
        let Some(slot) = self.slots.remove(&key) else {
            return false;
        };
        match slot.span {
            Some(s) => {
                let start = StableF64(s.start.0);
                if let Some(bucket) = self.by_start.get_mut(&start) {
                    bucket.remove(&key);
                    if bucket.is_empty() {
                        self.by_start.remove(&start);
                    }
                }
                decrement(&mut self.ends, StableF64(s.end.0));
                decrement(&mut self.durations, StableF64(s.duration()));
            }
            None => {
                self.timeless.remove(&key);
            }
        }
        true
    }
}

fn decrement(counts: &mut BTreeMap<StableF64, usize>, key: StableF64) {
    if let Some(n) = counts.get_mut(&key) {
        *n -= 1;
        if *n == 0 {
            counts.remove(&key);
        }
    }
}
