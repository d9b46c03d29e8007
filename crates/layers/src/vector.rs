use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use foundation::bounds::Extent;
use foundation::ids::RecordId;
use foundation::time::{TimeRange, TimeSpan};
use geometry::{Geometry, SpatialPredicate, normalize};
use index::{IntersectOptions, KeySet, OrderedSelection, RecordKey, SpatialIndex, TimeIndex, Timed};
use runtime::{BatchQueue, EventBus, FrameBudget, ListenerKey, Metrics};

use crate::animation::AnimationState;
use crate::color::{ColorModel, Legend, Rgba};
use crate::config::{LayerConfig, SourceConfig};
use crate::context::{FeatureStyle, SourceContext};
use crate::error::SourceError;
use crate::event::{RenderPath, SourceEvent};
use crate::layer::{Layer, LayerId};
use crate::record::{AttrValue, Record};

pub const HIDDEN_DIMENSION: &str = "hidden";

/// Time index entry for one record.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimeEntry {
    pub key: RecordKey,
    pub span: Option<TimeSpan>,
    pub hidden: bool,
}

impl Timed for TimeEntry {
    type Key = RecordKey;

    fn key(&self) -> RecordKey {
        self.key
    }

    fn span(&self) -> Option<TimeSpan> {
        self.span
    }
}

/// Feature store for one vector layer.
///
/// Per-record side effects (id assignment, shown flag, geometry
/// normalization, spatial index) are applied when records arrive. Derived
/// state (time index entries, column set, labels, legend) is finalized by
/// the debounced ingestion and eviction queues, which fire on [`tick`],
/// on [`process_now`]/[`unprocess_now`], or when the outermost explicit
/// batch commits.
///
/// Invariants:
/// - every selected key is a live, shown record;
/// - `shown` only holds live keys;
/// - every live record with a finalized add has exactly one time index
///   entry.
///
/// After [`dispose`] every public call is a no-op.
///
/// [`tick`]: VectorSource::tick
/// [`process_now`]: VectorSource::process_now
/// [`unprocess_now`]: VectorSource::unprocess_now
/// [`dispose`]: VectorSource::dispose
pub struct VectorSource {
    pub(crate) id: LayerId,
    pub(crate) config: SourceConfig,
    pub(crate) layer: LayerConfig,
    pub(crate) ctx: Rc<SourceContext>,
    pub(crate) events: EventBus<SourceEvent>,
    pub(crate) metrics: Metrics,

    pub(crate) records: BTreeMap<RecordKey, Record>,
    pub(crate) ids: HashMap<RecordId, RecordKey>,
    pub(crate) shown: KeySet,
    pub(crate) selected: OrderedSelection,
    pub(crate) dynamic: KeySet,
    pub(crate) spatial: SpatialIndex,
    pub(crate) time: TimeIndex<TimeEntry>,
    /// Bumped on every time index mutation; keys the animation cache.
    pub(crate) time_generation: u64,

    pub(crate) process_queue: BatchQueue<RecordKey>,
    pub(crate) unprocess_queue: BatchQueue<(RecordKey, RecordId)>,

    pub(crate) columns: BTreeSet<String>,
    pub(crate) legend: Option<Legend>,
    pub(crate) animation: AnimationState,
    pub(crate) predicate: SpatialPredicate,

    pub(crate) visible: bool,
    pub(crate) disposed: bool,
    next_key: u32,
    /// Keys released by finalized removals, reused lowest first.
    free_keys: BTreeSet<RecordKey>,
    next_auto_id: i64,
    last_alert_ms: HashMap<&'static str, u64>,
}

impl std::fmt::Debug for VectorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSource")
            .field("id", &self.id)
            .field("records", &self.records.len())
            .field("selected", &self.selected.len())
            .field("pending_process", &self.process_queue.len())
            .field("pending_unprocess", &self.unprocess_queue.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl VectorSource {
    pub fn new(id: LayerId, config: SourceConfig, ctx: Rc<SourceContext>) -> Self {
        let mut time = TimeIndex::new();
        time.add_dimension(HIDDEN_DIMENSION, |e: &TimeEntry| e.hidden);
        time.filter_dimension(HIDDEN_DIMENSION, Some(false));

        Self {
            id,
            process_queue: BatchQueue::new(config.batch_delay_ms),
            unprocess_queue: BatchQueue::new(config.batch_delay_ms),
            config,
            layer: LayerConfig::default(),
            ctx,
            events: EventBus::new(),
            metrics: Metrics::new(),
            records: BTreeMap::new(),
            ids: HashMap::new(),
            shown: KeySet::new(),
            selected: OrderedSelection::new(),
            dynamic: KeySet::new(),
            spatial: SpatialIndex::new(),
            time,
            time_generation: 0,
            columns: BTreeSet::new(),
            legend: None,
            animation: AnimationState::new(),
            predicate: SpatialPredicate::default(),
            visible: true,
            disposed: false,
            next_key: 0,
            free_keys: BTreeSet::new(),
            next_auto_id: 1,
            last_alert_ms: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn layer_config(&self) -> &LayerConfig {
        &self.layer
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_process(&self) -> usize {
        self.process_queue.len()
    }

    pub fn pending_unprocess(&self) -> usize {
        self.unprocess_queue.len()
    }

    pub fn listen(&mut self, listener: impl FnMut(&SourceEvent) + 'static) -> ListenerKey {
        self.events.listen(listener)
    }

    pub fn unlisten(&mut self, key: ListenerKey) -> bool {
        self.events.unlisten(key)
    }

    pub fn record(&self, key: RecordKey) -> Option<&Record> {
        self.records.get(&key)
    }

    pub fn key_of(&self, id: &RecordId) -> Option<RecordKey> {
        self.ids.get(id).copied()
    }

    pub fn record_by_id(&self, id: &RecordId) -> Option<&Record> {
        self.key_of(id).and_then(|k| self.records.get(&k))
    }

    /// Live records in key order.
    pub fn records(&self) -> impl Iterator<Item = (RecordKey, &Record)> + '_ {
        self.records.iter().map(|(k, r)| (*k, r))
    }

    /// Attribute names seen across finalized records.
    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub(crate) fn emit(&mut self, event: SourceEvent) {
        self.events.emit(&event);
    }

    pub(crate) fn render_path(&self) -> RenderPath {
        if self.ctx.map.webgl_enabled() {
            RenderPath::WebGl
        } else {
            RenderPath::Overlay2d
        }
    }

    /// True when an alert of `kind` may be raised now; arms the window.
    pub(crate) fn should_alert(&mut self, kind: &'static str) -> bool {
        let now = self.ctx.clock.now_ms();
        let due = self
            .last_alert_ms
            .get(kind)
            .is_none_or(|last| now.saturating_sub(*last) >= self.config.alert_window_ms);
        if due {
            self.last_alert_ms.insert(kind, now);
        }
        due
    }

    // ---- ingestion --------------------------------------------------------

    /// Accepts records into the store. Returns how many were admitted.
    ///
    /// Records beyond the shared feature cap are dropped and reported with
    /// a `CapacityExceeded` event. A record whose id is already present
    /// replaces the stored one when `replace_duplicates` is set and is
    /// skipped otherwise.
    pub fn add_records(&mut self, records: Vec<Record>) -> usize {
        if self.disposed || records.is_empty() {
            return 0;
        }
        let requested = records.len();
        let now = self.ctx.clock.now_ms();

        let mut accepted: Vec<RecordKey> = Vec::with_capacity(records.len());
        let mut replaced: Vec<(RecordKey, RecordId)> = Vec::new();
        let mut dropped = 0usize;
        let mut skipped = 0usize;

        for mut record in records {
            let id = self.resolve_id(&record);
            match self.ids.get(&id).copied() {
                Some(_) if !self.config.replace_duplicates => {
                    skipped += 1;
                    continue;
                }
                // The replacement inherits the old record's slot in the cap.
                Some(old) => {
                    if let Some(old_id) = self.strip(old) {
                        self.spatial.remove(old);
                        // Admitted earlier in this call: never announced, so
                        // it leaves without an eviction.
                        if let Some(pos) = accepted.iter().position(|k| *k == old) {
                            accepted.remove(pos);
                            self.free_keys.insert(old);
                        } else {
                            replaced.push((old, old_id));
                        }
                    }
                }
                None => {
                    if self.ctx.limit.admit(1) == 0 {
                        dropped += 1;
                        continue;
                    }
                }
            }

            let Some(key) = self.allocate_key() else {
                self.ctx.limit.release(1);
                tracing::error!(layer = %self.id, id = ?id, "record key space exhausted");
                dropped += 1;
                continue;
            };

            record.id = Some(id.clone());
            self.prepare_record(&mut record);

            self.ids.insert(id, key);
            self.shown.insert(key);
            if record.is_dynamic() {
                self.dynamic.insert(key);
            }
            if let Some(g) = &record.geometry {
                self.spatial.insert(key, g.extent());
            }
            self.records.insert(key, record);
            accepted.push(key);
        }

        if dropped > 0 {
            self.metrics.inc("records.dropped", dropped as u64);
            let alert = self.should_alert("capacity");
            if alert {
                tracing::warn!(
                    layer = %self.id,
                    requested,
                    dropped,
                    cap = self.ctx.limit.cap(),
                    "feature limit reached, records dropped"
                );
            }
            self.emit(SourceEvent::CapacityExceeded {
                requested,
                dropped,
                alert,
            });
        }
        if skipped > 0 {
            tracing::debug!(layer = %self.id, skipped, "duplicate records skipped");
        }

        if !replaced.is_empty() {
            self.finish_strip(&replaced, now);
        }
        if accepted.is_empty() {
            return 0;
        }

        self.metrics.inc("records.added", accepted.len() as u64);
        self.emit(SourceEvent::Preprocess {
            keys: accepted.clone(),
        });
        let n = accepted.len();
        self.process_queue.extend(accepted, now);
        n
    }

    /// Next free key; `None` once the key space is used up.
    fn allocate_key(&mut self) -> Option<RecordKey> {
        if let Some(key) = self.free_keys.pop_first() {
            return Some(key);
        }
        let key = RecordKey(self.next_key);
        self.next_key = self.next_key.checked_add(1)?;
        Some(key)
    }

    fn resolve_id(&mut self, record: &Record) -> RecordId {
        if let Some(id) = &record.id {
            return id.clone();
        }
        if let Some(column) = &self.layer.unique_id
            && let Some(id) = record.attr(column).and_then(AttrValue::to_record_id)
        {
            return id;
        }
        while self.ids.contains_key(&RecordId::Num(self.next_auto_id)) {
            self.next_auto_id += 1;
        }
        let id = RecordId::Num(self.next_auto_id);
        self.next_auto_id += 1;
        id
    }

    /// Per-record work done at enqueue time.
    fn prepare_record(&mut self, record: &mut Record) {
        record.sanitize_time();

        if let Some(g) = record.geometry.take() {
            match normalize(g) {
                Ok(g) => record.geometry = Some(g),
                Err(error) => {
                    self.metrics.inc("records.degraded", 1);
                    tracing::debug!(
                        layer = %self.id,
                        id = ?record.id,
                        %error,
                        "geometry degraded to tabular"
                    );
                }
            }
        }
        if record.geometry.is_none()
            && let Some(start) = record.track.as_ref().and_then(|t| t.0.first())
        {
            record.geometry = Some(Geometry::Point(start.coord));
        }

        if self.config.derive_coordinate_fields
            && let Some([lon, lat]) = record.geometry.as_ref().and_then(Geometry::as_point)
        {
            record.attributes.insert("LAT".to_string(), AttrValue::Number(lat));
            record.attributes.insert("LON".to_string(), AttrValue::Number(lon));
        }
    }

    // ---- eviction ---------------------------------------------------------

    /// Removes records by id. Unknown ids are ignored. Returns how many
    /// records were removed.
    ///
    /// Removing more than `bulk_remove_threshold` records at once rebuilds
    /// the spatial index from the survivors.
    pub fn remove_records(&mut self, ids: &[RecordId]) -> usize {
        if self.disposed {
            return 0;
        }
        let mut seen = KeySet::new();
        let keys: Vec<RecordKey> = ids
            .iter()
            .filter_map(|id| self.ids.get(id).copied())
            .filter(|k| seen.insert(*k))
            .collect();
        if keys.is_empty() {
            return 0;
        }

        let bulk = keys.len() > self.config.bulk_remove_threshold;
        if bulk {
            // The rebuild below must see a fully finalized store.
            self.process_now();
        }

        let mut removed: Vec<(RecordKey, RecordId)> = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(id) = self.strip(*key) {
                if !bulk {
                    self.spatial.remove(*key);
                }
                removed.push((*key, id));
            }
        }
        if bulk {
            let outcome = self
                .spatial
                .remove_many(keys.iter().copied(), self.config.bulk_remove_threshold);
            if outcome.rebuilt {
                self.metrics.inc("spatial.rebuilds", 1);
                tracing::debug!(
                    layer = %self.id,
                    removed = outcome.removed,
                    survivors = self.spatial.len(),
                    "spatial index rebuilt"
                );
            }
        }

        self.ctx.limit.release(removed.len());
        self.metrics.inc("records.removed", removed.len() as u64);
        let n = removed.len();
        let now = self.ctx.clock.now_ms();
        self.finish_strip(&removed, now);
        n
    }

    /// Drops a record from the primary maps. The spatial index is left to
    /// the caller so bulk paths can rebuild it instead.
    fn strip(&mut self, key: RecordKey) -> Option<RecordId> {
        let record = self.records.remove(&key)?;
        let id = record.id?;
        self.ids.remove(&id);
        self.shown.remove(key);
        self.dynamic.remove(key);
        self.animation.forget(key);
        Some(id)
    }

    /// Selection fallout and eviction queueing shared by remove and replace.
    fn finish_strip(&mut self, removed: &[(RecordKey, RecordId)], now: u64) {
        let keys = KeySet::from_keys(removed.iter().map(|(k, _)| *k));
        let deselected = self.selected.remove_all(&keys);
        if !deselected.is_empty() {
            self.emit(SourceEvent::SelectionChanged {
                added: Vec::new(),
                removed: deselected,
            });
        }
        self.unprocess_queue.extend(removed.iter().cloned(), now);
    }

    // ---- pipeline ---------------------------------------------------------

    /// Fires whichever timers are due: ingestion first, then eviction.
    pub fn tick(&mut self) {
        if self.disposed {
            return;
        }
        let now = self.ctx.clock.now_ms();
        if self.process_queue.is_due(now) {
            let mut budget = self.flush_budget();
            let keys = self.process_queue.take_budgeted(&mut budget);
            self.finalize_added(keys);
        }
        if self.unprocess_queue.is_due(now) {
            let mut budget = self.flush_budget();
            let removed = self.unprocess_queue.take_budgeted(&mut budget);
            self.finalize_removed(removed);
        }
    }

    fn flush_budget(&self) -> FrameBudget {
        self.config
            .flush_budget
            .map_or_else(FrameBudget::unlimited, FrameBudget::new)
    }

    /// Finalizes every queued addition now.
    pub fn process_now(&mut self) {
        if self.disposed {
            return;
        }
        let keys = self.process_queue.take_all();
        self.finalize_added(keys);
    }

    /// Finalizes every queued removal now.
    pub fn unprocess_now(&mut self) {
        if self.disposed {
            return;
        }
        let removed = self.unprocess_queue.take_all();
        self.finalize_removed(removed);
    }

    /// Suspends timer-driven flushing until the matching `commit_batch`.
    pub fn begin_batch(&mut self) {
        if self.disposed {
            return;
        }
        self.process_queue.begin_batch();
        self.unprocess_queue.begin_batch();
    }

    /// Closes one batch level; the outermost commit finalizes both queues.
    pub fn commit_batch(&mut self) {
        if self.disposed {
            return;
        }
        let outermost = self.process_queue.commit_batch();
        self.unprocess_queue.commit_batch();
        if outermost {
            self.process_now();
            self.unprocess_now();
        }
    }

    fn finalize_added(&mut self, keys: Vec<RecordKey>) {
        // A reused key can still be queued for the record that held it
        // before; finalize each live key once.
        let mut seen = KeySet::new();
        let keys: Vec<RecordKey> = keys
            .into_iter()
            .filter(|k| self.records.contains_key(k) && !self.time.contains(*k))
            .filter(|k| seen.insert(*k))
            .collect();
        if keys.is_empty() {
            return;
        }

        let entries: Vec<TimeEntry> = keys
            .iter()
            .filter_map(|k| {
                self.records.get(k).map(|r| TimeEntry {
                    key: *k,
                    span: r.time,
                    hidden: !self.shown.contains(*k),
                })
            })
            .collect();
        self.time.add(entries);
        self.time_generation += 1;

        for key in &keys {
            if let Some(r) = self.records.get(key) {
                self.columns.extend(r.attributes.keys().cloned());
            }
        }

        if self.rebuild_legend() {
            self.restyle(self.records.keys().copied().collect::<Vec<_>>());
        } else {
            self.restyle(keys.iter().copied());
        }
        self.ctx.styler.refresh_labels(self.id, &keys);

        self.metrics.inc("flush.process", 1);
        self.metrics.observe("flush.size", keys.len() as u64);
        self.metrics.set_gauge("records.live", self.records.len() as i64);
        tracing::debug!(
            layer = %self.id,
            count = keys.len(),
            pending = self.process_queue.len(),
            "ingestion flush"
        );
        self.emit(SourceEvent::FeaturesAdded { keys });

        if self.animation.is_enabled() {
            self.refresh_animation();
        }
    }

    fn finalize_removed(&mut self, removed: Vec<(RecordKey, RecordId)>) {
        if removed.is_empty() {
            return;
        }
        self.time.remove(removed.iter().map(|(k, _)| *k));
        self.time_generation += 1;
        self.animation.invalidate();
        self.free_keys.extend(
            removed
                .iter()
                .map(|(k, _)| *k)
                .filter(|k| !self.records.contains_key(k)),
        );

        self.metrics.inc("flush.unprocess", 1);
        self.metrics.observe("flush.size", removed.len() as u64);
        self.metrics.set_gauge("records.live", self.records.len() as i64);
        tracing::debug!(
            layer = %self.id,
            count = removed.len(),
            pending = self.unprocess_queue.len(),
            "eviction flush"
        );
        self.emit(SourceEvent::FeaturesRemoved { removed });
    }

    // ---- time ---------------------------------------------------------

    /// Live, non-hidden records overlapping `range`.
    pub fn intersection(&self, range: TimeRange, opts: IntersectOptions) -> Vec<RecordKey> {
        self.time
            .intersection(range, opts)
            .into_iter()
            .filter(|k| self.records.contains_key(k))
            .collect()
    }

    /// Min start and max end over timed records, after draining both
    /// queues.
    pub fn time_range(&mut self) -> TimeSpan {
        self.process_now();
        self.unprocess_now();
        self.time.range()
    }

    pub fn set_hold_ranges(&mut self, holds: Vec<TimeRange>) {
        if self.disposed {
            return;
        }
        self.time.set_holds(holds);
        self.time_generation += 1;
        if self.animation.is_enabled() {
            self.refresh_animation();
        }
    }

    pub(crate) fn sync_time_entry(&mut self, key: RecordKey) {
        if !self.time.contains(key) {
            return;
        }
        let Some(record) = self.records.get(&key) else {
            return;
        };
        let entry = TimeEntry {
            key,
            span: record.time,
            hidden: !self.shown.contains(key),
        };
        self.time.update(entry);
        self.time_generation += 1;
    }

    // ---- style ----------------------------------------------------------

    pub fn set_color_model(&mut self, model: Option<ColorModel>) {
        if self.disposed {
            return;
        }
        self.layer.color_model = model;
        self.rebuild_legend();
        self.restyle(self.records.keys().copied().collect::<Vec<_>>());
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn color_of(&self, key: RecordKey) -> Option<Rgba> {
        let record = self.records.get(&key)?;
        self.color_of_record(record)
    }

    fn color_of_record(&self, record: &Record) -> Option<Rgba> {
        let model = self.layer.color_model.as_ref()?;
        self.legend.as_ref()?.color(record.attr(&model.attribute))
    }

    /// Recomputes the legend; returns `true` when it changed.
    fn rebuild_legend(&mut self) -> bool {
        let next = self.layer.color_model.as_ref().map(|model| {
            model.legend(self.records.values().map(|r| r.attr(&model.attribute)))
        });
        let changed = next != self.legend;
        self.legend = next;
        changed
    }

    pub(crate) fn restyle(&self, keys: impl IntoIterator<Item = RecordKey>) {
        for key in keys {
            let Some(record) = self.records.get(&key) else {
                continue;
            };
            let Some(id) = &record.id else { continue };
            let style = FeatureStyle {
                layer: self.id,
                key,
                id,
                selected: self.selected.contains(key),
                shown: self.shown.contains(key),
                opacity: self.opacity_of(key),
                color: self.color_of_record(record),
            };
            self.ctx.styler.set_feature_style(&style);
        }
    }

    // ---- persistence ----------------------------------------------------

    pub fn persist(
        &self,
        opt_to: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> serde_json::Map<String, serde_json::Value> {
        self.layer.persist(opt_to)
    }

    /// Restores layer settings and re-applies the ones with live effects
    /// (color model, time filtering).
    pub fn restore(&mut self, config: &serde_json::Value) -> Result<(), SourceError> {
        if self.disposed {
            return Ok(());
        }
        self.layer.restore(config)?;
        self.rebuild_legend();
        self.restyle(self.records.keys().copied().collect::<Vec<_>>());
        if self.animation.is_enabled() {
            self.refresh_animation();
        }
        Ok(())
    }

    // ---- extent queries -------------------------------------------------

    /// Records whose extent intersects `extent`; empty while the layer is
    /// hidden.
    pub fn features_in_extent(&self, extent: &Extent) -> Vec<RecordKey> {
        if self.disposed || !self.visible {
            return Vec::new();
        }
        self.spatial.query(extent)
    }

    // ---- lifecycle ------------------------------------------------------

    /// Cancels pending work, releases this store's share of the feature
    /// cap and turns every later call into a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let dropped_process = self.process_queue.cancel();
        let dropped_unprocess = self.unprocess_queue.cancel();
        self.ctx.limit.release(self.records.len());

        self.records.clear();
        self.ids.clear();
        self.shown.clear();
        self.selected.take();
        self.dynamic.clear();
        self.free_keys.clear();
        self.spatial.clear();
        self.time.clear();
        self.columns.clear();
        self.legend = None;
        self.animation.reset();
        self.disposed = true;

        tracing::debug!(
            layer = %self.id,
            dropped_process,
            dropped_unprocess,
            metrics = ?self.metrics.snapshot(),
            "source disposed"
        );
        self.emit(SourceEvent::Disposed);
        self.events.clear();
    }
}

impl Layer for VectorSource {
    fn id(&self) -> LayerId {
        self.id
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        if !self.disposed {
            self.visible = visible;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VectorSource;
    use crate::color::ColorModel;
    use crate::config::SourceConfig;
    use crate::context::{FeatureLimit, SourceContext};
    use crate::event::SourceEvent;
    use crate::layer::LayerId;
    use crate::record::{AttrValue, Record, Track, TrackPoint};
    use crate::test_support::{RecordingStyler, ids, store, store_with};
    use foundation::bounds::Extent;
    use foundation::ids::RecordId;
    use foundation::time::{TimeRange, TimeSpan};
    use geometry::Geometry;
    use index::{IntersectOptions, RecordKey};
    use pretty_assertions::assert_eq;
    use runtime::{Clock, ManualClock};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn point(id: i64, x: f64, y: f64) -> Record {
        Record::new(id).with_geometry(Geometry::Point([x, y]))
    }

    fn at(id: i64, t: f64) -> Record {
        Record::new(id).with_time(TimeSpan::new(t, t))
    }

    fn capture(src: &mut VectorSource) -> Rc<RefCell<Vec<SourceEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        src.listen(move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    #[test]
    fn ingestion_is_debounced_until_the_timer_fires() {
        let (mut src, clock) = store();
        let log = capture(&mut src);

        assert_eq!(src.add_records(vec![at(1, 10.0), at(2, 20.0)]), 2);
        assert_eq!(src.len(), 2);
        assert_eq!(src.pending_process(), 2);
        assert!(src.intersection(TimeRange::UNBOUNDED, IntersectOptions::default()).is_empty());

        clock.advance(100);
        src.tick();
        assert_eq!(src.pending_process(), 2);

        clock.advance(150);
        src.tick();
        assert_eq!(src.pending_process(), 0);
        assert_eq!(
            src.intersection(TimeRange::UNBOUNDED, IntersectOptions::default()),
            vec![RecordKey(0), RecordKey(1)]
        );
        assert!(matches!(log.borrow()[0], SourceEvent::Preprocess { .. }));
        assert_eq!(
            log.borrow()[1],
            SourceEvent::FeaturesAdded {
                keys: vec![RecordKey(0), RecordKey(1)]
            }
        );
        assert_eq!(src.metrics().counter("flush.process"), 1);
    }

    #[test]
    fn flush_budget_spreads_finalization_over_ticks() {
        let config = SourceConfig {
            flush_budget: Some(2),
            ..SourceConfig::default()
        };
        let (mut src, clock) = store_with(config, Rc::new(FeatureLimit::default()));
        src.add_records((1..=5i64).map(|i| at(i, i as f64)).collect());
        clock.advance(250);
        src.tick();
        assert_eq!(src.pending_process(), 3);
        src.tick();
        src.tick();
        assert_eq!(src.pending_process(), 0);
        assert_eq!(src.metrics().counter("flush.process"), 3);
    }

    #[test]
    fn nested_batches_flush_on_outermost_commit() {
        let (mut src, clock) = store();
        src.begin_batch();
        src.begin_batch();
        src.add_records(vec![at(1, 1.0)]);
        clock.advance(10_000);
        src.tick();
        assert_eq!(src.pending_process(), 1);

        src.commit_batch();
        assert_eq!(src.pending_process(), 1);
        src.remove_records(&ids(&[1]));
        src.commit_batch();
        assert_eq!(src.pending_process(), 0);
        assert_eq!(src.pending_unprocess(), 0);
        assert!(src.is_empty());
    }

    #[test]
    fn time_range_drains_pending_work() {
        let (mut src, _) = store();
        src.add_records(vec![
            at(1, 10.0),
            Record::new(2i64).with_time(TimeSpan::new(5.0, 40.0)),
            Record::new(3i64),
        ]);
        assert_eq!(src.time_range(), TimeSpan::new(5.0, 40.0));
        src.remove_records(&ids(&[2]));
        assert_eq!(src.time_range(), TimeSpan::new(10.0, 10.0));
    }

    #[test]
    fn capacity_truncates_and_debounces_alerts() {
        let limit = Rc::new(FeatureLimit::new(3));
        let (mut src, clock) = store_with(SourceConfig::default(), Rc::clone(&limit));
        let log = capture(&mut src);

        assert_eq!(src.add_records((1..=3i64).map(Record::new).collect()), 3);
        assert!(
            !log.borrow()
                .iter()
                .any(|e| matches!(e, SourceEvent::CapacityExceeded { .. }))
        );

        assert_eq!(src.add_records(vec![Record::new(4i64), Record::new(5i64)]), 0);
        assert_eq!(src.add_records(vec![Record::new(6i64)]), 0);
        clock.advance(5_000);
        assert_eq!(src.add_records(vec![Record::new(7i64)]), 0);

        let alerts: Vec<_> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SourceEvent::CapacityExceeded {
                    requested,
                    dropped,
                    alert,
                } => Some((*requested, *dropped, *alert)),
                _ => None,
            })
            .collect();
        assert_eq!(alerts, vec![(2, 2, true), (1, 1, false), (1, 1, true)]);
        assert_eq!(src.metrics().counter("records.dropped"), 4);

        src.remove_records(&ids(&[1]));
        assert_eq!(limit.total(), 2);
        assert_eq!(src.add_records(vec![Record::new(8i64)]), 1);
    }

    #[test]
    fn cap_is_shared_between_stores() {
        let limit = Rc::new(FeatureLimit::new(4));
        let (mut a, _) = store_with(SourceConfig::default(), Rc::clone(&limit));
        let (mut b, _) = store_with(SourceConfig::default(), Rc::clone(&limit));
        assert_eq!(a.add_records((1..=3i64).map(Record::new).collect()), 3);
        assert_eq!(b.add_records((1..=3i64).map(Record::new).collect()), 1);
        a.dispose();
        assert_eq!(limit.total(), 1);
    }

    #[test]
    fn duplicates_replace_or_skip() {
        let (mut src, _) = store();
        src.add_records(vec![point(1, 0.0, 0.0).with_attr("v", 1.0)]);
        src.process_now();
        src.select(&ids(&[1]));

        assert_eq!(src.add_records(vec![point(1, 5.0, 5.0).with_attr("v", 2.0)]), 1);
        assert_eq!(src.len(), 1);
        let record = src.record_by_id(&RecordId::Num(1)).expect("replaced");
        assert_eq!(record.attr("v"), Some(&AttrValue::Number(2.0)));
        assert!(src.selected_ids().is_empty());
        assert!(src.features_in_extent(&Extent::from_point([0.0, 0.0])).is_empty());
        assert_eq!(src.features_in_extent(&Extent::from_point([5.0, 5.0])).len(), 1);

        let config = SourceConfig {
            replace_duplicates: false,
            ..SourceConfig::default()
        };
        let (mut keep, _) = store_with(config, Rc::new(FeatureLimit::default()));
        keep.add_records(vec![point(1, 0.0, 0.0).with_attr("v", 1.0)]);
        assert_eq!(keep.add_records(vec![point(1, 5.0, 5.0).with_attr("v", 2.0)]), 0);
        let record = keep.record_by_id(&RecordId::Num(1)).expect("kept");
        assert_eq!(record.attr("v"), Some(&AttrValue::Number(1.0)));
    }

    #[test]
    fn repeated_id_in_one_call_admits_the_last_copy() {
        let limit = Rc::new(FeatureLimit::default());
        let (mut src, _) = store_with(SourceConfig::default(), limit.clone());
        let log = capture(&mut src);

        let admitted = src.add_records(vec![
            point(1, 0.0, 0.0).with_attr("v", 1.0),
            point(1, 5.0, 5.0).with_attr("v", 2.0),
        ]);
        assert_eq!(admitted, 1);
        assert_eq!(src.len(), 1);
        assert_eq!(limit.total(), 1);
        assert_eq!(src.metrics().counter("records.added"), 1);
        let record = src.record_by_id(&RecordId::Num(1)).expect("last copy");
        assert_eq!(record.attr("v"), Some(&AttrValue::Number(2.0)));
        assert!(src.features_in_extent(&Extent::from_point([0.0, 0.0])).is_empty());

        src.process_now();
        src.unprocess_now();
        assert_eq!(
            *log.borrow(),
            vec![
                SourceEvent::Preprocess {
                    keys: vec![RecordKey(0)]
                },
                SourceEvent::FeaturesAdded {
                    keys: vec![RecordKey(0)]
                },
            ]
        );
    }

    #[test]
    fn replaced_keys_are_reused_after_eviction() {
        let (mut src, _) = store();
        for v in 0..1_000 {
            src.add_records(vec![point(1, 0.0, 0.0).with_attr("v", f64::from(v))]);
            src.process_now();
            src.unprocess_now();
        }
        assert_eq!(src.len(), 1);
        assert!(src.next_key <= 2);
        assert!(src.key_of(&RecordId::Num(1)).is_some_and(|k| k.0 < 2));
        assert_eq!(src.shown.len(), 1);
        assert_eq!(
            src.intersection(TimeRange::UNBOUNDED, IntersectOptions::default())
                .len(),
            1
        );
    }

    #[test]
    fn reused_key_pending_twice_finalizes_once() {
        let (mut src, _) = store();
        let log = capture(&mut src);
        src.add_records(vec![Record::new(1i64)]);
        src.remove_records(&ids(&[1]));
        src.unprocess_now();

        src.add_records(vec![Record::new(2i64)]);
        assert_eq!(src.key_of(&RecordId::Num(2)), Some(RecordKey(0)));
        src.process_now();
        let added: Vec<_> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SourceEvent::FeaturesAdded { keys } => Some(keys.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![vec![RecordKey(0)]]);
    }

    #[test]
    fn exhausted_key_space_drops_without_panicking() {
        let limit = Rc::new(FeatureLimit::default());
        let (mut src, _) = store_with(SourceConfig::default(), limit.clone());
        src.next_key = u32::MAX;
        assert_eq!(src.add_records(vec![Record::new(1i64)]), 0);
        assert!(src.is_empty());
        assert_eq!(limit.total(), 0);
        assert_eq!(src.metrics().counter("records.dropped"), 1);
    }

    #[test]
    fn ids_come_from_unique_column_or_are_assigned() {
        let (mut src, _) = store();
        src.restore(&serde_json::json!({"uniqueId": "MMSI"}))
            .expect("restore");
        src.add_records(vec![
            Record::default().with_attr("MMSI", "366999"),
            Record::new(1i64),
            Record::default(),
            Record::default().with_attr("MMSI", 7.0),
        ]);
        let mut all: Vec<RecordId> = src.records().filter_map(|(_, r)| r.id.clone()).collect();
        all.sort();
        assert_eq!(
            all,
            vec![
                RecordId::Num(1),
                RecordId::Num(2),
                RecordId::Num(7),
                RecordId::Text("366999".into()),
            ]
        );
    }

    #[test]
    fn points_get_coordinate_fields_and_bad_geometry_degrades() {
        let (mut src, _) = store();
        src.add_records(vec![
            point(1, 12.5, -3.0),
            Record::new(2i64).with_geometry(Geometry::Point([f64::NAN, 1.0])),
        ]);
        let r = src.record_by_id(&RecordId::Num(1)).expect("point");
        assert_eq!(r.attr("LAT"), Some(&AttrValue::Number(-3.0)));
        assert_eq!(r.attr("LON"), Some(&AttrValue::Number(12.5)));

        let degraded = src.record_by_id(&RecordId::Num(2)).expect("tabular");
        assert_eq!(degraded.geometry, None);
        assert_eq!(src.metrics().counter("records.degraded"), 1);
        assert_eq!(src.len(), 2);
    }

    #[test]
    fn bulk_removal_rebuilds_the_spatial_index() {
        let config = SourceConfig {
            bulk_remove_threshold: 10,
            ..SourceConfig::default()
        };
        let (mut src, _) = store_with(config, Rc::new(FeatureLimit::default()));
        src.add_records((0..30i64).map(|i| point(i, i as f64, 0.0)).collect());

        let gone: Vec<RecordId> = (0..20i64).map(RecordId::Num).collect();
        assert_eq!(src.remove_records(&gone), 20);
        assert_eq!(src.metrics().counter("spatial.rebuilds"), 1);
        assert_eq!(src.pending_process(), 0);
        assert_eq!(
            src.features_in_extent(&Extent::new([-1.0, -1.0], [100.0, 1.0]))
                .len(),
            10
        );

        assert_eq!(src.remove_records(&ids(&[25, 25, 99])), 1);
        assert_eq!(src.metrics().counter("spatial.rebuilds"), 1);
        assert_eq!(src.len(), 9);
    }

    #[test]
    fn removal_finalizes_with_ids() {
        let (mut src, _) = store();
        let log = capture(&mut src);
        src.add_records(vec![Record::new("a"), Record::new("b")]);
        src.process_now();
        src.remove_records(&[RecordId::Text("b".into())]);
        src.unprocess_now();
        assert_eq!(
            log.borrow().last(),
            Some(&SourceEvent::FeaturesRemoved {
                removed: vec![(RecordKey(1), RecordId::Text("b".into()))]
            })
        );
    }

    #[test]
    fn animation_window_with_and_without_fade() {
        let (mut src, _) = store();
        src.add_records(vec![at(1, 10.0), at(2, 20.0), at(3, 30.0)]);
        src.process_now();
        src.set_animation_enabled(true);

        src.set_display_range(TimeRange::new(5.0, 15.0));
        src.set_display_range(TimeRange::new(15.0, 25.0));
        assert_eq!(src.animation_visible(), vec![(RecordKey(1), 1.0)]);

        src.set_display_range(TimeRange::new(5.0, 15.0));
        src.set_fade_enabled(true);
        src.set_display_range(TimeRange::new(15.0, 25.0));
        assert_eq!(
            src.animation_visible(),
            vec![(RecordKey(0), 0.5), (RecordKey(1), 1.0)]
        );

        src.set_animation_enabled(false);
        assert!(src.animation_visible().is_empty());
        assert_eq!(src.opacity_of(RecordKey(2)), 1.0);
    }

    #[test]
    fn visibility_deltas_carry_the_render_path() {
        let clock = Rc::new(ManualClock::new(0));
        let map = crate::context::StaticMap { webgl: true };
        let ctx = SourceContext::new(Rc::new(FeatureLimit::default()), clock)
            .with_map(Rc::new(map));
        let mut src = VectorSource::new(LayerId(9), SourceConfig::default(), Rc::new(ctx));
        src.add_records(vec![at(1, 10.0), at(2, 20.0)]);
        src.process_now();
        src.set_animation_enabled(true);
        let log = capture(&mut src);

        src.set_display_range(TimeRange::new(15.0, 25.0));
        assert_eq!(
            log.borrow().as_slice(),
            &[SourceEvent::VisibilityChanged {
                path: crate::event::RenderPath::WebGl,
                shown: vec![],
                hidden: vec![RecordKey(0)],
            }]
        );
    }

    #[test]
    fn playing_cache_tracks_index_changes() {
        let (mut src, _) = store();
        src.add_records(vec![at(1, 10.0)]);
        src.process_now();
        src.set_animation_enabled(true);
        src.set_playing(true);
        src.set_display_range(TimeRange::new(0.0, 50.0));
        assert_eq!(src.animation_visible().len(), 1);

        src.add_records(vec![at(2, 20.0)]);
        src.process_now();
        assert_eq!(src.animation_visible().len(), 2);

        src.hide(&ids(&[1]));
        assert_eq!(src.animation_visible(), vec![(RecordKey(1), 1.0)]);
    }

    #[test]
    fn dynamic_records_follow_their_track() {
        let (mut src, _) = store();
        let log = capture(&mut src);
        let track = Track(vec![
            TrackPoint {
                time: 0.0,
                coord: [0.0, 0.0],
            },
            TrackPoint {
                time: 100.0,
                coord: [10.0, 20.0],
            },
        ]);
        src.add_records(vec![Record::new(1i64).with_track(track)]);
        src.process_now();
        assert_eq!(
            src.record_by_id(&RecordId::Num(1))
                .and_then(|r| r.geometry.clone()),
            Some(Geometry::Point([0.0, 0.0]))
        );

        src.set_animation_enabled(true);
        src.set_display_range(TimeRange::new(0.0, 50.0));
        assert_eq!(
            src.record_by_id(&RecordId::Num(1))
                .and_then(|r| r.geometry.clone()),
            Some(Geometry::Point([5.0, 10.0]))
        );
        assert_eq!(src.features_in_extent(&Extent::from_point([5.0, 10.0])).len(), 1);
        assert!(
            log.borrow()
                .iter()
                .any(|e| matches!(e, SourceEvent::DynamicUpdated { .. }))
        );
    }

    #[test]
    fn hold_ranges_keep_records_in_the_window() {
        let (mut src, _) = store();
        src.add_records(vec![at(1, 10.0), at(2, 90.0)]);
        src.process_now();
        src.set_hold_ranges(vec![TimeRange::new(80.0, 100.0)]);
        let window = TimeRange::new(0.0, 20.0);
        assert_eq!(
            src.intersection(window, IntersectOptions::default()),
            vec![RecordKey(0), RecordKey(1)]
        );
        assert_eq!(
            src.intersection(window, IntersectOptions::timed_only()),
            vec![RecordKey(0)]
        );
    }

    #[test]
    fn color_model_and_labels_apply_at_flush() {
        let styler = Rc::new(RecordingStyler::default());
        let ctx = SourceContext::new(
            Rc::new(FeatureLimit::default()),
            Rc::new(ManualClock::new(0)),
        )
        .with_styler(styler.clone());
        let mut src = VectorSource::new(LayerId(2), SourceConfig::default(), Rc::new(ctx));
        src.set_color_model(Some(ColorModel::unique("kind")));
        src.add_records(vec![
            Record::new(1i64).with_attr("kind", "ship"),
            Record::new(2i64).with_attr("kind", "air"),
        ]);
        src.process_now();

        assert_eq!(src.legend().map(|l| l.len()), Some(2));
        assert!(src.color_of(RecordKey(0)).is_some());
        assert_ne!(src.color_of(RecordKey(0)), src.color_of(RecordKey(1)));
        assert_eq!(*styler.label_refreshes.borrow(), 1);
        assert!(src.columns().contains("kind"));

        src.select(&ids(&[2]));
        assert_eq!(styler.last(RecordKey(1)), Some((true, true, 1.0)));
    }

    #[test]
    fn persist_and_restore_round_trip() {
        let (mut src, _) = store();
        src.set_color_model(Some(ColorModel::bins("alt", 50.0)));
        let saved = serde_json::Value::Object(src.persist(None));

        let (mut other, _) = store();
        other.restore(&saved).expect("restore");
        assert_eq!(other.layer_config(), src.layer_config());
        assert!(other.restore(&serde_json::json!("nope")).is_err());
    }

    #[test]
    fn dispose_turns_every_call_into_a_no_op() {
        let limit = Rc::new(FeatureLimit::new(10));
        let (mut src, clock) = store_with(SourceConfig::default(), Rc::clone(&limit));
        let log = capture(&mut src);
        src.add_records(vec![point(1, 0.0, 0.0), point(2, 1.0, 1.0)]);
        src.dispose();

        assert_eq!(log.borrow().last(), Some(&SourceEvent::Disposed));
        assert_eq!(limit.total(), 0);
        assert!(src.is_disposed());

        assert_eq!(src.add_records(vec![point(3, 0.0, 0.0)]), 0);
        assert_eq!(src.remove_records(&ids(&[1])), 0);
        src.select_all();
        clock.advance(1_000);
        src.tick();
        assert!(src.is_empty());
        assert!(src.features_in_extent(&Extent::new([-5.0, -5.0], [5.0, 5.0])).is_empty());
        assert!(
            src.features_in_geometry(&Geometry::rectangle(&Extent::new([-5.0, -5.0], [5.0, 5.0])))
                .is_empty()
        );
        assert_eq!(src.pending_process(), 0);
        assert_eq!(clock.now_ms(), 1_000);
    }
}
