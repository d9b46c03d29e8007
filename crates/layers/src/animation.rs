use std::collections::BTreeMap;

use foundation::time::TimeRange;
use geometry::Geometry;
use index::{IntersectOptions, RecordKey};

use crate::event::SourceEvent;
use crate::vector::VectorSource;

/// Opacity of look-ahead bands 1, 2 and 3.
pub const FADE_OPACITIES: [f32; 3] = [0.75, 0.5, 0.25];

/// Band width as a fraction of the display window.
const BAND_FRACTION: f64 = 0.25;

/// Look-ahead fade bands for a window move from `previous` to `display`.
///
/// Forward motion yields bands trailing the window start, backward motion
/// bands leading the window end. No bands when the window did not move or
/// either range is unbounded.
pub fn look_ahead_bands(display: TimeRange, previous: Option<TimeRange>) -> Vec<(TimeRange, f32)> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    if display.is_unbounded() || previous.is_unbounded() {
        return Vec::new();
    }
    let w = display.width() * BAND_FRACTION;
    if !(w.is_finite() && w > 0.0) {
        return Vec::new();
    }

    let forward = display.start > previous.start;
    let backward = display.start < previous.start;
    (1..=FADE_OPACITIES.len())
        .filter_map(|k| {
            let k_f = k as f64;
            let band = if forward {
                TimeRange::new(display.start - k_f * w, display.start - (k_f - 1.0) * w)
            } else if backward {
                TimeRange::new(display.end + (k_f - 1.0) * w, display.end + k_f * w)
            } else {
                return None;
            };
            Some((band, FADE_OPACITIES[k - 1]))
        })
        .collect()
}

/// Difference between two visibility maps.
///
/// `shown` holds records entering `after` or changing opacity; `hidden`
/// holds records leaving it.
pub fn visibility_delta(
    before: &BTreeMap<RecordKey, f32>,
    after: &BTreeMap<RecordKey, f32>,
) -> (Vec<(RecordKey, f32)>, Vec<RecordKey>) {
    let shown = after
        .iter()
        .filter(|(k, o)| before.get(k) != Some(o))
        .map(|(k, o)| (*k, *o))
        .collect();
    let hidden = before
        .keys()
        .filter(|k| !after.contains_key(k))
        .copied()
        .collect();
    (shown, hidden)
}

#[derive(Debug, Clone)]
struct WindowCache {
    range: (u64, u64),
    generation: u64,
    keys: Vec<RecordKey>,
}

/// Per-store animation state.
#[derive(Debug, Clone)]
pub struct AnimationState {
    enabled: bool,
    display: TimeRange,
    previous: Option<TimeRange>,
    playing: bool,
    visible: BTreeMap<RecordKey, f32>,
    cache: Option<WindowCache>,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationState {
    pub fn new() -> Self {
        Self {
            enabled: false,
            display: TimeRange::UNBOUNDED,
            previous: None,
            playing: false,
            visible: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn display(&self) -> TimeRange {
        self.display
    }

    pub fn previous(&self) -> Option<TimeRange> {
        self.previous
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn visible(&self) -> &BTreeMap<RecordKey, f32> {
        &self.visible
    }

    pub(crate) fn forget(&mut self, key: RecordKey) {
        self.visible.remove(&key);
        self.cache = None;
    }

    pub(crate) fn invalidate(&mut self) {
        self.cache = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

impl VectorSource {
    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    /// Current opacity of a record: its animation opacity while animating,
    /// otherwise 1.0 for shown records.
    pub fn opacity_of(&self, key: RecordKey) -> f32 {
        if self.animation.enabled {
            return self.animation.visible.get(&key).copied().unwrap_or(0.0);
        }
        if self.shown.contains(key) { 1.0 } else { 0.0 }
    }

    /// Animation-visible records with their opacity.
    pub fn animation_visible(&self) -> Vec<(RecordKey, f32)> {
        self.animation.visible.iter().map(|(k, o)| (*k, *o)).collect()
    }

    /// Turns animation on or off. Disabling republishes every shown record
    /// at full opacity and resets the window to unbounded.
    pub fn set_animation_enabled(&mut self, enabled: bool) {
        if self.disposed || self.animation.enabled == enabled {
            return;
        }
        if enabled {
            self.animation.enabled = true;
            self.refresh_animation();
            return;
        }

        let before = std::mem::take(&mut self.animation.visible);
        self.animation.reset();
        let after: BTreeMap<RecordKey, f32> = self.shown.iter().map(|k| (k, 1.0)).collect();
        self.publish_visibility(&before, &after);
    }

    /// Moves the display window and recomputes visibility.
    pub fn set_display_range(&mut self, range: TimeRange) {
        if self.disposed {
            return;
        }
        let old = self.animation.display;
        self.animation.previous = (!old.is_unbounded()).then_some(old);
        self.animation.display = range;
        if self.animation.enabled {
            self.refresh_animation();
        }
    }

    /// Playback caches the primary window between frames.
    pub fn set_playing(&mut self, playing: bool) {
        if self.disposed {
            return;
        }
        self.animation.playing = playing;
        if !playing {
            self.animation.cache = None;
        }
    }

    pub fn set_fade_enabled(&mut self, fade: bool) {
        if self.disposed || self.config.fade_enabled == fade {
            return;
        }
        self.config.fade_enabled = fade;
        if self.animation.enabled {
            self.refresh_animation();
        }
    }

    /// Recomputes animation visibility for the current window and publishes
    /// the delta, then moves visible dynamic records.
    pub(crate) fn refresh_animation(&mut self) {
        if self.disposed || !self.animation.enabled {
            return;
        }
        let display = self.animation.display;

        let mut after: BTreeMap<RecordKey, f32> = BTreeMap::new();
        if display.is_unbounded() || !self.layer.time_enabled {
            after.extend(self.shown.iter().map(|k| (k, 1.0)));
        } else {
            for key in self.primary_window(display) {
                after.insert(key, 1.0);
            }
            if self.config.fade_enabled {
                for (band, opacity) in look_ahead_bands(display, self.animation.previous) {
                    for key in self.time.intersection(band, IntersectOptions::timed_only()) {
                        let slot = after.entry(key).or_insert(opacity);
                        if *slot < opacity {
                            *slot = opacity;
                        }
                    }
                }
            }
        }
        after.retain(|k, _| self.records.contains_key(k) && self.shown.contains(*k));

        let before = std::mem::replace(&mut self.animation.visible, after.clone());
        self.publish_visibility(&before, &after);
        self.update_dynamic();
    }

    fn primary_window(&mut self, display: TimeRange) -> Vec<RecordKey> {
        let range = display.key();
        if self.animation.playing
            && let Some(cache) = &self.animation.cache
            && cache.range == range
            && cache.generation == self.time_generation
        {
            return cache.keys.clone();
        }
        let keys = self.time.intersection(display, IntersectOptions::default());
        if self.animation.playing {
            self.animation.cache = Some(WindowCache {
                range,
                generation: self.time_generation,
                keys: keys.clone(),
            });
        }
        keys
    }

    /// Restyles and announces the change from `before` to `after`. The
    /// animation state must already reflect `after`.
    fn publish_visibility(
        &mut self,
        before: &BTreeMap<RecordKey, f32>,
        after: &BTreeMap<RecordKey, f32>,
    ) {
        let (shown, hidden) = visibility_delta(before, after);
        if shown.is_empty() && hidden.is_empty() {
            return;
        }
        self.restyle(shown.iter().map(|(k, _)| *k).chain(hidden.iter().copied()));

        tracing::trace!(
            layer = %self.id,
            shown = shown.len(),
            hidden = hidden.len(),
            "visibility delta"
        );
        let path = self.render_path();
        self.emit(SourceEvent::VisibilityChanged { path, shown, hidden });
    }

    /// Moves visible dynamic records to their track position at the
    /// display end.
    fn update_dynamic(&mut self) {
        if self.dynamic.is_empty() {
            return;
        }
        let t = self.animation.display.end;
        let visible: Vec<RecordKey> = self
            .animation
            .visible
            .keys()
            .copied()
            .filter(|k| self.dynamic.contains(*k))
            .collect();

        let mut moved = Vec::new();
        for key in visible {
            let Some(record) = self.records.get_mut(&key) else {
                continue;
            };
            let Some(position) = record.track.as_ref().and_then(|tr| tr.position_at(t)) else {
                continue;
            };
            if record.geometry.as_ref().and_then(Geometry::as_point) == Some(position) {
                continue;
            }
            let geometry = Geometry::Point(position);
            let extent = geometry.extent();
            record.geometry = Some(geometry);
            self.spatial.insert(key, extent);
            moved.push(key);
        }
        if !moved.is_empty() {
            self.emit(SourceEvent::DynamicUpdated { keys: moved });
        }
    }
}
