use serde::{Deserialize, Serialize};

/// Axis-aligned 2D extent in lon/lat degrees (or any planar units).
///
/// An extent with `min > max` on either axis is empty; `Extent::empty()` is
/// the identity for `extend`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Extent {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Extent { min, max }
    }

    pub fn empty() -> Self {
        Extent {
            min: [f64::INFINITY, f64::INFINITY],
            max: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        }
    }

    pub fn from_point(p: [f64; 2]) -> Self {
        Extent { min: p, max: p }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 2]>) -> Self {
        let mut e = Self::empty();
        for p in points {
            e.extend_point(*p);
        }
        e
    }

    pub fn is_empty(&self) -> bool {
        !(self.min[0] <= self.max[0] && self.min[1] <= self.max[1])
    }

    pub fn extend_point(&mut self, p: [f64; 2]) {
        self.min[0] = self.min[0].min(p[0]);
        self.min[1] = self.min[1].min(p[1]);
        self.max[0] = self.max[0].max(p[0]);
        self.max[1] = self.max[1].max(p[1]);
    }

    pub fn extend(&mut self, other: &Extent) {
        if other.is_empty() {
            return;
        }
        self.extend_point(other.min);
        self.extend_point(other.max);
    }

    /// Closed-interval overlap test; touching edges intersect.
    pub fn intersects(&self, other: &Extent) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        !(self.max[0] < other.min[0]
            || self.min[0] > other.max[0]
            || self.max[1] < other.min[1]
            || self.min[1] > other.max[1])
    }

    pub fn contains_point(&self, p: [f64; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }

    pub fn contains(&self, other: &Extent) -> bool {
        !other.is_empty() && self.contains_point(other.min) && self.contains_point(other.max)
    }

    pub fn width(&self) -> f64 {
        (self.max[0] - self.min[0]).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max[1] - self.min[1]).max(0.0)
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.width().hypot(self.height())
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}
