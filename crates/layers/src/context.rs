use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use foundation::ids::RecordId;
use index::RecordKey;
use runtime::{Clock, SystemClock};

use crate::color::Rgba;
use crate::layer::LayerId;

pub const DEFAULT_FEATURE_CAP: usize = 150_000;

/// Process-wide record budget shared by every store.
///
/// Stores admit records before inserting them and release them on removal
/// or disposal; execution is single-threaded, so a `Cell` is enough.
#[derive(Debug)]
pub struct FeatureLimit {
    cap: usize,
    total: Cell<usize>,
}

impl Default for FeatureLimit {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_CAP)
    }
}

impl FeatureLimit {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            total: Cell::new(0),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn total(&self) -> usize {
        self.total.get()
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.total.get())
    }

    /// Reserves up to `n` records. Returns how many were granted.
    pub fn admit(&self, n: usize) -> usize {
        let granted = n.min(self.remaining());
        self.total.set(self.total.get() + granted);
        granted
    }

    pub fn release(&self, n: usize) {
        self.total.set(self.total.get().saturating_sub(n));
    }
}

/// Style inputs for one record, handed to the styler after any selection,
/// visibility, opacity or color change.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStyle<'a> {
    pub layer: LayerId,
    pub key: RecordKey,
    pub id: &'a RecordId,
    pub selected: bool,
    pub shown: bool,
    pub opacity: f32,
    pub color: Option<Rgba>,
}

/// Rendering/style collaborator.
pub trait FeatureStyler {
    fn set_feature_style(&self, style: &FeatureStyle<'_>);

    fn refresh_labels(&self, _layer: LayerId, _keys: &[RecordKey]) {}
}

/// Map container collaborator.
pub trait MapView {
    fn webgl_enabled(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStyler;

impl FeatureStyler for NoopStyler {
    fn set_feature_style(&self, _style: &FeatureStyle<'_>) {}
}

/// Map whose renderer is fixed for its lifetime.
#[derive(Debug, Default, Clone)]
pub struct StaticMap {
    pub webgl: bool,
}

impl MapView for StaticMap {
    fn webgl_enabled(&self) -> bool {
        self.webgl
    }
}

/// Collaborators injected into every store.
pub struct SourceContext {
    pub limit: Rc<FeatureLimit>,
    pub styler: Rc<dyn FeatureStyler>,
    pub map: Rc<dyn MapView>,
    pub clock: Rc<dyn Clock>,
}

impl fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceContext")
            .field("limit", &self.limit)
            .field("webgl", &self.map.webgl_enabled())
            .finish()
    }
}

impl SourceContext {
    pub fn new(limit: Rc<FeatureLimit>, clock: Rc<dyn Clock>) -> Self {
        Self {
            limit,
            styler: Rc::new(NoopStyler),
            map: Rc::new(StaticMap::default()),
            clock,
        }
    }

    /// System clock, no-op styler, 2D map and the default cap.
    pub fn standalone() -> Self {
        Self::new(Rc::new(FeatureLimit::default()), Rc::new(SystemClock::new()))
    }

    pub fn with_styler(mut self, styler: Rc<dyn FeatureStyler>) -> Self {
        self.styler = styler;
        self
    }

    pub fn with_map(mut self, map: Rc<dyn MapView>) -> Self {
        self.map = map;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureLimit;
    use std::rc::Rc;

    #[test]
    fn limit_is_shared_and_saturates() {
        let limit = Rc::new(FeatureLimit::new(10));
        let other = Rc::clone(&limit);
        assert_eq!(limit.admit(7), 7);
        assert_eq!(other.admit(7), 3);
        assert_eq!(limit.remaining(), 0);
        other.release(4);
        assert_eq!(limit.total(), 6);
        limit.release(100);
        assert_eq!(limit.total(), 0);
    }
}
