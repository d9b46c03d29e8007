//! Vector feature store: ingestion and eviction pipelines, selection and
//! visibility, time-windowed animation and area queries over one layer's
//! records.

pub mod animation;
pub mod color;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod layer;
pub mod query;
pub mod record;
pub mod selection;
pub mod vector;

pub use animation::{AnimationState, FADE_OPACITIES, look_ahead_bands, visibility_delta};
pub use color::{ColorMethod, ColorModel, Legend, Rgba};
pub use command::{Command, InvertSelection, SelectAll, SelectNone, SelectRecords};
pub use config::{AltitudeMode, LayerConfig, SourceConfig};
pub use context::{
    DEFAULT_FEATURE_CAP, FeatureLimit, FeatureStyle, FeatureStyler, MapView, NoopStyler,
    SourceContext, StaticMap,
};
pub use error::SourceError;
pub use event::{RenderPath, SourceEvent};
pub use layer::*;
pub use record::{AttrValue, Record, Track, TrackPoint, decode_records};
pub use vector::VectorSource;

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::rc::Rc;

    use foundation::ids::RecordId;
    use index::RecordKey;
    use runtime::ManualClock;

    use crate::config::SourceConfig;
    use crate::context::{FeatureLimit, FeatureStyle, FeatureStyler, SourceContext};
    use crate::layer::LayerId;
    use crate::vector::VectorSource;

    pub fn ids(nums: &[i64]) -> Vec<RecordId> {
        nums.iter().map(|n| RecordId::Num(*n)).collect()
    }

    /// Store with default config, a manual clock at 0 and a 150k cap.
    pub fn store() -> (VectorSource, Rc<ManualClock>) {
        store_with(SourceConfig::default(), Rc::new(FeatureLimit::default()))
    }

    pub fn store_with(config: SourceConfig, limit: Rc<FeatureLimit>) -> (VectorSource, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        let ctx = SourceContext::new(limit, clock.clone());
        (VectorSource::new(LayerId(1), config, Rc::new(ctx)), clock)
    }

    /// Styler that records the last style written per key.
    #[derive(Default)]
    pub struct RecordingStyler {
        pub styles: RefCell<Vec<(RecordKey, bool, bool, f32)>>,
        pub label_refreshes: RefCell<usize>,
    }

    impl RecordingStyler {
        pub fn last(&self, key: RecordKey) -> Option<(bool, bool, f32)> {
            self.styles
                .borrow()
                .iter()
                .rev()
                .find(|s| s.0 == key)
                .map(|s| (s.1, s.2, s.3))
        }
    }

    impl FeatureStyler for RecordingStyler {
        fn set_feature_style(&self, style: &FeatureStyle<'_>) {
            self.styles
                .borrow_mut()
                .push((style.key, style.selected, style.shown, style.opacity));
        }

        fn refresh_labels(&self, _layer: LayerId, _keys: &[RecordKey]) {
            *self.label_refreshes.borrow_mut() += 1;
        }
    }
}
