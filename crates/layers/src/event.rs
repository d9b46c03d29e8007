use foundation::ids::RecordId;
use index::RecordKey;

/// Which renderer a visibility delta is routed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderPath {
    Overlay2d,
    WebGl,
}

/// Notifications published by a `VectorSource`.
///
/// Delivery is synchronous and in registration order; every public call
/// emits at most one event of each kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// Records accepted and queued for finalization.
    Preprocess { keys: Vec<RecordKey> },
    /// An ingestion flush finalized these records.
    FeaturesAdded { keys: Vec<RecordKey> },
    /// An eviction flush finalized these removals.
    FeaturesRemoved { removed: Vec<(RecordKey, RecordId)> },
    SelectionChanged {
        added: Vec<RecordKey>,
        removed: Vec<RecordKey>,
    },
    /// Shown-map change from hide/show commands.
    ShownChanged {
        shown: Vec<RecordKey>,
        hidden: Vec<RecordKey>,
    },
    /// An ingestion batch was truncated at the feature cap. `alert` is set
    /// at most once per alert window.
    CapacityExceeded {
        requested: usize,
        dropped: usize,
        alert: bool,
    },
    /// An area query used a geometry the predicate engine cannot test.
    ShapeUnsupported { kind: &'static str, alert: bool },
    /// Animation visibility delta. `shown` carries the new opacity.
    VisibilityChanged {
        path: RenderPath,
        shown: Vec<(RecordKey, f32)>,
        hidden: Vec<RecordKey>,
    },
    /// Dynamic records moved to their interpolated positions.
    DynamicUpdated { keys: Vec<RecordKey> },
    Disposed,
}
