pub mod rtree;

pub use rtree::{IndexedExtent, RemoveOutcome, SpatialIndex};
