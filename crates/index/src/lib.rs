//! In-memory indexes behind a vector source: a time index with filter
//! dimensions, an extent R-tree, and bitset-backed key sets.

pub mod key;
pub mod selection;
pub mod spatial;
pub mod temporal;

pub use key::RecordKey;
pub use selection::{KeySet, OrderedSelection};
pub use spatial::{IndexedExtent, RemoveOutcome, SpatialIndex};
pub use temporal::{IntersectOptions, TimeIndex, Timed};
