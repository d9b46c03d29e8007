//! Geometry model for vector records plus the normalization and
//! area-predicate machinery used by area selection.

pub mod error;
pub mod model;
pub mod normalize;
pub mod predicate;
pub mod simplify;

pub use error::GeometryError;
pub use model::{Coord, Geometry, Member};
pub use normalize::normalize;
pub use predicate::{PreparedArea, SpatialPredicate};
pub use simplify::SimplifyPolicy;
