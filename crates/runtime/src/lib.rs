pub mod batch;
pub mod budget;
pub mod clock;
pub mod event_bus;
pub mod metrics;

pub use batch::*;
pub use budget::*;
pub use clock::*;
pub use event_bus::*;
pub use metrics::*;
