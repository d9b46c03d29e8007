use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// Capabilities shared by every map layer source.
pub trait Layer {
    fn id(&self) -> LayerId;

    fn is_visible(&self) -> bool;

    fn set_visible(&mut self, visible: bool);
}
