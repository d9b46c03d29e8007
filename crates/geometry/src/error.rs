use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    #[error("degenerate {kind}: {vertices} vertices")]
    Degenerate { kind: &'static str, vertices: usize },

    #[error("unsupported query geometry: {0}")]
    UnsupportedQuery(&'static str),
}
