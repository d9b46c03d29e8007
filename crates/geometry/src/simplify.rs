use foundation::bounds::Extent;
use serde::{Deserialize, Serialize};

/// Picks a simplification tolerance for a query area.
///
/// Queries with at most `vertex_threshold` vertices are never simplified.
/// Above it, the tolerance is `factor * diagonal` where `factor` comes from
/// the largest tier whose candidate count is exceeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifyPolicy {
    pub vertex_threshold: usize,
    /// `(candidate_count, factor)` sorted by count ascending.
    pub tiers: Vec<(usize, f64)>,
}

impl Default for SimplifyPolicy {
    fn default() -> Self {
        Self {
            vertex_threshold: 100,
            tiers: vec![(10_000, 0.0025), (50_000, 0.005), (100_000, 0.01)],
        }
    }
}

impl SimplifyPolicy {
    pub fn disabled() -> Self {
        Self {
            vertex_threshold: usize::MAX,
            tiers: Vec::new(),
        }
    }

    pub fn factor(&self, vertices: usize, candidates: usize) -> Option<f64> {
        if vertices <= self.vertex_threshold {
            return None;
        }
        self.tiers
            .iter()
            .rev()
            .find(|(count, _)| candidates > *count)
            .map(|(_, f)| *f)
    }

    pub fn tolerance(&self, vertices: usize, extent: &Extent, candidates: usize) -> Option<f64> {
        let tol = self.factor(vertices, candidates)? * extent.diagonal();
        (tol.is_finite() && tol > 0.0).then_some(tol)
    }
}
