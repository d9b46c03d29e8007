use geometry::{Geometry, GeometryError};
use index::RecordKey;

use crate::event::SourceEvent;
use crate::vector::VectorSource;

impl VectorSource {
    /// Records whose geometry matches the area `query`.
    ///
    /// Candidates are shown records (animation-visible ones while animating)
    /// whose extent intersects the query extent. Records without geometry
    /// never match. A query shape the predicate engine cannot test yields
    /// no results and raises a `ShapeUnsupported` event.
    ///
    /// Ordering contract:
    /// - Results are in ascending key order.
    pub fn features_in_geometry(&mut self, query: &Geometry) -> Vec<RecordKey> {
        if self.disposed || !self.visible {
            return Vec::new();
        }

        let animating = self.animation.is_enabled();
        let candidates: Vec<RecordKey> = self
            .spatial
            .query(&query.extent())
            .into_iter()
            .filter(|k| self.shown.contains(*k))
            .filter(|k| !animating || self.animation.visible().contains_key(k))
            .collect();

        let area = match self.predicate.prepare(query, candidates.len()) {
            Ok(area) => area,
            Err(GeometryError::UnsupportedQuery(kind)) => {
                let alert = self.should_alert("shape");
                if alert {
                    tracing::warn!(layer = %self.id, kind, "unsupported area query shape");
                }
                self.emit(SourceEvent::ShapeUnsupported { kind, alert });
                return Vec::new();
            }
            Err(error) => {
                tracing::debug!(layer = %self.id, %error, "area query rejected");
                return Vec::new();
            }
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        tracing::trace!(
            layer = %self.id,
            candidates = candidates.len(),
            tolerance = ?area.tolerance(),
            "area query"
        );
        area.filter(candidates.iter().filter_map(|k| {
            self.records
                .get(k)
                .and_then(|r| r.geometry.as_ref())
                .map(|g| (*k, g))
        }))
    }

    /// Adds every record matching `query` to the selection.
    pub fn select_in_geometry(&mut self, query: &Geometry) -> Vec<RecordKey> {
        let keys = self.features_in_geometry(query);
        let ids: Vec<_> = keys
            .iter()
            .filter_map(|k| self.records.get(k).and_then(|r| r.id.clone()))
            .collect();
        self.select(&ids);
        keys
    }
}
