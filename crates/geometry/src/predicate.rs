use std::fmt::Debug;

use foundation::bounds::Extent;
use geo::{Contains, Intersects, LineString, Polygon, Simplify};

use crate::error::GeometryError;
use crate::model::{Coord, Geometry, Member};
use crate::normalize::check_finite;
use crate::simplify::SimplifyPolicy;

type Rings = Vec<Vec<Coord>>;

/// Area hit-testing engine.
///
/// A query is prepared once per area selection ([`SpatialPredicate::prepare`])
/// and then tested against every candidate that survived the extent filter.
#[derive(Debug, Clone, Default)]
pub struct SpatialPredicate {
    policy: SimplifyPolicy,
}

/// A query area ready for repeated candidate tests.
///
/// Point members are classified by an even-odd scan over cached ring
/// vertices. When the query was simplified, points farther than the
/// tolerance from the simplified boundary use the simplified rings and the
/// rest fall back to the exact rings, so point results always match the
/// unsimplified area. Line and polygon members use the exact query.
#[derive(Debug, Clone)]
pub struct PreparedArea {
    extent: Extent,
    exact: Vec<Rings>,
    simplified: Option<(Vec<Rings>, f64)>,
    rectangle: bool,
    polygons: Vec<Polygon<f64>>,
}

impl SpatialPredicate {
    pub fn new(policy: SimplifyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SimplifyPolicy {
        &self.policy
    }

    /// Prepares a `Polygon` or `MultiPolygon` query (boxes and circles are
    /// polygons). `candidates` is the extent-filtered candidate count and
    /// drives the simplification tier.
    pub fn prepare(
        &self,
        query: &Geometry,
        candidates: usize,
    ) -> Result<PreparedArea, GeometryError> {
        check_finite(query)?;
        let mut exact: Vec<Rings> = match query {
            Geometry::Polygon(rings) => vec![rings.clone()],
            Geometry::MultiPolygon(polys) => polys.clone(),
            other => return Err(GeometryError::UnsupportedQuery(other.type_name())),
        };
        for rings in &mut exact {
            close_rings(rings)?;
        }

        let extent = query.extent();
        if extent.is_empty() {
            return Err(GeometryError::Degenerate {
                kind: "Polygon",
                vertices: 0,
            });
        }

        let rectangle = is_rectangle(&exact, &extent);
        let polygons: Vec<Polygon<f64>> = exact.iter().map(|r| to_geo_polygon(r)).collect();

        let vertices = query.vertex_count();
        let simplified = match self.policy.tolerance(vertices, &extent, candidates) {
            Some(tol) if !rectangle => {
                let rings: Vec<Rings> = polygons
                    .iter()
                    .map(|p| from_geo_polygon(&p.simplify(&tol)))
                    .collect();
                tracing::debug!(
                    vertices,
                    simplified = rings.iter().flatten().map(Vec::len).sum::<usize>(),
                    tolerance = tol,
                    candidates,
                    "query area simplified"
                );
                Some((rings, tol))
            }
            _ => None,
        };

        Ok(PreparedArea {
            extent,
            exact,
            simplified,
            rectangle,
            polygons,
        })
    }
}

impl PreparedArea {
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn is_rectangle(&self) -> bool {
        self.rectangle
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.simplified.as_ref().map(|(_, tol)| *tol)
    }

    pub fn simplified_vertex_count(&self) -> Option<usize> {
        self.simplified
            .as_ref()
            .map(|(rings, _)| rings.iter().flatten().map(Vec::len).sum())
    }

    /// Whether any member of `candidate` is contained in, crosses or
    /// overlaps the area. Members are tested in order and the first match
    /// wins.
    pub fn matches(&self, candidate: &Geometry) -> Result<bool, GeometryError> {
        check_finite(candidate)?;
        for member in candidate.members() {
            if self.member_matches(member)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Keys of matching candidates, in input order. Candidates that cannot
    /// be tested are skipped.
    pub fn filter<'g, K: Copy + Debug>(
        &self,
        candidates: impl IntoIterator<Item = (K, &'g Geometry)>,
    ) -> Vec<K> {
        let mut out = Vec::new();
        for (key, geometry) in candidates {
            match self.matches(geometry) {
                Ok(true) => out.push(key),
                Ok(false) => {}
                Err(error) => tracing::debug!(?key, %error, "area candidate skipped"),
            }
        }
        out
    }

    fn member_matches(&self, member: Member<'_>) -> Result<bool, GeometryError> {
        match member {
            Member::Point(c) => {
                if !self.extent.contains_point(c) {
                    return Ok(false);
                }
                // The extent test already proved containment.
                if self.rectangle {
                    return Ok(true);
                }
                Ok(self.contains_point(c))
            }
            Member::Line(cs) => {
                if cs.len() < 2 {
                    return Err(GeometryError::Degenerate {
                        kind: "LineString",
                        vertices: cs.len(),
                    });
                }
                if !self.extent.intersects(&Extent::from_points(cs)) {
                    return Ok(false);
                }
                let line = LineString::from(cs.to_vec());
                if self.polygons.iter().any(|q| q.contains(&line)) {
                    return Ok(true);
                }
                Ok(self.polygons.iter().any(|q| q.intersects(&line)))
            }
            Member::Polygon(rings) => {
                let mut rings = rings.to_vec();
                close_rings(&mut rings)?;
                if !self.extent.intersects(&Extent::from_points(rings.iter().flatten())) {
                    return Ok(false);
                }
                let poly = to_geo_polygon(&rings);
                if self.polygons.iter().any(|q| q.contains(&poly)) {
                    return Ok(true);
                }
                let intersects = self.polygons.iter().any(|q| q.intersects(&poly));
                let encloses_query = self.polygons.iter().all(|q| poly.contains(q));
                Ok(intersects && !encloses_query)
            }
        }
    }

    fn contains_point(&self, p: Coord) -> bool {
        if let Some((rings, tol)) = &self.simplified
            && distance_to_boundary(p, rings) > *tol * (1.0 + 1e-9)
        {
            return rings.iter().any(|r| even_odd(p, r));
        }
        self.exact.iter().any(|r| even_odd(p, r))
    }
}

fn close_rings(rings: &mut Rings) -> Result<(), GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::Degenerate {
            kind: "Polygon",
            vertices: 0,
        });
    }
    for ring in rings.iter_mut() {
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied())
            && first != last
        {
            ring.push(first);
        }
        if ring.len() < 4 {
            return Err(GeometryError::Degenerate {
                kind: "Polygon",
                vertices: ring.len(),
            });
        }
    }
    Ok(())
}

fn is_rectangle(polys: &[Rings], extent: &Extent) -> bool {
    let [rings] = polys else { return false };
    let [ring] = rings.as_slice() else {
        return false;
    };
    if ring.len() != 5 {
        return false;
    }
    let on_corner = |p: &Coord| {
        (p[0] == extent.min[0] || p[0] == extent.max[0])
            && (p[1] == extent.min[1] || p[1] == extent.max[1])
    };
    let axis_edges = ring.windows(2).all(|w| {
        on_corner(&w[0]) && on_corner(&w[1]) && ((w[0][0] == w[1][0]) != (w[0][1] == w[1][1]))
    });
    // Horizontal and vertical edges must alternate; a ring that doubles back
    // along one side encloses nothing.
    axis_edges
        && ring
            .windows(3)
            .all(|w| (w[0][1] == w[1][1]) != (w[1][1] == w[2][1]))
}

fn to_geo_polygon(rings: &[Vec<Coord>]) -> Polygon<f64> {
    let mut lines = rings.iter().map(|r| LineString::from(r.clone()));
    let exterior = lines.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, lines.collect())
}

fn from_geo_polygon(polygon: &Polygon<f64>) -> Rings {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ls| ls.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}

/// Even-odd ray scan over every ring of one polygon (holes included).
fn even_odd(p: Coord, rings: &[Vec<Coord>]) -> bool {
    let [px, py] = p;
    let mut inside = false;
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = ring[i];
            let [xj, yj] = ring[j];
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}

fn distance_to_boundary(p: Coord, polys: &[Rings]) -> f64 {
    polys
        .iter()
        .flatten()
        .flat_map(|ring| ring.windows(2))
        .map(|w| segment_distance(p, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

fn segment_distance(p: Coord, a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a[0] + t * dx, a[1] + t * dy);
    (p[0] - cx).hypot(p[1] - cy)
}
