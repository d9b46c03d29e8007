use crate::error::GeometryError;
use crate::model::{Coord, Geometry};

/// Normalizes a record geometry for storage.
///
/// - Rejects any NaN or infinite coordinate.
/// - Wraps point longitudes into `[-180, 180]`.
/// - Unwraps line and ring longitudes so consecutive vertices never jump by
///   more than 180 degrees.
/// - Splits lines crossing the antimeridian into a `MultiLineString`.
/// - Closes polygon rings and shifts each polygon so its first vertex lies
///   in `[-180, 180]`.
///
/// Callers degrade the record to tabular on `Err` instead of failing the
/// batch.
pub fn normalize(geometry: Geometry) -> Result<Geometry, GeometryError> {
    check_finite(&geometry)?;
    match geometry {
        Geometry::Point(c) => Ok(Geometry::Point(wrap(c))),
        Geometry::MultiPoint(cs) => Ok(Geometry::MultiPoint(cs.into_iter().map(wrap).collect())),
        Geometry::LineString(line) => {
            let mut parts = split_line(line)?;
            if parts.len() == 1 {
                Ok(Geometry::LineString(parts.remove(0)))
            } else {
                Ok(Geometry::MultiLineString(parts))
            }
        }
        Geometry::MultiLineString(lines) => {
            let mut parts = Vec::with_capacity(lines.len());
            for line in lines {
                parts.extend(split_line(line)?);
            }
            Ok(Geometry::MultiLineString(parts))
        }
        Geometry::Polygon(rings) => Ok(Geometry::Polygon(normalize_polygon(rings)?)),
        Geometry::MultiPolygon(polys) => Ok(Geometry::MultiPolygon(
            polys
                .into_iter()
                .map(normalize_polygon)
                .collect::<Result<_, _>>()?,
        )),
        Geometry::GeometryCollection(gs) => Ok(Geometry::GeometryCollection(
            gs.into_iter().map(normalize).collect::<Result<_, _>>()?,
        )),
    }
}

pub(crate) fn check_finite(geometry: &Geometry) -> Result<(), GeometryError> {
    let mut bad = None;
    geometry.for_each_coord(&mut |[x, y]| {
        if bad.is_none() && !(x.is_finite() && y.is_finite()) {
            bad = Some(GeometryError::NonFinite { x, y });
        }
    });
    match bad {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Wraps a longitude into `[-180, 180]`; `180` itself is kept.
pub fn wrap_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let w = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if w == -180.0 && lon > 0.0 { 180.0 } else { w }
}

fn wrap([x, y]: Coord) -> Coord {
    [wrap_lon(x), y]
}

/// Shifts longitudes so each step is at most 180 degrees, starting next to
/// `anchor`.
fn unwrap_continuous(coords: &mut [Coord], anchor: f64) {
    let mut prev = anchor;
    for c in coords.iter_mut() {
        c[0] = nearest_copy(c[0], prev);
        prev = c[0];
    }
}

fn nearest_copy(lon: f64, anchor: f64) -> f64 {
    let d = lon - anchor;
    if d.abs() <= 180.0 {
        return lon;
    }
    lon - 360.0 * (d / 360.0).round()
}

/// Which 360-degree copy of the world an unwrapped longitude falls in.
/// Copy 0 spans `[-180, 180)`.
fn world_copy(lon: f64) -> i64 {
    ((lon + 180.0) / 360.0).floor() as i64
}

fn split_line(mut line: Vec<Coord>) -> Result<Vec<Vec<Coord>>, GeometryError> {
    if line.len() < 2 {
        return Err(GeometryError::Degenerate {
            kind: "LineString",
            vertices: line.len(),
        });
    }
    let anchor = wrap_lon(line[0][0]);
    unwrap_continuous(&mut line, anchor);

    let mut parts: Vec<Vec<Coord>> = Vec::new();
    let mut copy = world_copy(line[0][0]);
    let mut current = vec![shift(line[0], copy)];

    for pair in line.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let next = world_copy(b[0]);
        if next != copy {
            let boundary = -180.0 + 360.0 * copy.max(next) as f64;
            let t = (boundary - a[0]) / (b[0] - a[0]);
            let lat = a[1] + t * (b[1] - a[1]);
            push_distinct(&mut current, [boundary - 360.0 * copy as f64, lat]);
            parts.push(std::mem::take(&mut current));
            current.push([boundary - 360.0 * next as f64, lat]);
            copy = next;
        }
        push_distinct(&mut current, shift(b, copy));
    }
    parts.push(current);

    parts.retain(|p| p.len() >= 2);
    if parts.is_empty() {
        return Err(GeometryError::Degenerate {
            kind: "LineString",
            vertices: line.len(),
        });
    }
    Ok(parts)
}

fn shift([x, y]: Coord, copy: i64) -> Coord {
    [x - 360.0 * copy as f64, y]
}

fn push_distinct(part: &mut Vec<Coord>, c: Coord) {
    if part.last() != Some(&c) {
        part.push(c);
    }
}

fn normalize_polygon(mut rings: Vec<Vec<Coord>>) -> Result<Vec<Vec<Coord>>, GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::Degenerate {
            kind: "Polygon",
            vertices: 0,
        });
    }
    let mut anchor = None;
    for ring in &mut rings {
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
        // Holes follow the shell into the same world copy.
        let a = *anchor.get_or_insert_with(|| wrap_lon(ring[0][0]));
        unwrap_continuous(ring, a);
    }
    Ok(rings)
}

#[cfg(test)]
mod tests {
    use super::{normalize, wrap_lon};
    use crate::error::GeometryError;
    use crate::model::Geometry;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_longitudes() {
        assert_eq!(wrap_lon(190.0), -170.0);
        assert_eq!(wrap_lon(-190.0), 170.0);
        assert_eq!(wrap_lon(180.0), 180.0);
        assert_eq!(wrap_lon(540.0), 180.0);
        assert_eq!(wrap_lon(12.5), 12.5);
        assert_eq!(
            normalize(Geometry::Point([370.0, 5.0])),
            Ok(Geometry::Point([10.0, 5.0]))
        );
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let g = Geometry::LineString(vec![[0.0, 0.0], [f64::NAN, 1.0]]);
        assert!(matches!(normalize(g), Err(GeometryError::NonFinite { .. })));
        let g = Geometry::Point([0.0, f64::INFINITY]);
        assert!(normalize(g).is_err());
    }

    #[test]
    fn splits_lines_crossing_the_antimeridian() {
        let g = Geometry::LineString(vec![[170.0, 0.0], [-170.0, 10.0]]);
        let Ok(Geometry::MultiLineString(parts)) = normalize(g) else {
            panic!("expected a split line");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], vec![[170.0, 0.0], [180.0, 5.0]]);
        assert_eq!(parts[1], vec![[-180.0, 5.0], [-170.0, 10.0]]);
    }

    #[test]
    fn westward_crossing_splits_too() {
        let g = Geometry::LineString(vec![[-175.0, 0.0], [175.0, 0.0], [170.0, 0.0]]);
        let Ok(Geometry::MultiLineString(parts)) = normalize(g) else {
            panic!("expected a split line");
        };
        assert_eq!(parts[0], vec![[-175.0, 0.0], [-180.0, 0.0]]);
        assert_eq!(parts[1], vec![[180.0, 0.0], [175.0, 0.0], [170.0, 0.0]]);
    }

    #[test]
    fn lines_not_crossing_stay_single() {
        let g = Geometry::LineString(vec![[0.0, 0.0], [10.0, 0.0], [20.0, 5.0]]);
        assert_eq!(normalize(g.clone()), Ok(g));
    }

    #[test]
    fn degenerate_line_is_rejected() {
        let g = Geometry::LineString(vec![[0.0, 0.0]]);
        assert!(matches!(
            normalize(g),
            Err(GeometryError::Degenerate { vertices: 1, .. })
        ));
    }

    #[test]
    fn polygon_rings_are_closed_and_shifted() {
        let g = Geometry::Polygon(vec![vec![[190.0, 0.0], [200.0, 0.0], [200.0, 10.0]]]);
        let Ok(Geometry::Polygon(rings)) = normalize(g) else {
            panic!("expected polygon");
        };
        assert_eq!(
            rings[0],
            vec![[-170.0, 0.0], [-160.0, 0.0], [-160.0, 10.0], [-170.0, 0.0]]
        );

        let bad = Geometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 1.0]]]);
        assert!(normalize(bad).is_err());
    }
}
