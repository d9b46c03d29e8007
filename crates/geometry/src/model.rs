use foundation::bounds::Extent;
use serde::{Deserialize, Serialize};

/// `[lon, lat]` in degrees.
pub type Coord = [f64; 2];

/// Record geometry, GeoJSON-shaped (`{"type": ..., "coordinates": ...}`).
///
/// Polygon rings are closed after normalization (first == last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

/// A simple part of a geometry, as tested by the area predicate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Member<'a> {
    Point(Coord),
    Line(&'a [Coord]),
    Polygon(&'a [Vec<Coord>]),
}

impl Geometry {
    /// Closed axis-aligned rectangle covering `extent`.
    pub fn rectangle(extent: &Extent) -> Self {
        let [x0, y0] = extent.min;
        let [x1, y1] = extent.max;
        Geometry::Polygon(vec![vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]])
    }

    /// Planar circle approximated by a closed ring of `segments` vertices.
    pub fn circle(center: Coord, radius: f64, segments: usize) -> Self {
        let segments = segments.max(3);
        let mut ring: Vec<Coord> = (0..segments)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / segments as f64;
                [center[0] + radius * a.cos(), center[1] + radius * a.sin()]
            })
            .collect();
        ring.push(ring[0]);
        Geometry::Polygon(vec![ring])
    }

    pub fn as_point(&self) -> Option<Coord> {
        match self {
            Geometry::Point(c) => Some(*c),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Visits every coordinate in storage order.
    pub fn for_each_coord(&self, f: &mut impl FnMut(Coord)) {
        match self {
            Geometry::Point(c) => f(*c),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.iter().for_each(|c| f(*c)),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().for_each(|c| f(*c))
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(|c| f(*c)),
            Geometry::GeometryCollection(gs) => {
                for g in gs {
                    g.for_each_coord(f);
                }
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        let mut n = 0;
        self.for_each_coord(&mut |_| n += 1);
        n
    }

    pub fn extent(&self) -> Extent {
        let mut e = Extent::empty();
        self.for_each_coord(&mut |c| e.extend_point(c));
        e
    }

    /// Flattens multi-geometries and collections into simple members, in
    /// storage order.
    pub fn members(&self) -> Vec<Member<'_>> {
        let mut out = Vec::new();
        self.push_members(&mut out);
        out
    }

    fn push_members<'a>(&'a self, out: &mut Vec<Member<'a>>) {
        match self {
            Geometry::Point(c) => out.push(Member::Point(*c)),
            Geometry::MultiPoint(cs) => out.extend(cs.iter().map(|c| Member::Point(*c))),
            Geometry::LineString(cs) => out.push(Member::Line(cs)),
            Geometry::MultiLineString(lines) => {
                out.extend(lines.iter().map(|l| Member::Line(l.as_slice())))
            }
            Geometry::Polygon(rings) => out.push(Member::Polygon(rings)),
            Geometry::MultiPolygon(polys) => {
                out.extend(polys.iter().map(|p| Member::Polygon(p.as_slice())))
            }
            Geometry::GeometryCollection(gs) => gs.iter().for_each(|g| g.push_members(out)),
        }
    }
}
