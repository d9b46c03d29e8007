use std::collections::BTreeMap;
use std::fmt;

use foundation::ids::RecordId;
use foundation::time::TimeSpan;
use geometry::{Coord, Geometry};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Attribute value: number, string, boolean or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Id taken from a `uniqueId` column. Integral numbers become numeric
    /// ids; empty strings and other values yield nothing.
    pub fn to_record_id(&self) -> Option<RecordId> {
        match self {
            AttrValue::Number(v) if v.is_finite() && v.fract() == 0.0 => {
                Some(RecordId::Num(*v as i64))
            }
            AttrValue::Text(s) if !s.is_empty() => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str(""),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Number(v) => write!(f, "{v}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub time: f64,
    pub coord: Coord,
}

/// Time-ordered positions of a moving record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track(pub Vec<TrackPoint>);

impl Track {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position at `t`, linearly interpolated and clamped to the ends.
    pub fn position_at(&self, t: f64) -> Option<Coord> {
        let points = &self.0;
        let first = points.first()?;
        let last = points.last()?;
        if !t.is_finite() || t <= first.time {
            return Some(first.coord);
        }
        if t >= last.time {
            return Some(last.coord);
        }
        let i = points.partition_point(|p| p.time <= t);
        let (a, b) = (points[i - 1], points[i]);
        let span = b.time - a.time;
        if span <= 0.0 {
            return Some(b.coord);
        }
        let f = (t - a.time) / span;
        Some([
            a.coord[0] + f * (b.coord[0] - a.coord[0]),
            a.coord[1] + f * (b.coord[1] - a.coord[1]),
        ])
    }

    fn sort(&mut self) {
        self.0.retain(|p| p.time.is_finite());
        self.0.sort_by(|a, b| a.time.total_cmp(&b.time));
    }
}

/// A geospatial record.
///
/// `id` is optional on input; the store assigns one on ingestion. `time`
/// `None` means "always visible".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub time: Option<TimeSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_time(mut self, time: TimeSpan) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.track = Some(track);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn is_dynamic(&self) -> bool {
        self.track.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Drops unusable time values and orders track samples.
    pub(crate) fn sanitize_time(&mut self) {
        self.time = self.time.and_then(TimeSpan::sanitized);
        if let Some(track) = &mut self.track {
            track.sort();
        }
    }
}

/// Decodes a JSON array of records.
pub fn decode_records(json: &str) -> Result<Vec<Record>, SourceError> {
    Ok(serde_json::from_str(json)?)
}
