use serde::{Deserialize, Serialize};

/// Time primitives
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(pub f64); // milliseconds since the Unix epoch

/// A record's time value: an instant (`start == end`) or a closed interval.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Time,
    pub end: Time,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: Time(start),
            end: Time(end),
        }
    }

    pub fn instant(t: Time) -> Self {
        Self { start: t, end: t }
    }

    pub fn is_instant(&self) -> bool {
        self.start.0 == self.end.0
    }

    pub fn duration(&self) -> f64 {
        (self.end.0 - self.start.0).max(0.0)
    }

    /// Returns a span with ordered, finite bounds, or `None` when either
    /// bound is NaN or infinite.
    pub fn sanitized(self) -> Option<Self> {
        if !self.start.0.is_finite() || !self.end.0.is_finite() {
            return None;
        }
        if self.end.0 < self.start.0 {
            return Some(Self {
                start: self.end,
                end: self.start,
            });
        }
        Some(self)
    }

    /// Overlap test against a half-open display range.
    ///
    /// Instants overlap when `range.start <= t < range.end`; intervals
    /// overlap when `start < range.end && end > range.start`.
    pub fn overlaps(&self, range: TimeRange) -> bool {
        if range.is_unbounded() {
            return true;
        }
        if self.is_instant() {
            return self.start.0 >= range.start && self.start.0 < range.end;
        }
        self.start.0 < range.end && self.end.0 > range.start
    }
}

/// Half-open `[start, end)` window used for display and look-ahead queries.
///
/// `TimeRange::UNBOUNDED` means "ignore time filtering".
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub const UNBOUNDED: TimeRange = TimeRange {
        start: f64::NEG_INFINITY,
        end: f64::INFINITY,
    };

    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start == f64::NEG_INFINITY && self.end == f64::INFINITY
    }

    pub fn width(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.end > self.start)
    }

    /// Bit-exact key for caching query results per window.
    pub fn key(&self) -> (u64, u64) {
        (self.start.to_bits(), self.end.to_bits())
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

#[cfg(test)]
mod tests {
    use super::{Time, TimeRange, TimeSpan};

    #[test]
    fn instants_use_half_open_ranges() {
        let r = TimeRange::new(10.0, 20.0);
        assert!(TimeSpan::instant(Time(10.0)).overlaps(r));
        assert!(TimeSpan::instant(Time(19.9)).overlaps(r));
        assert!(!TimeSpan::instant(Time(20.0)).overlaps(r));
        assert!(!TimeSpan::instant(Time(9.0)).overlaps(r));
    }

    #[test]
    fn intervals_touching_the_start_do_not_overlap() {
        let r = TimeRange::new(10.0, 20.0);
        assert!(!TimeSpan::new(0.0, 10.0).overlaps(r));
        assert!(TimeSpan::new(0.0, 10.5).overlaps(r));
        assert!(TimeSpan::new(19.0, 40.0).overlaps(r));
        assert!(!TimeSpan::new(20.0, 40.0).overlaps(r));
    }

    #[test]
    fn unbounded_overlaps_everything() {
        assert!(TimeSpan::instant(Time(-1.0e15)).overlaps(TimeRange::UNBOUNDED));
        assert!(TimeRange::default().is_unbounded());
        assert!(!TimeRange::new(0.0, 1.0).is_unbounded());
    }

    #[test]
    fn sanitized_swaps_and_rejects() {
        assert_eq!(
            TimeSpan::new(5.0, 1.0).sanitized(),
            Some(TimeSpan::new(1.0, 5.0))
        );
        assert_eq!(TimeSpan::new(f64::NAN, 1.0).sanitized(), None);
        assert_eq!(
            TimeSpan::new(f64::NEG_INFINITY, f64::INFINITY).sanitized(),
            None
        );
    }
}
