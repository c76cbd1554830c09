//! In-memory time series for one instrument.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use etftrack_types::DataPoint;

/// Date-indexed series of data points for one instrument.
///
/// Dates are unique and iteration is ascending. The watermark (latest date)
/// is cached and kept current by [`TimeSeries::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    points: BTreeMap<NaiveDate, DataPoint>,
    watermark: Option<NaiveDate>,
}

/// Effect of applying one point to a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    /// The date was not present.
    Inserted,
    /// The date was present with different values.
    Updated {
        /// The values that were replaced.
        previous: DataPoint,
    },
    /// The date was present with identical values.
    Unchanged,
}

impl TimeSeries {
    /// Creates an empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from points; later points win on duplicate dates.
    pub fn from_points(points: impl IntoIterator<Item = DataPoint>) -> Self {
        let mut series = Self::new();
        for point in points {
            series.apply(point);
        }
        series
    }

    /// Inserts or overwrites the point for its date.
    pub fn apply(&mut self, point: DataPoint) -> Change {
        let change = match self.points.insert(point.date, point) {
            None => Change::Inserted,
            Some(previous) if previous == point => Change::Unchanged,
            Some(previous) => Change::Updated { previous },
        };
        if self.watermark.is_none_or(|w| point.date > w) {
            self.watermark = Some(point.date);
        }
        change
    }

    /// Returns the latest date in the series.
    #[must_use]
    pub const fn watermark(&self) -> Option<NaiveDate> {
        self.watermark
    }

    /// Returns the earliest date in the series.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    /// Returns the point for a date.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&DataPoint> {
        self.points.get(&date)
    }

    /// Returns the points between `from` and `to` inclusive, ascending.
    ///
    /// An inverted range yields an empty result.
    #[must_use]
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> Vec<DataPoint> {
        if from > to {
            return Vec::new();
        }
        self.points.range(from..=to).map(|(_, p)| *p).collect()
    }

    /// Returns all points, ascending.
    pub fn iter(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.values()
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(d: u32, close: f64) -> DataPoint {
        let date = NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        DataPoint::new(date, close, close, close, close, 1_000)
    }

    #[test]
    fn test_apply_changes() {
        let mut series = TimeSeries::new();
        assert_eq!(series.apply(point(2, 10.0)), Change::Inserted);
        assert_eq!(series.apply(point(2, 10.0)), Change::Unchanged);
        assert_eq!(
            series.apply(point(2, 11.0)),
            Change::Updated {
                previous: point(2, 10.0)
            }
        );
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_watermark_tracks_max_date() {
        let mut series = TimeSeries::new();
        assert_eq!(series.watermark(), None);

        series.apply(point(5, 1.0));
        series.apply(point(3, 1.0));
        assert_eq!(series.watermark(), Some(point(5, 1.0).date));
        assert_eq!(series.first_date(), Some(point(3, 1.0).date));
    }

    #[test]
    fn test_range_inclusive_and_sorted() {
        let series = TimeSeries::from_points([point(8, 1.0), point(2, 1.0), point(5, 1.0)]);
        let dates: Vec<_> = series
            .range(point(2, 0.0).date, point(5, 0.0).date)
            .iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(dates, vec![point(2, 0.0).date, point(5, 0.0).date]);

        assert!(series.range(point(9, 0.0).date, point(1, 0.0).date).is_empty());
    }
}
