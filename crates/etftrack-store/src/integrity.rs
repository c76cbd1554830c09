//! Read-only integrity checks over a stored series.

use chrono::NaiveDate;
use serde::Serialize;

use crate::series::TimeSeries;

/// Calendar gaps longer than this many days are reported.
///
/// Taiwan markets close for up to nine consecutive days around Lunar New
/// Year, so ordinary weekends and holidays stay below the default.
pub const DEFAULT_MAX_GAP_DAYS: i64 = 10;

/// Multiplier applied to the interquartile range for the outlier fence.
const IQR_FENCE: f64 = 3.0;

/// A run of calendar days with no data between two stored dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    /// Last date before the gap.
    pub after: NaiveDate,
    /// First date after the gap.
    pub before: NaiveDate,
    /// Calendar days between the two dates.
    pub days: i64,
}

/// Summary of suspicious data in one instrument's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// Instrument code.
    pub instrument: String,
    /// Number of stored records.
    pub records: usize,
    /// Earliest stored date.
    pub first_date: Option<NaiveDate>,
    /// Latest stored date.
    pub last_date: Option<NaiveDate>,
    /// Gaps longer than the threshold.
    pub gaps: Vec<Gap>,
    /// Dates whose close lies outside the 3×IQR fence.
    pub outliers: Vec<NaiveDate>,
    /// Dates with zero traded volume.
    pub zero_volume: Vec<NaiveDate>,
}

impl IntegrityReport {
    /// Checks `series` for gaps, close outliers and zero-volume days.
    #[must_use]
    pub fn check(instrument: &str, series: &TimeSeries, max_gap_days: i64) -> Self {
        let mut gaps = Vec::new();
        let mut previous: Option<NaiveDate> = None;
        for point in series.iter() {
            if let Some(prev) = previous {
                let days = (point.date - prev).num_days();
                if days > max_gap_days {
                    gaps.push(Gap {
                        after: prev,
                        before: point.date,
                        days,
                    });
                }
            }
            previous = Some(point.date);
        }

        let mut closes: Vec<f64> = series.iter().map(|p| p.close).collect();
        closes.sort_by(f64::total_cmp);
        let outliers = match (quantile(&closes, 0.25), quantile(&closes, 0.75)) {
            (Some(q1), Some(q3)) => {
                let iqr = q3 - q1;
                let (low, high) = (q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr);
                series
                    .iter()
                    .filter(|p| p.close < low || p.close > high)
                    .map(|p| p.date)
                    .collect()
            }
            _ => Vec::new(),
        };

        let zero_volume = series
            .iter()
            .filter(|p| p.volume == 0)
            .map(|p| p.date)
            .collect();

        Self {
            instrument: instrument.to_string(),
            records: series.len(),
            first_date: series.first_date(),
            last_date: series.watermark(),
            gaps,
            outliers,
            zero_volume,
        }
    }

    /// Returns true if nothing suspicious was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.gaps.is_empty() && self.outliers.is_empty() && self.zero_volume.is_empty()
    }
}

/// Linear-interpolated quantile of sorted values.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
