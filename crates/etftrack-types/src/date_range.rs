//! Date range and month iteration.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::DateRangeError;

/// A range of trade dates for data retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range, validating that start <= end.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a date range for a single day.
    #[must_use]
    pub const fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Creates the range starting the day after `watermark` and ending at `today`.
    ///
    /// Returns `None` when the watermark already reaches `today`.
    #[must_use]
    pub fn after(watermark: NaiveDate, today: NaiveDate) -> Option<Self> {
        let start = watermark.checked_add_days(Days::new(1))?;
        Self::new(start, today).ok()
    }

    /// Returns an iterator over the first day of every calendar month the
    /// range touches.
    pub fn months(&self) -> MonthIterator {
        MonthIterator::new(self.start, self.end)
    }

    /// Splits the range into consecutive windows of at most `months`
    /// calendar months. Window boundaries fall on month starts; the first
    /// and last windows are trimmed to the range. Zero is treated as one.
    #[must_use]
    pub fn windows(&self, months: u32) -> Vec<Self> {
        let months = Months::new(months.max(1));
        let mut windows = Vec::new();
        let mut start = self.start;

        loop {
            let boundary = start
                .with_day(1)
                .and_then(|first| first.checked_add_months(months))
                .and_then(|next| next.pred_opt());
            let end = match boundary {
                Some(last) if last < self.end => last,
                _ => self.end,
            };
            windows.push(Self { start, end });

            match end.succ_opt() {
                Some(next) if end < self.end => start = next,
                _ => break,
            }
        }
        windows
    }

    /// Returns the total number of days in the range.
    #[must_use]
    pub fn total_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Returns true if the range contains the given date.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Iterator over the months touched by a date range.
///
/// Yields the first day of each month, oldest first.
#[derive(Debug, Clone)]
pub struct MonthIterator {
    current: Option<NaiveDate>,
    end: NaiveDate,
}

impl MonthIterator {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            current: start.with_day(1),
            end,
        }
    }
}

impl Iterator for MonthIterator {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if current > self.end {
            self.current = None;
            return None;
        }
        self.current = current.checked_add_months(Months::new(1));
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_new() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.end, date(2024, 1, 31));
        assert_eq!(range.total_days(), 31);
    }

    #[test]
    fn test_date_range_invalid() {
        assert!(DateRange::new(date(2024, 1, 31), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_after_watermark() {
        let range = DateRange::after(date(2024, 1, 5), date(2024, 1, 10)).unwrap();
        assert_eq!(range.start, date(2024, 1, 6));
        assert_eq!(range.end, date(2024, 1, 10));

        assert!(DateRange::after(date(2024, 1, 10), date(2024, 1, 10)).is_none());
        assert!(DateRange::after(date(2024, 1, 11), date(2024, 1, 10)).is_none());
        assert_eq!(
            DateRange::after(date(2024, 1, 9), date(2024, 1, 10)),
            Some(DateRange::single_day(date(2024, 1, 10)))
        );
    }

    #[test]
    fn test_month_iterator_spans_year_boundary() {
        let range = DateRange::new(date(2023, 11, 15), date(2024, 2, 3)).unwrap();
        let months: Vec<_> = range.months().collect();
        assert_eq!(
            months,
            vec![
                date(2023, 11, 1),
                date(2023, 12, 1),
                date(2024, 1, 1),
                date(2024, 2, 1)
            ]
        );
    }

    #[test]
    fn test_windows_align_to_month_starts() {
        let range = DateRange::new(date(2010, 1, 4), date(2012, 3, 15)).unwrap();
        let windows = range.windows(12);
        assert_eq!(
            windows,
            vec![
                DateRange::new(date(2010, 1, 4), date(2010, 12, 31)).unwrap(),
                DateRange::new(date(2011, 1, 1), date(2011, 12, 31)).unwrap(),
                DateRange::new(date(2012, 1, 1), date(2012, 3, 15)).unwrap(),
            ]
        );

        let mid_year = DateRange::new(date(2023, 11, 15), date(2024, 2, 3)).unwrap();
        assert_eq!(
            mid_year.windows(2),
            vec![
                DateRange::new(date(2023, 11, 15), date(2023, 12, 31)).unwrap(),
                DateRange::new(date(2024, 1, 1), date(2024, 2, 3)).unwrap(),
            ]
        );
    }

    #[test]
    fn test_windows_of_short_range() {
        let day = DateRange::single_day(date(2024, 1, 31));
        assert_eq!(day.windows(12), vec![day]);
        assert_eq!(day.windows(0), vec![day]);

        let range = DateRange::new(date(2024, 1, 30), date(2024, 2, 2)).unwrap();
        assert_eq!(range.windows(0).len(), 2);
    }

    #[test]
    fn test_month_iterator_single_day() {
        let months: Vec<_> = DateRange::single_day(date(2024, 3, 31)).months().collect();
        assert_eq!(months, vec![date(2024, 3, 1)]);
    }
}
