//! Read path over the store.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Days, Months, NaiveDate};
use etftrack_instruments::InstrumentRegistry;
use etftrack_store::{TimeSeries, TimeSeriesStore};
use etftrack_types::{DataPoint, Instrument};
use serde::Serialize;
use thiserror::Error;

/// One instrument's query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesView {
    /// Points in the requested range, ascending by date.
    pub points: Vec<DataPoint>,
    /// Latest stored date, regardless of the requested range.
    pub watermark: Option<NaiveDate>,
}

/// Last-updated status of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastUpdated {
    /// Instrument code.
    pub code: String,
    /// Instrument display name.
    pub name: String,
    /// Latest stored date.
    pub watermark: Option<NaiveDate>,
}

/// Look-back window ending at an instrument's watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Period {
    /// Two weeks.
    TwoWeeks,
    /// One month.
    OneMonth,
    /// Three months.
    ThreeMonths,
    /// Six months.
    SixMonths,
    /// One year.
    OneYear,
    /// Two years.
    TwoYears,
    /// Three years.
    ThreeYears,
}

/// Error returned when parsing an unknown period.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown period '{0}' (expected one of 2w, 1m, 3m, 6m, 1y, 2y, 3y)")]
pub struct ParsePeriodError(String);

impl Period {
    /// All periods, shortest first.
    pub const ALL: [Self; 7] = [
        Self::TwoWeeks,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::TwoYears,
        Self::ThreeYears,
    ];

    /// Returns the short label, e.g. `3m`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TwoWeeks => "2w",
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::SixMonths => "6m",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::ThreeYears => "3y",
        }
    }

    /// Returns the first date of the window ending at `anchor`.
    #[must_use]
    pub fn start_from(&self, anchor: NaiveDate) -> NaiveDate {
        let months = match self {
            Self::TwoWeeks => {
                return anchor
                    .checked_sub_days(Days::new(14))
                    .unwrap_or(NaiveDate::MIN);
            }
            Self::OneMonth => 1,
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
            Self::OneYear => 12,
            Self::TwoYears => 24,
            Self::ThreeYears => 36,
        };
        anchor
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(ParsePeriodError(s))
    }
}

/// Read-only queries over stored series.
///
/// Queries may run while an ingestion run is merging; each instrument is
/// read from one consistent snapshot. Unknown instruments are omitted from
/// results, and an instrument whose data cannot be read is omitted with a
/// warning.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<TimeSeriesStore>,
    instruments: Arc<InstrumentRegistry>,
}

impl QueryService {
    /// Creates a new query service.
    #[must_use]
    pub const fn new(store: Arc<TimeSeriesStore>, instruments: Arc<InstrumentRegistry>) -> Self {
        Self { store, instruments }
    }

    /// Returns points in `[from, to]` and the watermark for each known code.
    pub fn query<S: AsRef<str>>(
        &self,
        ids: &[S],
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeMap<String, SeriesView> {
        self.known(ids)
            .filter_map(|instrument| {
                let code = instrument.code();
                let series = self.read(code)?;
                let view = SeriesView {
                    points: series.range(from, to),
                    watermark: series.watermark(),
                };
                Some((code.to_string(), view))
            })
            .collect()
    }

    /// Returns each known code's points for `period`, anchored at its own
    /// watermark. Instruments without data get an empty view.
    pub fn query_period<S: AsRef<str>>(
        &self,
        ids: &[S],
        period: Period,
    ) -> BTreeMap<String, SeriesView> {
        self.known(ids)
            .filter_map(|instrument| {
                let code = instrument.code();
                let series = self.read(code)?;
                let watermark = series.watermark();
                let points = watermark
                    .map(|anchor| series.range(period.start_from(anchor), anchor))
                    .unwrap_or_default();
                Some((code.to_string(), SeriesView { points, watermark }))
            })
            .collect()
    }

    /// Returns the watermark of each known code.
    pub fn last_updated<S: AsRef<str>>(&self, ids: &[S]) -> BTreeMap<String, Option<NaiveDate>> {
        self.known(ids)
            .filter_map(|instrument| {
                let code = instrument.code();
                Some((code.to_string(), self.read(code)?.watermark()))
            })
            .collect()
    }

    /// Returns the last-updated status of every registered instrument, in
    /// registry order.
    pub fn list_last_updated(&self) -> Vec<LastUpdated> {
        self.instruments
            .all()
            .map(|instrument| LastUpdated {
                code: instrument.code().to_string(),
                name: instrument.name().to_string(),
                watermark: self.read(instrument.code()).and_then(|s| s.watermark()),
            })
            .collect()
    }

    fn known<'a, S: AsRef<str>>(&'a self, ids: &'a [S]) -> impl Iterator<Item = &'a Instrument> {
        ids.iter().filter_map(|id| self.instruments.get(id.as_ref()))
    }

    fn read(&self, code: &str) -> Option<Arc<TimeSeries>> {
        match self.store.series(code) {
            Ok(series) => Some(series),
            Err(e) => {
                tracing::warn!(instrument = code, error = %e, "Skipping unreadable instrument");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn point(day: NaiveDate) -> DataPoint {
        DataPoint::new(day, 1.0, 1.0, 1.0, 1.0, 1)
    }

    fn service(temp: &TempDir) -> QueryService {
        let instruments = Arc::new(
            InstrumentRegistry::new(vec![
                Instrument::new("0050", "Yuanta Taiwan 50"),
                Instrument::new("0056", "Yuanta High Dividend"),
            ])
            .unwrap(),
        );
        let store =
            Arc::new(TimeSeriesStore::open(temp.path(), instruments.codes().map(String::from), 0).unwrap());
        store
            .merge_as_of(
                "0050",
                &[point(date(2024, 1, 2)), point(date(2024, 1, 3)), point(date(2024, 3, 1))],
                date(2024, 12, 31),
            )
            .unwrap();
        QueryService::new(store, instruments)
    }

    #[test]
    fn test_query_range_and_unknown_omitted() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let result = service.query(&["0050", "0056", "9999"], date(2024, 1, 1), date(2024, 1, 31));

        assert_eq!(result.len(), 2);
        let view = &result["0050"];
        assert_eq!(view.points.len(), 2);
        assert_eq!(view.watermark, Some(date(2024, 3, 1)));
        assert!(result["0056"].points.is_empty());
        assert_eq!(result["0056"].watermark, None);
    }

    #[test]
    fn test_query_period_anchors_at_watermark() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let result = service.query_period(&["0050"], Period::OneMonth);
        let dates: Vec<_> = result["0050"].points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(2024, 3, 1)]);

        let result = service.query_period(&["0050"], Period::ThreeMonths);
        assert_eq!(result["0050"].points.len(), 3);
    }

    #[test]
    fn test_last_updated() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let map = service.last_updated(&["0050", "0056", "nope"]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["0050"], Some(date(2024, 3, 1)));
        assert_eq!(map["0056"], None);

        let list = service.list_last_updated();
        assert_eq!(list[0].code, "0050");
        assert_eq!(list[1].watermark, None);
    }

    #[test]
    fn test_period_parse_and_start() {
        assert_eq!("3m".parse::<Period>().unwrap(), Period::ThreeMonths);
        assert_eq!("2W".parse::<Period>().unwrap(), Period::TwoWeeks);
        assert!("5d".parse::<Period>().is_err());

        let anchor = date(2024, 3, 31);
        assert_eq!(Period::TwoWeeks.start_from(anchor), date(2024, 3, 17));
        assert_eq!(Period::OneMonth.start_from(anchor), date(2024, 2, 29));
        assert_eq!(Period::OneYear.start_from(anchor), date(2023, 3, 31));
    }
}
