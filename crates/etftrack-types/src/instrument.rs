//! Tracked instrument definitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A tracked exchange-traded fund.
///
/// Two instruments are equal when their codes are equal; the display name and
/// start date are descriptive only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange code (e.g., "0050").
    code: String,
    /// Human-readable name (e.g., "元大台灣50").
    name: String,
    /// Earliest date worth backfilling for this instrument, if it is later
    /// than the globally configured earliest date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_date: Option<NaiveDate>,
}

impl Instrument {
    /// Creates a new instrument.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            start_date: None,
        }
    }

    /// Sets the per-instrument earliest backfill date.
    #[must_use]
    pub const fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Returns the instrument code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the per-instrument earliest backfill date.
    #[must_use]
    pub const fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    /// Returns the first date a full backfill should request, given the
    /// globally configured earliest date.
    #[must_use]
    pub fn backfill_start(&self, earliest: NaiveDate) -> NaiveDate {
        self.start_date.map_or(earliest, |start| start.max(earliest))
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Instrument {}

impl std::hash::Hash for Instrument {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_code() {
        let a = Instrument::new("0050", "元大台灣50");
        let b = Instrument::new("0050", "Yuanta Taiwan 50");
        let c = Instrument::new("0056", "元大高股息");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_backfill_start() {
        let earliest = NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
        let late = NaiveDate::from_ymd_opt(2019, 8, 20).unwrap();
        let early = NaiveDate::from_ymd_opt(2003, 6, 30).unwrap();

        assert_eq!(Instrument::new("0050", "x").backfill_start(earliest), earliest);
        assert_eq!(
            Instrument::new("00878", "x")
                .with_start_date(late)
                .backfill_start(earliest),
            late
        );
        assert_eq!(
            Instrument::new("0050", "x")
                .with_start_date(early)
                .backfill_start(earliest),
            earliest
        );
    }

    #[test]
    fn test_deserialize_without_start_date() {
        let instrument: Instrument =
            serde_json::from_str(r#"{"code":"0056","name":"元大高股息"}"#).unwrap();
        assert_eq!(instrument.code(), "0056");
        assert!(instrument.start_date().is_none());
    }
}
