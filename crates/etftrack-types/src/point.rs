//! Daily trading records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// One validated daily trading record for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Trade date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume in shares.
    pub volume: u64,
}

impl DataPoint {
    /// Creates a new data point.
    #[must_use]
    pub const fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Checks the record against the invariants every stored point must hold.
    ///
    /// `as_of` is the reference date of the fetch; records dated after it are
    /// implausible.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self, as_of: NaiveDate) -> Result<(), ValidationError> {
        if self.date > as_of {
            return Err(ValidationError::FutureDate {
                date: self.date,
                as_of,
            });
        }
        for (field, value) in self.prices() {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidValue {
                    date: self.date,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    fn prices(&self) -> [(&'static str, f64); 4] {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
    }
}

/// A record as returned by a market-data source, before validation.
///
/// Numeric fields are `None` when the source reported no value (e.g., no
/// trade on that day).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Trade date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume in shares.
    pub volume: Option<f64>,
}

impl RawRecord {
    /// Creates a raw record with every field present.
    #[must_use]
    pub const fn complete(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }
}

impl TryFrom<RawRecord> for DataPoint {
    type Error = ValidationError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let date = raw.date;
        let required = |field: &'static str, value: Option<f64>| {
            value.ok_or(ValidationError::MissingField { date, field })
        };

        let volume = required("volume", raw.volume)?;
        if !volume.is_finite() || volume < 0.0 || volume.fract() != 0.0 {
            return Err(ValidationError::InvalidValue {
                date,
                field: "volume",
                value: volume,
            });
        }

        Ok(Self {
            date,
            open: required("open", raw.open)?,
            high: required("high", raw.high)?,
            low: required("low", raw.low)?,
            close: required("close", raw.close)?,
            volume: volume as u64,
        })
    }
}
