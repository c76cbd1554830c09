//! TWSE `STOCK_DAY` response parsing.
//!
//! A successful response looks like:
//!
//! ```json
//! {
//!   "stat": "OK",
//!   "fields": ["日期","成交股數","成交金額","開盤價","最高價","最低價","收盤價","漲跌價差","成交筆數"],
//!   "data": [["113/01/02","6,591,567","862,060,140","131.10","131.25","129.95","130.50","-0.55","5,317"]]
//! }
//! ```
//!
//! Dates use the ROC calendar (year 113 = 2024). Months without data come
//! back with a non-`OK` `stat` message and no rows.

use chrono::NaiveDate;
use etftrack_types::RawRecord;
use serde::Deserialize;
use thiserror::Error;

/// Offset between the ROC calendar and the Gregorian calendar.
const ROC_YEAR_OFFSET: i32 = 1911;

/// Errors that can occur while parsing a response.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The body is not the expected JSON document.
    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is absent from the field list.
    #[error("Missing column '{0}'")]
    MissingColumn(&'static str),
}

#[derive(Debug, Deserialize)]
struct StockDayResponse {
    stat: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<String>>,
}

/// Column positions of the fields etftrack keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    date: usize,
    volume: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
}

impl Columns {
    /// Positions used by TWSE when the field list is absent.
    const DEFAULT: Self = Self {
        date: 0,
        volume: 1,
        open: 3,
        high: 4,
        low: 5,
        close: 6,
    };

    fn from_fields(fields: &[String]) -> Result<Self, ParseError> {
        if fields.is_empty() {
            return Ok(Self::DEFAULT);
        }
        let find = |name: &'static str| {
            fields
                .iter()
                .position(|f| f.trim() == name)
                .ok_or(ParseError::MissingColumn(name))
        };
        Ok(Self {
            date: find("日期")?,
            volume: find("成交股數")?,
            open: find("開盤價")?,
            high: find("最高價")?,
            low: find("最低價")?,
            close: find("收盤價")?,
        })
    }

    fn width(&self) -> usize {
        [
            self.date,
            self.volume,
            self.open,
            self.high,
            self.low,
            self.close,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Parses one month of `STOCK_DAY` JSON into raw records.
///
/// Rows that are too short or carry an unparsable date are dropped with a
/// warning. Missing numeric values (`--`) become `None`.
///
/// # Errors
///
/// Returns an error if the body is not a `STOCK_DAY` document.
pub fn parse_stock_day(body: &str) -> Result<Vec<RawRecord>, ParseError> {
    let response: StockDayResponse = serde_json::from_str(body)?;
    if response.stat.trim() != "OK" {
        tracing::debug!(stat = %response.stat, "No data for month");
        return Ok(Vec::new());
    }

    let columns = Columns::from_fields(&response.fields)?;
    let width = columns.width();

    let mut records = Vec::with_capacity(response.data.len());
    for row in &response.data {
        if row.len() < width {
            tracing::warn!(columns = row.len(), expected = width, "Skipping short row");
            continue;
        }
        let Some(date) = parse_roc_date(&row[columns.date]) else {
            tracing::warn!(date = %row[columns.date], "Skipping row with unparsable date");
            continue;
        };
        records.push(RawRecord {
            date,
            open: parse_number(&row[columns.open]),
            high: parse_number(&row[columns.high]),
            low: parse_number(&row[columns.low]),
            close: parse_number(&row[columns.close]),
            volume: parse_number(&row[columns.volume]),
        });
    }

    Ok(records)
}

/// Converts a ROC calendar date (`yyy/mm/dd`) to a Gregorian date.
///
/// Trailing annotation markers (e.g. `*`) are ignored.
#[must_use]
pub fn parse_roc_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_end_matches(|c: char| !c.is_ascii_digit());
    let mut parts = s.split('/');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year + ROC_YEAR_OFFSET, month, day)
}

/// Parses a TWSE number with thousands separators.
///
/// Returns `None` for placeholders such as `--` or empty cells.
#[must_use]
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|&c| c != ',').collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JANUARY: &str = r#"{
        "stat": "OK",
        "date": "20240101",
        "title": "113年01月 0050 元大台灣50 各日成交資訊",
        "fields": ["日期","成交股數","成交金額","開盤價","最高價","最低價","收盤價","漲跌價差","成交筆數"],
        "data": [
            ["113/01/02","6,591,567","862,060,140","131.10","131.25","129.95","130.50","-0.55","5,317"],
            ["113/01/03","12,110,470","1,563,151,090","129.50","129.70","128.55","128.80","-1.70","9,902"],
            ["bad","1","1","1","1","1","1","0","1"],
            ["113/01/04","0","0","--","--","--","--"," 0.00","0"]
        ]
    }"#;

    #[test]
    fn test_parse_month() {
        let records = parse_stock_day(JANUARY).unwrap();
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(first.volume, Some(6_591_567.0));
        assert_eq!(first.open, Some(131.10));
        assert_eq!(first.close, Some(130.50));

        let no_trade = &records[2];
        assert_eq!(no_trade.close, None);
        assert_eq!(no_trade.volume, Some(0.0));
    }

    #[test]
    fn test_no_data_stat() {
        let body = r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#;
        assert!(parse_stock_day(body).unwrap().is_empty());
    }

    #[test]
    fn test_html_body_is_error() {
        assert!(matches!(
            parse_stock_day("<html>Too many requests</html>"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_reordered_fields() {
        let body = r#"{
            "stat": "OK",
            "fields": ["收盤價","日期","最高價","最低價","開盤價","成交股數"],
            "data": [["10.5","112/12/29","10.8","10.1","10.2","1,000"]]
        }"#;
        let records = parse_stock_day(body).unwrap();
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 12, 29).unwrap());
        assert_eq!(records[0].close, Some(10.5));
        assert_eq!(records[0].volume, Some(1000.0));
    }

    #[test]
    fn test_missing_column() {
        let body = r#"{"stat":"OK","fields":["日期","收盤價"],"data":[]}"#;
        assert!(matches!(
            parse_stock_day(body),
            Err(ParseError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_parse_roc_date() {
        assert_eq!(
            parse_roc_date("112/01/05"),
            NaiveDate::from_ymd_opt(2023, 1, 5)
        );
        assert_eq!(
            parse_roc_date(" 113/02/29* "),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(parse_roc_date("112/02/30"), None);
        assert_eq!(parse_roc_date("2024-01-01"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,563,151,090"), Some(1_563_151_090.0));
        assert_eq!(parse_number(" 131.25 "), Some(131.25));
        assert_eq!(parse_number("--"), None);
        assert_eq!(parse_number(""), None);
    }
}
