//! TWSE URL construction.

use chrono::NaiveDate;

/// Default base URL of the Taiwan Stock Exchange website.
pub const DEFAULT_BASE_URL: &str = "https://www.twse.com.tw";

/// Constructs the `STOCK_DAY` URL for one instrument and one calendar month.
///
/// URL format: `{base}/exchangeReport/STOCK_DAY?response=json&date={YYYYMM}01&stockNo={CODE}`.
/// The endpoint ignores the day component and always returns the whole month.
#[must_use]
pub fn stock_day_url(base_url: &str, code: &str, month: NaiveDate) -> String {
    format!(
        "{}/exchangeReport/STOCK_DAY?response=json&date={}01&stockNo={}",
        base_url.trim_end_matches('/'),
        month.format("%Y%m"),
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_day_url() {
        let month = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        assert_eq!(
            stock_day_url(DEFAULT_BASE_URL, "0050", month),
            "https://www.twse.com.tw/exchangeReport/STOCK_DAY?response=json&date=20240101&stockNo=0050"
        );
    }

    #[test]
    fn test_trailing_slash_in_base() {
        let month = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(
            stock_day_url("http://localhost:8080/", "00878", month),
            "http://localhost:8080/exchangeReport/STOCK_DAY?response=json&date=20231201&stockNo=00878"
        );
    }
}
