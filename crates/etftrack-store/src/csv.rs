//! On-disk CSV encoding of a series.

use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use etftrack_types::DataPoint;
use serde::Deserialize;

use crate::error::{Result, StorageError};
use crate::series::TimeSeries;

/// Header row of every series file.
pub const HEADER: &str = "date,open,high,low,close,volume";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One stored row.
#[derive(Debug, Deserialize)]
struct Row {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl From<Row> for DataPoint {
    fn from(row: Row) -> Self {
        Self::new(row.date, row.open, row.high, row.low, row.close, row.volume)
    }
}

/// Writes a series as CSV, ascending by date.
///
/// Floats use the shortest representation that parses back to the same
/// value, so a write/read cycle is lossless.
pub fn write_series<W: Write>(series: &TimeSeries, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "{HEADER}")?;
    for p in series.iter() {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            p.date.format(DATE_FORMAT),
            p.open,
            p.high,
            p.low,
            p.close,
            p.volume
        )?;
    }
    writer.flush()
}

/// Reads a series file. `path` is only used for error reporting.
///
/// # Errors
///
/// Returns [`StorageError::Corrupt`] on a bad header or row, and
/// [`StorageError::ReadFile`] on I/O failure.
pub fn read_series<R: Read>(reader: R, path: &Path) -> Result<TimeSeries> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(|e| to_storage_error(e, path))?;
    if headers.is_empty() {
        return Ok(TimeSeries::new());
    }
    if !headers.iter().eq(HEADER.split(',')) {
        return Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            line: 1,
            reason: format!("expected header '{HEADER}'"),
        });
    }

    let mut series = TimeSeries::new();
    for row in reader.deserialize::<Row>() {
        let row = row.map_err(|e| to_storage_error(e, path))?;
        series.apply(row.into());
    }

    Ok(series)
}

fn to_storage_error(error: ::csv::Error, path: &Path) -> StorageError {
    let line = error
        .position()
        .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX));

    match error.into_kind() {
        ::csv::ErrorKind::Io(source) => StorageError::ReadFile {
            path: path.to_path_buf(),
            source,
        },
        ::csv::ErrorKind::Deserialize { err, .. } => StorageError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason: err.to_string(),
        },
        ::csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => StorageError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason: format!("expected {expected_len} fields, found {len}"),
        },
        ::csv::ErrorKind::Utf8 { err, .. } => StorageError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason: err.to_string(),
        },
        other => StorageError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> TimeSeries {
        TimeSeries::from_points([
            DataPoint::new(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                131.3,
                132.05,
                130.85,
                131.55,
                12_345_678,
            ),
            DataPoint::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                133.0,
                133.5,
                131.9,
                132.1,
                9_876_543,
            ),
        ])
    }

    #[test]
    fn test_write_series_layout() {
        let mut buffer = Vec::new();
        write_series(&series(), &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "2024-01-02,133,133.5,131.9,132.1,9876543");
        assert_eq!(lines[2], "2024-01-03,131.3,132.05,130.85,131.55,12345678");
    }

    #[test]
    fn test_read_back_is_lossless() {
        let mut buffer = Vec::new();
        write_series(&series(), &mut buffer).unwrap();

        let read = read_series(buffer.as_slice(), Path::new("0050.csv")).unwrap();
        assert_eq!(read, series());
    }

    #[test]
    fn test_empty_file_is_empty_series() {
        let read = read_series(&b""[..], Path::new("0050.csv")).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_corrupt_row_reports_line() {
        let data = format!("{HEADER}\n2024-01-02,1,1,1,1,100\n2024-01-03,1,oops,1,1,100\n");
        let err = read_series(data.as_bytes(), Path::new("0050.csv")).unwrap_err();
        match err {
            StorageError::Corrupt { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("field 2"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_row_is_corrupt() {
        let data = format!("{HEADER}\n2024-01-02,1,1,1,1,100\n2024-01-03,1,1,1\n");
        let err = read_series(data.as_bytes(), Path::new("0050.csv")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { line: 3, .. }));
    }

    #[test]
    fn test_bad_date_is_corrupt() {
        let data = format!("{HEADER}\n2024-13-02,1,1,1,1,100\n");
        let err = read_series(data.as_bytes(), Path::new("0050.csv")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn test_wrong_header_is_corrupt() {
        let err = read_series(&b"a,b,c\n"[..], Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { line: 1, .. }));
    }
}
