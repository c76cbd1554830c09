//! Query command implementation.

use crate::display::{parse_date, print_series};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use etftrack_lib::prelude::*;

/// Print stored points for the requested instruments.
///
/// With `period`, each instrument's window ends at its own last stored date.
/// Otherwise the range defaults to everything up to today.
pub(crate) fn query(
    tracker: &Tracker,
    codes: &[String],
    from: Option<&str>,
    to: Option<&str>,
    period: Option<Period>,
) -> Result<()> {
    let results = match period {
        Some(period) => tracker.query_period(codes, period),
        None => {
            let from = from.map(parse_date).transpose()?.unwrap_or(NaiveDate::MIN);
            let to = match to {
                Some(s) => parse_date(s)?,
                None => Local::now().date_naive(),
            };
            tracker.query(codes, from, to)
        }
    };

    // Report requested codes the registry does not know
    for code in codes {
        if !tracker.instruments().contains(code) {
            println!("Unknown instrument: {code}");
        }
    }

    let mut first = true;
    for (code, view) in &results {
        if !first {
            println!();
        }
        first = false;
        print_series(code, view);
    }

    Ok(())
}
