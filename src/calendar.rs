use chrono::{Datelike, NaiveDate};

/// Calendar quarter-end (month, day) pairs, in year order.
pub const QUARTER_ENDS: [(u32, u32); 4] = [(3, 31), (6, 30), (9, 30), (12, 31)];

/// Fixed quarter-end calendar: Mar 31, Jun 30, Sep 30 and Dec 31 for every
/// year in the inclusive range, independent of any ticker's reporting dates.
pub fn quarter_ends(start_year: i32, end_year: i32) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for year in start_year..=end_year {
        for (month, day) in QUARTER_ENDS {
            // All four (month, day) pairs are valid in every year.
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                dates.push(date);
            }
        }
    }
    dates
}

/// Whether a date falls on a calendar quarter end.
pub fn is_quarter_end(date: NaiveDate) -> bool {
    QUARTER_ENDS.contains(&(date.month(), date.day()))
}
