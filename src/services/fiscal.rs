//! Fiscal year arithmetic
//!
//! A fiscal year runs April 1 to March 31 and is identified by the calendar
//! year it starts in.

use chrono::{Datelike, NaiveDate};

/// Month the fiscal year starts in
pub const FISCAL_START_MONTH: u32 = 4;

/// Start year of the fiscal year containing `date`
pub fn fiscal_start_year(date: NaiveDate) -> i32 {
    if date.month() < FISCAL_START_MONTH {
        date.year() - 1
    } else {
        date.year()
    }
}

/// Display label, e.g. `2025/2026`
pub fn fiscal_year_label(start_year: i32) -> String {
    format!("{}/{}", start_year, start_year + 1)
}
