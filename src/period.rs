//! Reporting period
//!
//! Every run works on the last completed calendar month. The period carries that
//! month's last calendar day, its last working day and the `YYYYMM` key under which
//! results are cached.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// Period errors
#[derive(Debug, thiserror::Error)]
pub enum PeriodError {
    /// Holiday calendar contains something that is not a `YYYY-MM-DD` date
    #[error("invalid holiday date {value:?}: {reason}")]
    InvalidHoliday {
        /// Offending token
        value: String,
        /// Parser message
        reason: String,
    },

    /// Holiday calendar file could not be read
    #[error("failed to read holiday calendar {path}: {reason}")]
    Read {
        /// Calendar path
        path: String,
        /// IO message
        reason: String,
    },

    /// Date arithmetic left the supported range
    #[error("date out of range: {0}")]
    OutOfRange(String),
}

/// Non-working days besides weekends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    days: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Calendar without holidays
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse whitespace-separated `YYYY-MM-DD` dates
    pub fn parse(text: &str) -> Result<Self, PeriodError> {
        let days = text
            .split_whitespace()
            .map(|token| {
                NaiveDate::parse_from_str(token, "%Y-%m-%d").map_err(|e| {
                    PeriodError::InvalidHoliday {
                        value: token.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { days })
    }

    /// Read and parse a calendar file
    pub fn from_file(path: &Path) -> Result<Self, PeriodError> {
        let text = std::fs::read_to_string(path).map_err(|e| PeriodError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Whether `date` is a listed holiday
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    /// Whether `date` is neither a weekend nor a holiday
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Number of listed holidays
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether no holidays are listed
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// The reporting period a run fetches and caches data for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportPeriod {
    report_date: NaiveDate,
    work_date: NaiveDate,
}

impl ReportPeriod {
    /// Period for the month preceding `today`
    pub fn for_today(today: NaiveDate, calendar: &HolidayCalendar) -> Result<Self, PeriodError> {
        let first_of_month = today
            .with_day(1)
            .ok_or_else(|| PeriodError::OutOfRange(today.to_string()))?;
        let report_date = first_of_month
            .pred_opt()
            .ok_or_else(|| PeriodError::OutOfRange(first_of_month.to_string()))?;
        Self::ending(report_date, calendar)
    }

    /// Period whose last calendar day is `report_date`
    pub fn ending(report_date: NaiveDate, calendar: &HolidayCalendar) -> Result<Self, PeriodError> {
        let mut work_date = report_date;
        while !calendar.is_working_day(work_date) {
            work_date = work_date
                .pred_opt()
                .ok_or_else(|| PeriodError::OutOfRange(work_date.to_string()))?;
        }
        Ok(Self {
            report_date,
            work_date,
        })
    }

    /// Last calendar day of the period
    pub fn report_date(&self) -> NaiveDate {
        self.report_date
    }

    /// Last working day of the period
    pub fn work_date(&self) -> NaiveDate {
        self.work_date
    }

    /// Report date minus `days`
    pub fn report_date_minus(&self, days: i64) -> NaiveDate {
        self.report_date - Duration::days(days)
    }

    /// Work date minus `days`
    pub fn work_date_minus(&self, days: i64) -> NaiveDate {
        self.work_date - Duration::days(days)
    }

    /// Cache key, `YYYYMM`
    pub fn key(&self) -> String {
        self.report_date.format("%Y%m").to_string()
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
