//! Unit tests for reporting periods and holiday calendars

use chrono::{Datelike, NaiveDate};
use std::io::Write;
use tempfile::NamedTempFile;

use refdata_harvester::period::{HolidayCalendar, PeriodError, ReportPeriod};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_every_day_of_a_month_maps_to_the_same_period() {
    let calendar = HolidayCalendar::new();
    let expected = ReportPeriod::for_today(date(2024, 3, 1), &calendar).unwrap();

    for day in 1..=31 {
        let period = ReportPeriod::for_today(date(2024, 3, day), &calendar).unwrap();
        assert_eq!(period, expected, "2024-03-{day:02}");
    }
    assert_eq!(expected.report_date(), date(2024, 2, 29));
    assert_eq!(expected.key(), "202402");
}

#[test]
fn test_work_date_is_never_after_report_date() {
    let calendar = HolidayCalendar::parse("2023-12-29 2024-06-28").unwrap();
    for month in 1..=12 {
        let period = ReportPeriod::for_today(date(2024, month, 5), &calendar).unwrap();
        assert!(period.work_date() <= period.report_date());
        assert!(calendar.is_working_day(period.work_date()));
        assert_eq!(period.work_date().month(), period.report_date().month());
    }
}

#[test]
fn test_calendar_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "2024-01-01").unwrap();
    writeln!(file, "2024-01-02  2024-01-08").unwrap();
    file.flush().unwrap();

    let calendar = HolidayCalendar::from_file(file.path()).unwrap();

    assert_eq!(calendar.len(), 3);
    assert!(calendar.is_holiday(date(2024, 1, 8)));
    assert!(!calendar.is_working_day(date(2024, 1, 2)));
    assert!(!calendar.is_working_day(date(2024, 1, 6)), "Saturday");
    assert!(calendar.is_working_day(date(2024, 1, 9)));
}

#[test]
fn test_missing_calendar_file_is_a_read_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = HolidayCalendar::from_file(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, PeriodError::Read { .. }));
}

#[test]
fn test_display_is_the_cache_key() {
    let period = ReportPeriod::ending(date(2023, 11, 30), &HolidayCalendar::new()).unwrap();
    assert_eq!(period.to_string(), "202311");
    assert_eq!(period.to_string(), period.key());
}
