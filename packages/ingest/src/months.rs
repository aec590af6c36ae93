//! Calendar-month arithmetic for the landing catalog.

use chrono::{DateTime, Datelike as _, Duration, Months, NaiveDate, Utc};
use quake_map_quake_models::{CatalogEntry, CatalogStatus, TimeWindow};

/// First day of the month containing `date`.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// The month as a closed UTC window: midnight on the first through the
/// last second of the last day.
#[must_use]
pub fn month_bounds_utc(month: NaiveDate) -> TimeWindow {
    let first = month_start(month);
    let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
    let start = first.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = next.and_time(chrono::NaiveTime::MIN).and_utc() - Duration::seconds(1);
    TimeWindow::new(start, end)
}

/// The current month and the `months_back` months before it, oldest first.
#[must_use]
pub fn target_months(now: DateTime<Utc>, months_back: u32) -> Vec<NaiveDate> {
    let current = month_start(now.date_naive());
    (0..=months_back)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .collect()
}

/// Whether a month must be (re-)landed given its catalog row.
///
/// Only finalized `landed` months are skipped; the current month is never
/// finalized and so is refreshed on every run.
#[must_use]
pub fn needs_landing(entry: Option<&CatalogEntry>) -> bool {
    entry.is_none_or(|e| e.status != CatalogStatus::Landed || !e.finalized)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bounds_cover_whole_month() {
        let window = month_bounds_utc(date(2024, 2, 17));
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());

        let december = month_bounds_utc(date(2024, 12, 1));
        assert_eq!(december.end, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn targets_cross_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 2, 14, 9, 30, 0).unwrap();
        assert_eq!(
            target_months(now, 3),
            vec![
                date(2024, 11, 1),
                date(2024, 12, 1),
                date(2025, 1, 1),
                date(2025, 2, 1)
            ]
        );
        assert_eq!(target_months(now, 0), vec![date(2025, 2, 1)]);
    }

    #[test]
    fn landing_rules() {
        let mut entry = CatalogEntry {
            month_start: date(2025, 1, 1),
            status: CatalogStatus::Landed,
            finalized: true,
            row_count: 10,
            coverage: month_bounds_utc(date(2025, 1, 1)),
            error: None,
            updated_at: None,
        };
        assert!(needs_landing(None));
        assert!(!needs_landing(Some(&entry)));

        entry.finalized = false;
        assert!(needs_landing(Some(&entry)));

        entry.finalized = true;
        entry.status = CatalogStatus::Error;
        assert!(needs_landing(Some(&entry)));
    }
}
