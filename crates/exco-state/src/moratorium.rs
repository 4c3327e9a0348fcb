//! # Moratorium Validity Window
//!
//! A moratorium restricts digging in an area for a bounded period:
//! `valid_from <= valid_to <= valid_from + 5 years`. The bound uses
//! exact-year arithmetic (add 5 to the year field, keep month and day),
//! so a window starting Feb 29 in a leap year rolls its limit to Mar 1.

use chrono::{Datelike, NaiveDate};

use exco_core::Error;

/// The statutory maximum moratorium span, in years.
pub const MAX_DURATION_YEARS: i32 = 5;

/// The latest permitted `valid_to` for a window starting at `valid_from`.
///
/// Add-year arithmetic: the year field is incremented by five, month and
/// day preserved. Feb 29 in a non-leap target year rolls to Mar 1.
pub fn max_valid_to(valid_from: NaiveDate) -> NaiveDate {
    let target_year = valid_from.year() + MAX_DURATION_YEARS;
    valid_from.with_year(target_year).unwrap_or_else(|| {
        // Only Feb 29 has no counterpart in the target year.
        NaiveDate::from_ymd_opt(target_year, 3, 1).expect("Mar 1 exists in every year")
    })
}

/// Validate a moratorium validity window.
///
/// Rejects inverted windows as [`Error::InvalidInput`] and windows longer
/// than five years as [`Error::DurationExceeded`].
pub fn validate_window(valid_from: NaiveDate, valid_to: NaiveDate) -> Result<(), Error> {
    if valid_to < valid_from {
        return Err(Error::invalid_input(
            "valid_to",
            format!("end {valid_to} precedes start {valid_from}"),
        ));
    }
    let limit = max_valid_to(valid_from);
    if valid_to > limit {
        return Err(Error::DurationExceeded {
            valid_from,
            valid_to,
            max_valid_to: limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn exactly_five_years_is_accepted() {
        assert!(validate_window(d("2024-01-01"), d("2029-01-01")).is_ok());
    }

    #[test]
    fn one_day_over_is_rejected() {
        let err = validate_window(d("2024-01-01"), d("2029-01-02")).unwrap_err();
        match err {
            Error::DurationExceeded { max_valid_to, .. } => {
                assert_eq!(max_valid_to, d("2029-01-01"));
            }
            other => panic!("expected DurationExceeded, got: {other:?}"),
        }
    }

    #[test]
    fn six_years_is_rejected() {
        assert!(validate_window(d("2024-01-01"), d("2030-01-01")).is_err());
    }

    #[test]
    fn inverted_window_is_invalid_input() {
        let err = validate_window(d("2024-06-01"), d("2024-05-31")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn single_day_window_is_fine() {
        assert!(validate_window(d("2024-06-01"), d("2024-06-01")).is_ok());
    }

    #[test]
    fn leap_day_start_rolls_to_march_first() {
        // 2024-02-29 + 5 years: 2029 is not a leap year.
        assert_eq!(max_valid_to(d("2024-02-29")), d("2029-03-01"));
        assert!(validate_window(d("2024-02-29"), d("2029-03-01")).is_ok());
        assert!(validate_window(d("2024-02-29"), d("2029-03-02")).is_err());
    }

    #[test]
    fn leap_day_start_to_leap_year_keeps_feb_29() {
        // 2020-02-29 + 5 = 2025, not a leap year either; roll to Mar 1.
        assert_eq!(max_valid_to(d("2020-02-29")), d("2025-03-01"));
        // A plain date is preserved exactly.
        assert_eq!(max_valid_to(d("2020-02-28")), d("2025-02-28"));
    }

    proptest! {
        #[test]
        fn limit_is_at_least_five_calendar_years_away(offset in 0i64..15000) {
            let start = d("2000-01-01") + chrono::Days::new(offset as u64);
            let limit = max_valid_to(start);
            // Between 5*365 and 5*366 days, plus the possible Feb 29 roll.
            let days = (limit - start).num_days();
            prop_assert!((1824..=1828).contains(&days), "span {days} for {start}");
        }

        #[test]
        fn windows_inside_the_limit_validate(offset in 0i64..15000, span in 0i64..1824) {
            let start = d("2000-01-01") + chrono::Days::new(offset as u64);
            let end = start + chrono::Days::new(span as u64);
            prop_assert!(validate_window(start, end).is_ok());
        }
    }
}
