//! # Closed Date Intervals
//!
//! `DateInterval` models the `[start, end]` windows carried by projects
//! and moratoriums. Both endpoints are included: two intervals that touch
//! at a single day overlap. The same predicate is used by the conflict
//! detector and the moratorium registry so the two writers cannot
//! disagree about what "overlapping" means.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A closed date interval `[start, end]` with `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    /// First day of the interval (inclusive).
    pub start: NaiveDate,
    /// Last day of the interval (inclusive).
    pub end: NaiveDate,
}

impl DateInterval {
    /// Construct an interval, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if end < start {
            return Err(Error::InvalidInput {
                field: "end_date".to_string(),
                message: format!("end date {end} precedes start date {start}"),
            });
        }
        Ok(Self { start, end })
    }

    /// Canonical closed-interval overlap: `[a, b]` overlaps `[c, d]`
    /// iff `a <= d && c <= b`. Touching at one day counts.
    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether the interval contains the given day.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of days covered, endpoints included.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Parse a strict ISO 8601 calendar date (`YYYY-MM-DD`).
///
/// Rejects anything that does not match the exact ten-character shape
/// before handing the string to chrono, which would otherwise accept
/// unpadded fields like `2024-1-5`.
pub fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    let shape_ok = s.len() == 10
        && s.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(Error::InvalidInput {
            field: "date".to_string(),
            message: format!("expected YYYY-MM-DD, got {s:?}"),
        });
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidInput {
        field: "date".to_string(),
        message: format!("not a calendar date: {s:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rejects_inverted_interval() {
        assert!(DateInterval::new(d("2024-02-15"), d("2024-01-15")).is_err());
    }

    #[test]
    fn single_day_interval_is_valid() {
        let iv = DateInterval::new(d("2024-01-15"), d("2024-01-15")).unwrap();
        assert_eq!(iv.len_days(), 1);
        assert!(iv.contains(d("2024-01-15")));
    }

    #[test]
    fn touching_intervals_overlap() {
        // Closed intervals: sharing exactly one day counts as overlap.
        let a = DateInterval::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let b = DateInterval::new(d("2024-01-31"), d("2024-02-28")).unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        let a = DateInterval::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let b = DateInterval::new(d("2024-02-01"), d("2024-02-28")).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn containment_counts_as_overlap() {
        // The contained case the source's three-disjunct predicate missed.
        let outer = DateInterval::new(d("2024-01-01"), d("2024-12-31")).unwrap();
        let inner = DateInterval::new(d("2024-06-01"), d("2024-06-30")).unwrap();
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn parse_date_accepts_strict_iso() {
        assert_eq!(parse_date("2024-01-15").unwrap(), d("2024-01-15"));
    }

    #[test]
    fn parse_date_rejects_unpadded_and_junk() {
        for bad in ["2024-1-15", "2024-01-5", "15-01-2024", "2024/01/15", "2024-01-15T00:00", ""] {
            assert!(parse_date(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn parse_date_rejects_impossible_dates() {
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("2024-02-29").is_ok());
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a_start in 0i64..2000, a_len in 0i64..400, b_start in 0i64..2000, b_len in 0i64..400) {
            let epoch = d("2020-01-01");
            let a = DateInterval::new(epoch + chrono::Days::new(a_start as u64),
                                      epoch + chrono::Days::new((a_start + a_len) as u64)).unwrap();
            let b = DateInterval::new(epoch + chrono::Days::new(b_start as u64),
                                      epoch + chrono::Days::new((b_start + b_len) as u64)).unwrap();
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn overlap_iff_shared_day(a_start in 0i64..120, a_len in 0i64..40, b_start in 0i64..120, b_len in 0i64..40) {
            let epoch = d("2020-01-01");
            let a = DateInterval::new(epoch + chrono::Days::new(a_start as u64),
                                      epoch + chrono::Days::new((a_start + a_len) as u64)).unwrap();
            let b = DateInterval::new(epoch + chrono::Days::new(b_start as u64),
                                      epoch + chrono::Days::new((b_start + b_len) as u64)).unwrap();
            let shared = (0..=200).any(|off| {
                let day = epoch + chrono::Days::new(off as u64);
                a.contains(day) && b.contains(day)
            });
            prop_assert_eq!(a.overlaps(&b), shared);
        }
    }
}
