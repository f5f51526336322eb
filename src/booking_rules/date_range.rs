// Date range utility
//
// Date-only interval math shared by booking conflict checks and rule
// applicability checks. Both go through `overlaps`/`contains_day`.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::booking_rules::error::{BRResult, BookingRulesError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest stay that can be quoted, checked or booked
pub const MAX_STAY_NIGHTS: u32 = 365;

/// Parse a `YYYY-MM-DD` date string
pub fn parse_date(value: &str) -> BRResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| BookingRulesError::InvalidDate(value.to_string()))
}

/// Friday and Saturday nights are priced as weekend nights
pub fn is_weekend_night(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Fri | Weekday::Sat)
}

/// Inclusive date interval
///
/// `start <= end` always holds for a constructed range. Deserialized ranges
/// are checked again by the stores before they are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    #[schema(value_type = String, format = Date, example = "2025-01-01")]
    pub start: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-01-03")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> BRResult<Self> {
        if start > end {
            return Err(BookingRulesError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a range from two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> BRResult<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Re-check the ordering invariant on a range that bypassed `new`
    pub fn validate(&self) -> BRResult<()> {
        if self.start > self.end {
            return Err(BookingRulesError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Check a requested stay: ordered and at most `MAX_STAY_NIGHTS` long
    pub fn validate_stay(&self) -> BRResult<()> {
        self.validate()?;
        if self.nights() > MAX_STAY_NIGHTS {
            return Err(BookingRulesError::ValidationError(format!(
                "A stay can be at most {} nights, {} requested",
                MAX_STAY_NIGHTS,
                self.nights()
            )));
        }
        Ok(())
    }

    /// Number of nights; the checkout day is not a night
    pub fn nights(&self) -> u32 {
        (self.end - self.start).num_days().max(0) as u32
    }

    /// `a.start <= b.end && b.start <= a.end`
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// End-inclusive membership test
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Every calendar day from start through end, both included
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    /// The nights of a stay: start through the day before checkout
    pub fn night_days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day < end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_range() -> impl Strategy<Value = DateRange> {
        (0i64..3650, 0i64..60).prop_map(|(offset, len)| {
            let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
            let start = base + chrono::Duration::days(offset);
            DateRange::new(start, start + chrono::Duration::days(len)).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_overlap_is_symmetric(a in arb_range(), b in arb_range()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn prop_nights_match_night_days(range in arb_range()) {
            prop_assert_eq!(range.nights() as usize, range.night_days().count());
        }

        #[test]
        fn prop_same_day_range_has_zero_nights(range in arb_range()) {
            let single = DateRange::new(range.start, range.start).unwrap();
            prop_assert_eq!(single.nights(), 0);
        }

        #[test]
        fn prop_overlap_agrees_with_shared_day(a in arb_range(), b in arb_range()) {
            let shared = a.days().any(|day| b.contains_day(day));
            prop_assert_eq!(a.overlaps(&b), shared);
        }
    }
}
