// Availability Index
//
// Derives per-room, per-day status from the booking collection and the rule
// snapshot, and decides whether a stay can be booked. Pure reads over data
// loaded at the start of the request.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::booking_rules::{
    date_range::DateRange,
    error::{BRResult, BookingRulesError},
    rule_store::RuleSnapshot,
    types::{BookingStatus, DayStatus},
};
use crate::bookings::models::Booking;

/// Status of one room on one day, with the rule or booking that caused it
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayAvailability {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub status: DayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// Availability Index
///
/// `bookings` is `None` when the booking collection could not be read. Every
/// day is then reported as `Unknown`, which blocks booking.
pub struct AvailabilityIndex<'a> {
    rules: &'a RuleSnapshot,
    bookings: Option<&'a [Booking]>,
}

impl<'a> AvailabilityIndex<'a> {
    pub fn new(rules: &'a RuleSnapshot, bookings: &'a [Booking]) -> Self {
        Self {
            rules,
            bookings: Some(bookings),
        }
    }

    /// Index used when booking data is unavailable
    pub fn fail_closed(rules: &'a RuleSnapshot) -> Self {
        tracing::warn!("Booking collection unavailable; treating all days as unavailable");
        Self {
            rules,
            bookings: None,
        }
    }

    /// Status of `room_id` on `day`; the highest-priority condition wins
    pub fn day_status(&self, room_id: &str, day: NaiveDate) -> DayStatus {
        self.day_availability(room_id, day).status
    }

    pub fn day_availability(&self, room_id: &str, day: NaiveDate) -> DayAvailability {
        let mut best = DayAvailability {
            date: day,
            status: DayStatus::Available,
            source_id: None,
        };
        let mut consider = |status: DayStatus, source_id: &str| {
            if status > best.status {
                best.status = status;
                best.source_id = Some(source_id.to_string());
            }
        };

        for rule in &self.rules.blackouts {
            if !rule.allow_booking && rule.date_range.contains_day(day) {
                consider(DayStatus::Blackout, &rule.id);
            }
        }

        for schedule in &self.rules.maintenance {
            if schedule.date_range.contains_day(day) && schedule.blocks_room(room_id) {
                consider(DayStatus::Maintenance, &schedule.id);
            }
        }

        match self.bookings {
            Some(bookings) => {
                for booking in bookings {
                    if booking.room_id != room_id || !booking.date_range.contains_day(day) {
                        continue;
                    }
                    match booking.status {
                        BookingStatus::Confirmed | BookingStatus::Completed => {
                            consider(DayStatus::Booked, &booking.id)
                        }
                        BookingStatus::Pending => consider(DayStatus::Pending, &booking.id),
                        BookingStatus::Cancelled => {}
                    }
                }
            }
            None => consider(DayStatus::Unknown, "bookings"),
        }

        if let Some(holiday) = self.rules.holiday_for(day) {
            consider(DayStatus::Holiday, &holiday.id);
        }

        best
    }

    /// Per-day availability for every day of `range`
    pub fn range_availability(&self, room_id: &str, range: &DateRange) -> Vec<DayAvailability> {
        range
            .days()
            .map(|day| self.day_availability(room_id, day))
            .collect()
    }

    pub fn is_bookable(&self, room_id: &str, range: &DateRange, booked_on: NaiveDate) -> bool {
        self.check_bookable(room_id, range, booked_on).is_ok()
    }

    /// Reject a stay that touches a blocked day or breaks a stay restriction
    ///
    /// Blocked days report the first blocked date. Restriction failures
    /// (minimum/maximum stay, advance booking) report the check-in date.
    pub fn check_bookable(
        &self,
        room_id: &str,
        range: &DateRange,
        booked_on: NaiveDate,
    ) -> BRResult<()> {
        range.validate()?;

        let unavailable = |date: NaiveDate, reason: String| BookingRulesError::UnavailableDate {
            room_id: room_id.to_string(),
            date,
            reason,
        };

        if range.start < booked_on {
            return Err(unavailable(
                range.start,
                "check-in date has already passed".to_string(),
            ));
        }

        for day in range.days() {
            let status = self.day_status(room_id, day);
            if status.blocks_booking() {
                tracing::debug!(room_id, %day, %status, "Day blocks booking");
                return Err(unavailable(day, status.to_string()));
            }
        }

        let nights = range.nights();
        let lead_days = (range.start - booked_on).num_days();

        for rule in self.rules.blackouts_in_range(range) {
            // allow_booking = false was already caught by the day scan
            if let Some(min) = rule.minimum_stay {
                if nights < min {
                    return Err(unavailable(
                        range.start,
                        format!("{} requires a minimum stay of {} nights", rule.name, min),
                    ));
                }
            }
            if let Some(max) = rule.maximum_stay {
                if nights > max {
                    return Err(unavailable(
                        range.start,
                        format!("{} allows at most {} nights", rule.name, max),
                    ));
                }
            }
            if let Some(advance) = rule.advance_booking_days {
                if lead_days < i64::from(advance) {
                    return Err(unavailable(
                        range.start,
                        format!("{} must be booked {} days in advance", rule.name, advance),
                    ));
                }
            }
        }

        for rule in self.rules.seasonal_rules_in_range(range) {
            if !rule.is_active {
                continue;
            }
            if rule.minimum_stay > 0 && nights < rule.minimum_stay {
                return Err(unavailable(
                    range.start,
                    format!("{} requires a minimum stay of {} nights", rule.name, rule.minimum_stay),
                ));
            }
            if rule.advance_booking_days > 0 && lead_days < i64::from(rule.advance_booking_days) {
                return Err(unavailable(
                    range.start,
                    format!(
                        "{} must be booked {} days in advance",
                        rule.name, rule.advance_booking_days
                    ),
                ));
            }
        }

        for holiday in self.rules.holidays_in_range(range) {
            if holiday.min_stay_required > 0 && nights < holiday.min_stay_required {
                return Err(unavailable(
                    range.start,
                    format!(
                        "{} requires a minimum stay of {} nights",
                        holiday.name_en, holiday.min_stay_required
                    ),
                ));
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::booking;
    use super::*;
    use crate::booking_rules::date_range::parse_date;
    use crate::booking_rules::rule_store::fixtures::*;
    use crate::booking_rules::types::AdjustmentStrategy;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn booked_on() -> NaiveDate {
        day("2024-12-01")
    }

    #[test]
    fn test_priority_order() {
        let rules = RuleSnapshot {
            holidays: vec![holiday("new-year", "2025-01-01", "2025-01-01", dec!(1.5))],
            blackouts: vec![blackout("private", "2025-01-05", "2025-01-05", false)],
            maintenance: vec![maintenance("pool", "2025-01-04", "2025-01-05", &[])],
            ..Default::default()
        };
        let bookings = vec![
            booking("b1", "villa-1", "2025-01-01", "2025-01-02", BookingStatus::Pending),
            booking("b2", "villa-1", "2025-01-02", "2025-01-04", BookingStatus::Confirmed),
        ];
        let index = AvailabilityIndex::new(&rules, &bookings);

        assert_eq!(index.day_status("villa-1", day("2025-01-01")), DayStatus::Pending);
        assert_eq!(index.day_status("villa-1", day("2025-01-02")), DayStatus::Booked);
        assert_eq!(index.day_status("villa-1", day("2025-01-04")), DayStatus::Maintenance);
        assert_eq!(index.day_status("villa-1", day("2025-01-05")), DayStatus::Blackout);
        assert_eq!(index.day_status("villa-1", day("2025-01-06")), DayStatus::Available);

        // Other rooms only see the rules
        assert_eq!(index.day_status("villa-2", day("2025-01-01")), DayStatus::Holiday);
        assert_eq!(index.day_status("villa-2", day("2025-01-02")), DayStatus::Available);
    }

    #[test]
    fn test_cancelled_booking_frees_days() {
        let rules = RuleSnapshot::default();
        let bookings = vec![booking("b1", "villa-1", "2025-01-01", "2025-01-03", BookingStatus::Cancelled)];
        let index = AvailabilityIndex::new(&rules, &bookings);

        let stay = range("2025-01-01", "2025-01-03");
        assert!(index.is_bookable("villa-1", &stay, booked_on()));
    }

    #[test]
    fn test_holiday_does_not_block() {
        let rules = RuleSnapshot {
            holidays: vec![holiday("new-year", "2025-01-01", "2025-01-01", dec!(1.5))],
            ..Default::default()
        };
        let index = AvailabilityIndex::new(&rules, &[]);
        assert!(index.is_bookable("villa-1", &range("2025-01-01", "2025-01-03"), booked_on()));
    }

    #[test]
    fn test_blocked_day_reports_date() {
        let rules = RuleSnapshot::default();
        let bookings = vec![booking("b1", "villa-1", "2025-01-02", "2025-01-04", BookingStatus::Pending)];
        let index = AvailabilityIndex::new(&rules, &bookings);

        let err = index
            .check_bookable("villa-1", &range("2025-01-01", "2025-01-03"), booked_on())
            .unwrap_err();
        match err {
            BookingRulesError::UnavailableDate { date, reason, .. } => {
                assert_eq!(date, day("2025-01-02"));
                assert_eq!(reason, "pending");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_partial_maintenance_does_not_block_rooms() {
        let mut spa = maintenance("spa", "2025-01-01", "2025-01-05", &[]);
        spa.partial_closure = true;
        let rules = RuleSnapshot {
            maintenance: vec![spa, maintenance("roof", "2025-01-01", "2025-01-05", &["villa-2"])],
            ..Default::default()
        };
        let index = AvailabilityIndex::new(&rules, &[]);

        assert!(index.is_bookable("villa-1", &range("2025-01-01", "2025-01-03"), booked_on()));
        assert!(!index.is_bookable("villa-2", &range("2025-01-01", "2025-01-03"), booked_on()));
    }

    #[test]
    fn test_stay_restrictions() {
        let mut festival = blackout("festival", "2025-04-10", "2025-04-20", true);
        festival.minimum_stay = Some(3);
        festival.maximum_stay = Some(5);

        let mut peak = seasonal("peak", "2025-12-20", "2025-12-31", AdjustmentStrategy::Percentage, dec!(20));
        peak.advance_booking_days = 30;

        let mut songkran = holiday("songkran", "2025-04-13", "2025-04-15", dec!(2));
        songkran.min_stay_required = 2;

        let rules = RuleSnapshot {
            holidays: vec![songkran],
            seasonal_rules: vec![peak],
            blackouts: vec![festival],
            ..Default::default()
        };
        let index = AvailabilityIndex::new(&rules, &[]);

        // Too short, then too long, then within limits
        assert!(!index.is_bookable("villa-1", &range("2025-04-11", "2025-04-13"), booked_on()));
        assert!(!index.is_bookable("villa-1", &range("2025-04-10", "2025-04-16"), booked_on()));
        assert!(index.is_bookable("villa-1", &range("2025-04-10", "2025-04-14"), booked_on()));

        // Lead time of 19 days against a 30 day requirement
        let err = index
            .check_bookable("villa-1", &range("2025-12-20", "2025-12-22"), day("2025-12-01"))
            .unwrap_err();
        assert!(matches!(err, BookingRulesError::UnavailableDate { date, .. } if date == day("2025-12-20")));
        assert!(index.is_bookable("villa-1", &range("2025-12-20", "2025-12-22"), day("2025-11-01")));
    }

    #[test]
    fn test_past_check_in_rejected() {
        let rules = RuleSnapshot::default();
        let index = AvailabilityIndex::new(&rules, &[]);
        assert!(!index.is_bookable("villa-1", &range("2024-11-01", "2024-11-03"), booked_on()));
    }

    #[test]
    fn test_fail_closed() {
        let rules = RuleSnapshot::default();
        let index = AvailabilityIndex::fail_closed(&rules);

        assert_eq!(index.day_status("villa-1", day("2025-01-01")), DayStatus::Unknown);
        assert!(!index.is_bookable("villa-1", &range("2025-01-01", "2025-01-03"), booked_on()));
    }
}
