// Booking Rules Core
//
// Calendar-driven availability and pricing for the villas, plus the loyalty
// ledger and the notification intent queue:
// - DateRange: date interval math shared by every component
// - Rule configuration: holidays, seasonal pricing, blackouts, maintenance
// - Availability: per-room, per-day status and bookability
// - Pricing: per-night rates and stay quotes
// - Loyalty: points balance, tiers, FIFO redemption and expiry
// - Notifications: outbound intents with retry accounting

pub mod error;
pub mod types;
pub mod date_range;
pub mod rule_store;
pub mod availability;
pub mod pricing;
pub mod loyalty;
pub mod notifications;
pub mod metrics;
pub mod handlers;

// Re-export commonly used types for convenience
pub use error::{BookingRulesError, BRResult, ErrorResponse};
pub use types::{
    AdjustmentStrategy,
    BlackoutType,
    BookingStatus,
    DayStatus,
    DeliveryOutcome,
    LoyaltyTier,
    MaintenanceStatus,
    NotificationChannel,
    NotificationStatus,
    PaymentStatus,
    TransactionType,
};
pub use date_range::DateRange;
pub use rule_store::{
    BlackoutRule,
    HolidayRule,
    MaintenanceSchedule,
    RuleConfigurationStore,
    RuleConflict,
    RuleSnapshot,
    SeasonalPricingRule,
};
pub use availability::{AvailabilityIndex, DayAvailability};
pub use pricing::{PriceCalculator, Quote, QuoteAdjustment};
pub use loyalty::{LoyaltyConfig, LoyaltyLedger, MemberAccount, PointsTransaction};
pub use notifications::{NotificationIntent, NotificationIntentQueue};
pub use metrics::{MetricsSummary, OperationType, PerformanceMetrics};

// Booking Rules Engine - Orchestrator
//
// Takes one rule snapshot per call and runs the pure components over it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::bookings::models::Booking;
use crate::config::AppConfig;

/// Whether a stay can be booked, with the per-day breakdown
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityReport {
    pub room_id: String,
    pub date_range: DateRange,
    pub bookable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub days: Vec<DayAvailability>,
}

/// One day of a room calendar
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CalendarDay {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub status: DayStatus,
    /// Night rate rounded for display
    #[schema(value_type = f64)]
    pub nightly_rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holiday: Option<String>,
}

/// Booking Rules Engine
///
/// Owns the rule store, loyalty ledger and notification queue. Booking data
/// is passed in by the caller; `None` means it could not be loaded and the
/// availability index fails closed.
pub struct BookingRulesEngine {
    rules: Arc<RuleConfigurationStore>,
    loyalty: LoyaltyLedger,
    notifications: NotificationIntentQueue,
    metrics: PerformanceMetrics,
}

impl BookingRulesEngine {
    /// Engine with every collection held in memory
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            rules: Arc::new(RuleConfigurationStore::in_memory()),
            loyalty: LoyaltyLedger::in_memory(config.loyalty.clone()),
            notifications: NotificationIntentQueue::in_memory(config.notification_max_attempts),
            metrics: PerformanceMetrics::new(),
        }
    }

    /// Engine with collections persisted under `dir`
    pub async fn open(dir: &Path, config: &AppConfig) -> BRResult<Self> {
        Ok(Self {
            rules: Arc::new(RuleConfigurationStore::open(dir).await?),
            loyalty: LoyaltyLedger::open(dir, config.loyalty.clone()).await?,
            notifications: NotificationIntentQueue::open(dir, config.notification_max_attempts)
                .await?,
            metrics: PerformanceMetrics::new(),
        })
    }

    pub fn rules(&self) -> &RuleConfigurationStore {
        &self.rules
    }

    pub fn loyalty(&self) -> &LoyaltyLedger {
        &self.loyalty
    }

    pub fn notifications(&self) -> &NotificationIntentQueue {
        &self.notifications
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Check a stay and report every day's status
    pub async fn check_availability(
        &self,
        room_id: &str,
        range: &DateRange,
        booked_on: NaiveDate,
        bookings: Option<&[Booking]>,
    ) -> BRResult<AvailabilityReport> {
        let _timer = self.metrics.start(OperationType::Availability);
        range.validate_stay()?;

        let snapshot = self.rules.snapshot().await;
        let index = index_for(&snapshot, bookings);

        let reason = match index.check_bookable(room_id, range, booked_on) {
            Ok(()) => None,
            Err(BookingRulesError::UnavailableDate { date, reason, .. }) => {
                Some(format!("{}: {}", date, reason))
            }
            Err(e) => return Err(e),
        };

        Ok(AvailabilityReport {
            room_id: room_id.to_string(),
            date_range: *range,
            bookable: reason.is_none(),
            reason,
            days: index.range_availability(room_id, range),
        })
    }

    /// Quote a stay against the current rules and bookings
    pub async fn quote(
        &self,
        room_id: &str,
        range: &DateRange,
        base_rate: Decimal,
        booked_on: NaiveDate,
        bookings: Option<&[Booking]>,
    ) -> BRResult<Quote> {
        let _timer = self.metrics.start(OperationType::Quote);

        let snapshot = self.rules.snapshot().await;
        let index = index_for(&snapshot, bookings);
        PriceCalculator::new(&snapshot).quote(&index, room_id, range, base_rate, booked_on)
    }

    /// Status and nightly rate for every day of a month
    pub async fn calendar(
        &self,
        room_id: &str,
        year: i32,
        month: u32,
        base_rate: Decimal,
        bookings: Option<&[Booking]>,
    ) -> BRResult<Vec<CalendarDay>> {
        let days_of_month = month_range(year, month)?;

        let snapshot = self.rules.snapshot().await;
        let index = index_for(&snapshot, bookings);
        let calculator = PriceCalculator::new(&snapshot);

        days_of_month
            .days()
            .map(|day| {
                let night = calculator.nightly_rate(day, base_rate)?;
                Ok(CalendarDay {
                    date: day,
                    status: index.day_status(room_id, day),
                    nightly_rate: pricing::round_currency(night.rate),
                    holiday: night.holiday,
                })
            })
            .collect()
    }

    /// Earn points for a paid booking, once per booking
    ///
    /// Returns `None` when the amount is too small to earn a point. Calling
    /// it again for the same booking returns the original earn.
    pub async fn award_booking_points(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> BRResult<Option<PointsTransaction>> {
        let _timer = self.metrics.start(OperationType::Loyalty);

        let points = self.loyalty.config().points_for_amount(amount)?;
        if points == 0 {
            return Ok(None);
        }
        let reason = format!("Booking {}", booking_id);
        self.loyalty
            .record_earn(user_id, points, &reason, Some(booking_id), now)
            .await
            .map(Some)
    }

    /// Same-kind rules that cannot be ordered deterministically
    pub async fn detect_conflicts(&self) -> Vec<RuleConflict> {
        self.rules.snapshot().await.detect_conflicts()
    }
}

fn index_for<'a>(snapshot: &'a RuleSnapshot, bookings: Option<&'a [Booking]>) -> AvailabilityIndex<'a> {
    match bookings {
        Some(bookings) => AvailabilityIndex::new(snapshot, bookings),
        None => AvailabilityIndex::fail_closed(snapshot),
    }
}

/// First through last day of a calendar month
pub fn month_range(year: i32, month: u32) -> BRResult<DateRange> {
    let invalid = || BookingRulesError::InvalidDate(format!("{}-{:02}", year, month));

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    let last = next.pred_opt().ok_or_else(invalid)?;

    DateRange::new(first, last)
}
