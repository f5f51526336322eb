// Rule Configuration Store
//
// Holds holiday, seasonal pricing, blackout and maintenance rules. Rules are
// validated when saved, never when queried; queries run against a
// `RuleSnapshot` taken at the start of a request.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;

use crate::booking_rules::{
    date_range::DateRange,
    error::{BRResult, BookingRulesError},
    types::{AdjustmentStrategy, BlackoutType, MaintenanceStatus},
};
use crate::store::{JsonStore, Record};
use crate::validation::MAX_NIGHTLY_RATE;

/// Largest holiday, weekend or seasonal multiplier a rule can carry
const MAX_MULTIPLIER: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Largest percentage surcharge a rule can carry
const MAX_PERCENT_SURCHARGE: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

/// Holiday with a price multiplier and optional minimum stay
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HolidayRule {
    pub id: String,
    pub date_range: DateRange,
    pub name_local: String,
    pub name_en: String,
    #[schema(value_type = f64, example = 1.5)]
    pub price_multiplier: Decimal,
    #[serde(default)]
    pub min_stay_required: u32,
    #[serde(default)]
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Long-stay discount tier: `discount_percent` off once `nights` is reached
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LongStayDiscount {
    pub nights: u32,
    #[schema(value_type = f64, example = 10)]
    pub discount_percent: Decimal,
}

/// Early-bird discount for bookings made well ahead of check-in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarlyBird {
    pub enabled: bool,
    #[schema(value_type = f64, example = 5)]
    pub discount_percent: Decimal,
    pub days_before_check_in: u32,
}

/// Date-range scoped price adjustment independent of holidays
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeasonalPricingRule {
    pub id: String,
    pub name: String,
    pub date_range: DateRange,
    pub strategy: AdjustmentStrategy,
    #[schema(value_type = f64, example = -20)]
    pub base_adjustment: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<f64>, example = 1.2)]
    pub weekend_multiplier: Option<Decimal>,
    #[serde(default)]
    pub long_stay_discount: Vec<LongStayDiscount>,
    #[serde(default)]
    pub early_bird: Option<EarlyBird>,
    #[serde(default)]
    pub minimum_stay: u32,
    #[serde(default)]
    pub advance_booking_days: u32,
    #[serde(default)]
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Surcharge or reduction attached to a bookable blackout period
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlackoutPriceAdjustment {
    pub enabled: bool,
    pub strategy: AdjustmentStrategy,
    #[schema(value_type = f64, example = 10)]
    pub value: Decimal,
}

/// Date range during which booking is disallowed or restricted
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlackoutRule {
    pub id: String,
    pub name: String,
    pub date_range: DateRange,
    #[serde(rename = "type")]
    pub blackout_type: BlackoutType,
    pub allow_booking: bool,
    #[serde(default)]
    pub minimum_stay: Option<u32>,
    #[serde(default)]
    pub maximum_stay: Option<u32>,
    #[serde(default)]
    pub advance_booking_days: Option<u32>,
    #[serde(default)]
    pub price_adjustment: Option<BlackoutPriceAdjustment>,
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

/// Planned maintenance work
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MaintenanceSchedule {
    pub id: String,
    pub title: String,
    pub date_range: DateRange,
    pub affects_booking: bool,
    #[serde(default)]
    pub partial_closure: bool,
    /// Affected rooms; empty means the whole property
    #[serde(default)]
    pub room_ids: Vec<String>,
    pub status: MaintenanceStatus,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceSchedule {
    /// Whether this schedule makes `room_id` unbookable on the days it covers
    ///
    /// A partial closure with no listed rooms closes facilities, not rooms.
    pub fn blocks_room(&self, room_id: &str) -> bool {
        if !self.affects_booking || !self.status.is_active() {
            return false;
        }
        if self.room_ids.is_empty() {
            !self.partial_closure
        } else {
            self.room_ids.iter().any(|id| id == room_id)
        }
    }
}

impl Record for HolidayRule {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Record for SeasonalPricingRule {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Record for BlackoutRule {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Record for MaintenanceSchedule {
    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Two rules that cannot be ordered by priority or creation time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RuleConflict {
    pub kind: String,
    pub first_id: String,
    pub second_id: String,
    pub priority: i32,
}

impl From<&RuleConflict> for BookingRulesError {
    fn from(conflict: &RuleConflict) -> Self {
        BookingRulesError::RuleConflict {
            first: conflict.first_id.clone(),
            second: conflict.second_id.clone(),
            reason: format!(
                "{} rules share priority {} and creation time",
                conflict.kind, conflict.priority
            ),
        }
    }
}

/// Point-in-time copy of every rule, used for one request
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    pub holidays: Vec<HolidayRule>,
    pub seasonal_rules: Vec<SeasonalPricingRule>,
    pub blackouts: Vec<BlackoutRule>,
    pub maintenance: Vec<MaintenanceSchedule>,
}

impl RuleSnapshot {
    pub fn holidays_in_range(&self, range: &DateRange) -> Vec<&HolidayRule> {
        self.holidays
            .iter()
            .filter(|rule| rule.date_range.overlaps(range))
            .collect()
    }

    pub fn seasonal_rules_in_range(&self, range: &DateRange) -> Vec<&SeasonalPricingRule> {
        self.seasonal_rules
            .iter()
            .filter(|rule| rule.date_range.overlaps(range))
            .collect()
    }

    pub fn blackouts_in_range(&self, range: &DateRange) -> Vec<&BlackoutRule> {
        self.blackouts
            .iter()
            .filter(|rule| rule.date_range.overlaps(range))
            .collect()
    }

    /// Holiday covering `day` with the largest multiplier
    ///
    /// Multipliers of overlapping holidays are never compounded.
    pub fn holiday_for(&self, day: NaiveDate) -> Option<&HolidayRule> {
        self.holidays
            .iter()
            .filter(|rule| rule.date_range.contains_day(day))
            .max_by(|a, b| a.price_multiplier.cmp(&b.price_multiplier))
    }

    /// Active seasonal rule in force on `day`
    ///
    /// Highest priority wins, then the most recently created rule. Two
    /// candidates equal on both counts are a `RuleConflict`.
    pub fn winning_seasonal_rule(&self, day: NaiveDate) -> BRResult<Option<&SeasonalPricingRule>> {
        let mut candidates: Vec<&SeasonalPricingRule> = self
            .seasonal_rules
            .iter()
            .filter(|rule| rule.is_active && rule.date_range.contains_day(day))
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        if let [first, second, ..] = candidates.as_slice() {
            if first.priority == second.priority && first.created_at == second.created_at {
                return Err(BookingRulesError::RuleConflict {
                    first: first.id.clone(),
                    second: second.id.clone(),
                    reason: format!(
                        "seasonal rules share priority {} and creation time on {}",
                        first.priority, day
                    ),
                });
            }
        }

        Ok(candidates.first().copied())
    }

    /// Highest-priority enabled blackout price adjustment covering `day`
    pub fn blackout_adjustment_for(
        &self,
        day: NaiveDate,
    ) -> Option<(&BlackoutRule, &BlackoutPriceAdjustment)> {
        self.blackouts
            .iter()
            .filter(|rule| rule.allow_booking && rule.date_range.contains_day(day))
            .filter_map(|rule| match rule.price_adjustment {
                Some(ref adjustment) if adjustment.enabled => Some((rule, adjustment)),
                _ => None,
            })
            .max_by(|(a, _), (b, _)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
    }

    /// Same-kind rules that overlap with equal priority and creation time
    pub fn detect_conflicts(&self) -> Vec<RuleConflict> {
        let mut conflicts = Vec::new();

        let seasonal: Vec<&SeasonalPricingRule> =
            self.seasonal_rules.iter().filter(|r| r.is_active).collect();
        for (i, a) in seasonal.iter().enumerate() {
            for b in &seasonal[i + 1..] {
                if a.priority == b.priority
                    && a.created_at == b.created_at
                    && a.date_range.overlaps(&b.date_range)
                {
                    conflicts.push(RuleConflict {
                        kind: "seasonal".to_string(),
                        first_id: a.id.clone(),
                        second_id: b.id.clone(),
                        priority: a.priority,
                    });
                }
            }
        }

        for (i, a) in self.blackouts.iter().enumerate() {
            for b in &self.blackouts[i + 1..] {
                if a.priority == b.priority
                    && a.created_at == b.created_at
                    && a.date_range.overlaps(&b.date_range)
                {
                    conflicts.push(RuleConflict {
                        kind: "blackout".to_string(),
                        first_id: a.id.clone(),
                        second_id: b.id.clone(),
                        priority: a.priority,
                    });
                }
            }
        }

        conflicts
    }
}

/// Rule Configuration Store
///
/// Admin-edited flat records keyed by id. No relational constraints beyond
/// date-range validity.
pub struct RuleConfigurationStore {
    holidays: JsonStore<HolidayRule>,
    seasonal_rules: JsonStore<SeasonalPricingRule>,
    blackouts: JsonStore<BlackoutRule>,
    maintenance: JsonStore<MaintenanceSchedule>,
}

impl RuleConfigurationStore {
    pub fn in_memory() -> Self {
        Self {
            holidays: JsonStore::in_memory("holidays"),
            seasonal_rules: JsonStore::in_memory("seasonal_rules"),
            blackouts: JsonStore::in_memory("blackouts"),
            maintenance: JsonStore::in_memory("maintenance"),
        }
    }

    /// Open every rule collection under `dir`
    pub async fn open(dir: &Path) -> BRResult<Self> {
        Ok(Self {
            holidays: JsonStore::open(dir, "holidays").await?,
            seasonal_rules: JsonStore::open(dir, "seasonal_rules").await?,
            blackouts: JsonStore::open(dir, "blackouts").await?,
            maintenance: JsonStore::open(dir, "maintenance").await?,
        })
    }

    /// Copy all rules for a single request
    pub async fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            holidays: self.holidays.list().await,
            seasonal_rules: self.seasonal_rules.list().await,
            blackouts: self.blackouts.list().await,
            maintenance: self.maintenance.list().await,
        }
    }

    pub async fn list_holidays(&self) -> Vec<HolidayRule> {
        self.holidays.list().await
    }

    pub async fn list_seasonal_rules(&self) -> Vec<SeasonalPricingRule> {
        self.seasonal_rules.list().await
    }

    pub async fn list_blackouts(&self) -> Vec<BlackoutRule> {
        self.blackouts.list().await
    }

    pub async fn list_maintenance(&self) -> Vec<MaintenanceSchedule> {
        self.maintenance.list().await
    }

    /// Create or replace a holiday rule after validation
    pub async fn save_holiday(&self, rule: HolidayRule) -> BRResult<HolidayRule> {
        validate_holiday(&rule)?;
        self.holidays.put(rule.clone()).await?;
        tracing::info!(rule_id = %rule.id, range = %rule.date_range, "Saved holiday rule");
        Ok(rule)
    }

    pub async fn save_seasonal_rule(
        &self,
        rule: SeasonalPricingRule,
    ) -> BRResult<SeasonalPricingRule> {
        validate_seasonal_rule(&rule)?;
        self.seasonal_rules.put(rule.clone()).await?;
        tracing::info!(rule_id = %rule.id, range = %rule.date_range, "Saved seasonal pricing rule");
        Ok(rule)
    }

    pub async fn save_blackout(&self, rule: BlackoutRule) -> BRResult<BlackoutRule> {
        validate_blackout(&rule)?;
        self.blackouts.put(rule.clone()).await?;
        tracing::info!(rule_id = %rule.id, range = %rule.date_range, "Saved blackout rule");
        Ok(rule)
    }

    pub async fn save_maintenance(
        &self,
        schedule: MaintenanceSchedule,
    ) -> BRResult<MaintenanceSchedule> {
        schedule.date_range.validate()?;
        self.maintenance.put(schedule.clone()).await?;
        tracing::info!(schedule_id = %schedule.id, range = %schedule.date_range, "Saved maintenance schedule");
        Ok(schedule)
    }

    pub async fn delete_holiday(&self, id: &str) -> BRResult<()> {
        self.holidays
            .remove(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| BookingRulesError::not_found("Holiday rule", id))
    }

    pub async fn delete_seasonal_rule(&self, id: &str) -> BRResult<()> {
        self.seasonal_rules
            .remove(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| BookingRulesError::not_found("Seasonal pricing rule", id))
    }

    pub async fn delete_blackout(&self, id: &str) -> BRResult<()> {
        self.blackouts
            .remove(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| BookingRulesError::not_found("Blackout rule", id))
    }

    pub async fn delete_maintenance(&self, id: &str) -> BRResult<()> {
        self.maintenance
            .remove(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| BookingRulesError::not_found("Maintenance schedule", id))
    }
}

fn validate_holiday(rule: &HolidayRule) -> BRResult<()> {
    rule.date_range.validate()?;
    if rule.price_multiplier < Decimal::ONE || rule.price_multiplier > MAX_MULTIPLIER {
        return Err(BookingRulesError::ValidationError(format!(
            "Holiday '{}' price_multiplier must be between 1 and {}",
            rule.name_en, MAX_MULTIPLIER
        )));
    }
    Ok(())
}

fn validate_seasonal_rule(rule: &SeasonalPricingRule) -> BRResult<()> {
    rule.date_range.validate()?;
    validate_adjustment(rule.strategy, rule.base_adjustment)?;

    if let Some(multiplier) = rule.weekend_multiplier {
        if multiplier <= Decimal::ZERO || multiplier > MAX_MULTIPLIER {
            return Err(BookingRulesError::ValidationError(format!(
                "weekend_multiplier must be positive and at most {}",
                MAX_MULTIPLIER
            )));
        }
    }

    for tier in &rule.long_stay_discount {
        if tier.nights == 0 {
            return Err(BookingRulesError::ValidationError(
                "long_stay_discount nights must be at least 1".to_string(),
            ));
        }
        validate_percent("long_stay_discount", tier.discount_percent)?;
    }

    if let Some(ref early_bird) = rule.early_bird {
        validate_percent("early_bird", early_bird.discount_percent)?;
    }

    Ok(())
}

fn validate_blackout(rule: &BlackoutRule) -> BRResult<()> {
    rule.date_range.validate()?;

    if let (Some(min), Some(max)) = (rule.minimum_stay, rule.maximum_stay) {
        if max < min {
            return Err(BookingRulesError::ValidationError(format!(
                "maximum_stay ({}) is less than minimum_stay ({})",
                max, min
            )));
        }
    }

    if let Some(ref adjustment) = rule.price_adjustment {
        validate_adjustment(adjustment.strategy, adjustment.value)?;
    }

    Ok(())
}

/// Validate a signed adjustment value against its strategy
fn validate_adjustment(strategy: AdjustmentStrategy, value: Decimal) -> BRResult<()> {
    match strategy {
        AdjustmentStrategy::Percentage => {
            if value < Decimal::from(-100) {
                return Err(BookingRulesError::ValidationError(
                    "Percentage adjustment cannot reduce the rate by more than 100%".to_string(),
                ));
            }
            if value > MAX_PERCENT_SURCHARGE {
                return Err(BookingRulesError::ValidationError(format!(
                    "Percentage adjustment cannot exceed {}%",
                    MAX_PERCENT_SURCHARGE
                )));
            }
        }
        AdjustmentStrategy::Multiplier => {
            if value <= Decimal::ZERO || value > MAX_MULTIPLIER {
                return Err(BookingRulesError::ValidationError(format!(
                    "Multiplier adjustment must be positive and at most {}",
                    MAX_MULTIPLIER
                )));
            }
        }
        AdjustmentStrategy::FixedAmount => {
            // Signed amounts are allowed; the quote total is floored at zero
            if value.abs() > MAX_NIGHTLY_RATE {
                return Err(BookingRulesError::ValidationError(format!(
                    "Fixed adjustment cannot exceed {} either way",
                    MAX_NIGHTLY_RATE
                )));
            }
        }
    }
    Ok(())
}

fn validate_percent(field: &str, value: Decimal) -> BRResult<()> {
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err(BookingRulesError::ValidationError(format!(
            "{} discount_percent must be between 0 and 100",
            field
        )));
    }
    Ok(())
}
