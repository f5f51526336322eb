// Price Calculator
//
// Prices a stay night by night from the base nightly rate:
// holiday multiplier, then the winning seasonal adjustment, then any blackout
// surcharge, then the seasonal weekend multiplier. Stay-level discounts
// (long stay, early bird) come off the subtotal afterwards.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::booking_rules::{
    availability::AvailabilityIndex,
    date_range::{is_weekend_night, DateRange},
    error::{BRResult, BookingRulesError},
    rule_store::{RuleSnapshot, SeasonalPricingRule},
    types::AdjustmentStrategy,
};

/// Where a price adjustment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Holiday,
    Seasonal,
    Blackout,
    Weekend,
    LongStay,
    EarlyBird,
}

/// One rule's effect on the price
///
/// `amount` is signed: surcharges are positive, discounts negative.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuoteAdjustment {
    pub kind: AdjustmentKind,
    pub rule_id: String,
    /// Night the adjustment applies to; `None` for stay-level discounts
    #[schema(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
    pub description: String,
    #[schema(value_type = f64)]
    pub amount: Decimal,
}

/// Price of a single night before stay-level discounts
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NightlyRate {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    #[schema(value_type = f64)]
    pub rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holiday: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<QuoteAdjustment>,
}

/// Quoted price for a stay
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    pub room_id: String,
    pub date_range: DateRange,
    pub nights: u32,
    pub nightly_rates: Vec<NightlyRate>,
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
    pub adjustments: Vec<QuoteAdjustment>,
    #[schema(value_type = f64)]
    pub discount_total: Decimal,
    #[schema(value_type = f64)]
    pub total: Decimal,
}

/// Round to the smallest currency unit, half away from zero
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Unwrap a checked `Decimal` operation, failing instead of overflowing
fn in_range(value: Option<Decimal>) -> BRResult<Decimal> {
    value.ok_or_else(|| {
        BookingRulesError::ValidationError("Price is outside the supported range".to_string())
    })
}

/// Apply a signed adjustment to a rate according to its strategy
pub fn apply_strategy(rate: Decimal, strategy: AdjustmentStrategy, value: Decimal) -> BRResult<Decimal> {
    match strategy {
        AdjustmentStrategy::Percentage => {
            let change = in_range(rate.checked_mul(value))? / Decimal::ONE_HUNDRED;
            in_range(rate.checked_add(change))
        }
        AdjustmentStrategy::FixedAmount => in_range(rate.checked_add(value)),
        AdjustmentStrategy::Multiplier => in_range(rate.checked_mul(value)),
    }
}

/// Price Calculator
///
/// Stateless over a rule snapshot; the same snapshot and inputs always give
/// the same quote.
pub struct PriceCalculator<'a> {
    rules: &'a RuleSnapshot,
}

impl<'a> PriceCalculator<'a> {
    pub fn new(rules: &'a RuleSnapshot) -> Self {
        Self { rules }
    }

    /// Price one night, unrounded
    pub fn nightly_rate(&self, day: NaiveDate, base_rate: Decimal) -> BRResult<NightlyRate> {
        let mut rate = base_rate;
        let mut adjustments = Vec::new();
        let mut holiday_name = None;

        if let Some(holiday) = self.rules.holiday_for(day) {
            let adjusted = in_range(rate.checked_mul(holiday.price_multiplier))?;
            adjustments.push(QuoteAdjustment {
                kind: AdjustmentKind::Holiday,
                rule_id: holiday.id.clone(),
                date: Some(day),
                description: format!("{} x{}", holiday.name_en, holiday.price_multiplier),
                amount: in_range(adjusted.checked_sub(rate))?,
            });
            rate = adjusted;
            holiday_name = Some(holiday.name_en.clone());
        }

        let seasonal = self.rules.winning_seasonal_rule(day)?;
        if let Some(rule) = seasonal {
            let adjusted = apply_strategy(rate, rule.strategy, rule.base_adjustment)?;
            adjustments.push(QuoteAdjustment {
                kind: AdjustmentKind::Seasonal,
                rule_id: rule.id.clone(),
                date: Some(day),
                description: format!("{} ({} {})", rule.name, rule.strategy, rule.base_adjustment),
                amount: in_range(adjusted.checked_sub(rate))?,
            });
            rate = adjusted;
        }

        if let Some((rule, adjustment)) = self.rules.blackout_adjustment_for(day) {
            let adjusted = apply_strategy(rate, adjustment.strategy, adjustment.value)?;
            adjustments.push(QuoteAdjustment {
                kind: AdjustmentKind::Blackout,
                rule_id: rule.id.clone(),
                date: Some(day),
                description: format!("{} ({} {})", rule.name, adjustment.strategy, adjustment.value),
                amount: in_range(adjusted.checked_sub(rate))?,
            });
            rate = adjusted;
        }

        if let Some(rule) = seasonal {
            if let Some(multiplier) = rule.weekend_multiplier {
                if is_weekend_night(day) {
                    let adjusted = in_range(rate.checked_mul(multiplier))?;
                    adjustments.push(QuoteAdjustment {
                        kind: AdjustmentKind::Weekend,
                        rule_id: rule.id.clone(),
                        date: Some(day),
                        description: format!("Weekend x{}", multiplier),
                        amount: in_range(adjusted.checked_sub(rate))?,
                    });
                    rate = adjusted;
                }
            }
        }

        Ok(NightlyRate {
            date: day,
            rate,
            holiday: holiday_name,
            adjustments,
        })
    }

    /// Quote a stay
    ///
    /// Fails with `UnavailableDate` before any pricing if the stay cannot be
    /// booked. The total is rounded once, after discounts.
    pub fn quote(
        &self,
        availability: &AvailabilityIndex<'_>,
        room_id: &str,
        range: &DateRange,
        base_rate: Decimal,
        booked_on: NaiveDate,
    ) -> BRResult<Quote> {
        range.validate_stay()?;
        if range.nights() == 0 {
            return Err(BookingRulesError::ValidationError(
                "A stay must be at least one night".to_string(),
            ));
        }
        if base_rate < Decimal::ZERO {
            return Err(BookingRulesError::ValidationError(
                "Base nightly rate cannot be negative".to_string(),
            ));
        }

        availability.check_bookable(room_id, range, booked_on)?;

        let nightly_rates = range
            .night_days()
            .map(|day| self.nightly_rate(day, base_rate))
            .collect::<BRResult<Vec<_>>>()?;

        let subtotal = nightly_rates
            .iter()
            .try_fold(Decimal::ZERO, |sum, night| in_range(sum.checked_add(night.rate)))?;
        let mut adjustments: Vec<QuoteAdjustment> = nightly_rates
            .iter()
            .flat_map(|night| night.adjustments.iter().cloned())
            .collect();

        let lead_days = (range.start - booked_on).num_days();
        let discounts = match self.rules.winning_seasonal_rule(range.start)? {
            Some(rule) => stay_discounts(rule, range.nights(), lead_days, subtotal)?,
            None => Vec::new(),
        };
        let discount_total = discounts
            .iter()
            .try_fold(Decimal::ZERO, |sum, d| in_range(sum.checked_sub(d.amount)))?;
        adjustments.extend(discounts);

        let total = round_currency(in_range(subtotal.checked_sub(discount_total))?.max(Decimal::ZERO));

        tracing::debug!(
            room_id,
            range = %range,
            %subtotal,
            %discount_total,
            %total,
            "Quoted stay"
        );

        Ok(Quote {
            room_id: room_id.to_string(),
            date_range: *range,
            nights: range.nights(),
            nightly_rates,
            subtotal: round_currency(subtotal),
            adjustments,
            discount_total: round_currency(discount_total),
            total,
        })
    }
}

/// Long-stay and early-bird discounts of the rule in force on check-in
///
/// Both are percentages of the subtotal and add together.
fn stay_discounts(
    rule: &SeasonalPricingRule,
    nights: u32,
    lead_days: i64,
    subtotal: Decimal,
) -> BRResult<Vec<QuoteAdjustment>> {
    let mut discounts = Vec::new();

    let long_stay = rule
        .long_stay_discount
        .iter()
        .filter(|tier| nights >= tier.nights)
        .max_by_key(|tier| tier.nights);
    if let Some(tier) = long_stay {
        discounts.push(QuoteAdjustment {
            kind: AdjustmentKind::LongStay,
            rule_id: rule.id.clone(),
            date: None,
            description: format!("{}% off for {}+ nights", tier.discount_percent, tier.nights),
            amount: -(in_range(subtotal.checked_mul(tier.discount_percent))? / Decimal::ONE_HUNDRED),
        });
    }

    if let Some(ref early_bird) = rule.early_bird {
        if early_bird.enabled && lead_days >= i64::from(early_bird.days_before_check_in) {
            discounts.push(QuoteAdjustment {
                kind: AdjustmentKind::EarlyBird,
                rule_id: rule.id.clone(),
                date: None,
                description: format!(
                    "{}% early bird, booked {} days ahead",
                    early_bird.discount_percent, lead_days
                ),
                amount: -(in_range(subtotal.checked_mul(early_bird.discount_percent))?
                    / Decimal::ONE_HUNDRED),
            });
        }
    }

    Ok(discounts)
}
