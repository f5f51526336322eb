// HTTP handlers for rule administration, loyalty and notification endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::booking_rules::{
    date_range::DateRange,
    error::{BRResult, BookingRulesError},
    rule_store::{BlackoutPriceAdjustment, EarlyBird, LongStayDiscount},
    types::{
        AdjustmentStrategy, BlackoutType, DeliveryOutcome, MaintenanceStatus, NotificationChannel,
    },
    BlackoutRule, HolidayRule, MaintenanceSchedule, MemberAccount, MetricsSummary,
    NotificationIntent, OperationType, PointsTransaction, RuleConflict, SeasonalPricingRule,
};
use crate::validation::{ensure, validate_points};

/// Request DTO for creating or updating a holiday
#[derive(Debug, Deserialize, ToSchema)]
pub struct HolidayRuleRequest {
    pub date_range: DateRange,
    pub name_local: String,
    pub name_en: String,
    #[schema(value_type = f64, example = 1.5)]
    pub price_multiplier: Decimal,
    #[serde(default)]
    pub min_stay_required: u32,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl HolidayRuleRequest {
    fn into_rule(self, id: String, created_at: DateTime<Utc>) -> HolidayRule {
        HolidayRule {
            id,
            date_range: self.date_range,
            name_local: self.name_local,
            name_en: self.name_en,
            price_multiplier: self.price_multiplier,
            min_stay_required: self.min_stay_required,
            emoji: self.emoji,
            created_at,
        }
    }
}

/// Request DTO for creating or updating a seasonal pricing rule
#[derive(Debug, Deserialize, ToSchema)]
pub struct SeasonalRuleRequest {
    pub name: String,
    pub date_range: DateRange,
    pub strategy: AdjustmentStrategy,
    #[schema(value_type = f64, example = -20)]
    pub base_adjustment: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
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
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl SeasonalRuleRequest {
    fn into_rule(self, id: String, created_at: DateTime<Utc>) -> SeasonalPricingRule {
        SeasonalPricingRule {
            id,
            name: self.name,
            date_range: self.date_range,
            strategy: self.strategy,
            base_adjustment: self.base_adjustment,
            weekend_multiplier: self.weekend_multiplier,
            long_stay_discount: self.long_stay_discount,
            early_bird: self.early_bird,
            minimum_stay: self.minimum_stay,
            advance_booking_days: self.advance_booking_days,
            priority: self.priority,
            is_active: self.is_active,
            created_at,
        }
    }
}

/// Request DTO for creating or updating a blackout
#[derive(Debug, Deserialize, ToSchema)]
pub struct BlackoutRuleRequest {
    pub name: String,
    pub date_range: DateRange,
    #[serde(rename = "type")]
    pub blackout_type: BlackoutType,
    #[serde(default)]
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
}

impl BlackoutRuleRequest {
    fn into_rule(self, id: String, created_at: DateTime<Utc>) -> BlackoutRule {
        BlackoutRule {
            id,
            name: self.name,
            date_range: self.date_range,
            blackout_type: self.blackout_type,
            allow_booking: self.allow_booking,
            minimum_stay: self.minimum_stay,
            maximum_stay: self.maximum_stay,
            advance_booking_days: self.advance_booking_days,
            price_adjustment: self.price_adjustment,
            priority: self.priority,
            created_at,
        }
    }
}

/// Request DTO for creating or updating a maintenance schedule
#[derive(Debug, Deserialize, ToSchema)]
pub struct MaintenanceRequest {
    pub title: String,
    pub date_range: DateRange,
    #[serde(default = "default_true")]
    pub affects_booking: bool,
    #[serde(default)]
    pub partial_closure: bool,
    #[serde(default)]
    pub room_ids: Vec<String>,
    pub status: MaintenanceStatus,
}

impl MaintenanceRequest {
    fn into_rule(self, id: String, created_at: DateTime<Utc>) -> MaintenanceSchedule {
        MaintenanceSchedule {
            id,
            title: self.title,
            date_range: self.date_range,
            affects_booking: self.affects_booking,
            partial_closure: self.partial_closure,
            room_ids: self.room_ids,
            status: self.status,
            created_at,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Request DTO for a points movement
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PointsRequest {
    pub points: i64,
    #[validate(length(min = 1, max = 200, message = "Reason must be 1-200 characters"))]
    pub reason: String,
    #[serde(default)]
    pub booking_id: Option<String>,
}

impl PointsRequest {
    fn check(&self) -> BRResult<()> {
        self.validate()?;
        ensure("points", validate_points(self.points))
    }
}

/// Response DTO for an expiry sweep
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    pub expired_transactions: usize,
}

/// Request DTO for queuing a notification
#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueNotificationRequest {
    pub channel: NotificationChannel,
    pub payload_ref: String,
}

/// Request DTO for reporting a delivery attempt
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliveryAttemptRequest {
    pub outcome: DeliveryOutcome,
}

// ============================================================================
// Rule administration
// ============================================================================

/// Handler for GET /api/rules/holidays
#[utoipa::path(
    get,
    path = "/api/rules/holidays",
    responses((status = 200, description = "All holidays", body = Vec<HolidayRule>)),
    tag = "rules"
)]
pub async fn list_holidays_handler(State(state): State<crate::AppState>) -> Json<Vec<HolidayRule>> {
    Json(state.engine.rules().list_holidays().await)
}

/// Handler for POST /api/rules/holidays
#[utoipa::path(
    post,
    path = "/api/rules/holidays",
    request_body = HolidayRuleRequest,
    responses(
        (status = 201, description = "Holiday created", body = HolidayRule),
        (status = 400, description = "Invalid holiday")
    ),
    tag = "rules"
)]
pub async fn create_holiday_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<HolidayRuleRequest>,
) -> Result<(StatusCode, Json<HolidayRule>), BookingRulesError> {
    let rule = request.into_rule(Uuid::new_v4().to_string(), Utc::now());
    let rule = state.engine.rules().save_holiday(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Handler for PUT /api/rules/holidays/:id
#[utoipa::path(
    put,
    path = "/api/rules/holidays/{id}",
    params(("id" = String, Path, description = "Holiday identifier")),
    request_body = HolidayRuleRequest,
    responses(
        (status = 200, description = "Holiday updated", body = HolidayRule),
        (status = 404, description = "Holiday not found")
    ),
    tag = "rules"
)]
pub async fn update_holiday_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
    Json(request): Json<HolidayRuleRequest>,
) -> Result<Json<HolidayRule>, BookingRulesError> {
    let rules = state.engine.rules();
    let existing = rules
        .list_holidays()
        .await
        .into_iter()
        .find(|rule| rule.id == id)
        .ok_or_else(|| BookingRulesError::not_found("Holiday", id.as_str()))?;

    let rule = rules
        .save_holiday(request.into_rule(existing.id, existing.created_at))
        .await?;
    Ok(Json(rule))
}

/// Handler for DELETE /api/rules/holidays/:id
#[utoipa::path(
    delete,
    path = "/api/rules/holidays/{id}",
    params(("id" = String, Path, description = "Holiday identifier")),
    responses(
        (status = 204, description = "Holiday deleted"),
        (status = 404, description = "Holiday not found")
    ),
    tag = "rules"
)]
pub async fn delete_holiday_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BookingRulesError> {
    state.engine.rules().delete_holiday(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/rules/seasonal
#[utoipa::path(
    get,
    path = "/api/rules/seasonal",
    responses((status = 200, description = "All seasonal pricing rules", body = Vec<SeasonalPricingRule>)),
    tag = "rules"
)]
pub async fn list_seasonal_rules_handler(
    State(state): State<crate::AppState>,
) -> Json<Vec<SeasonalPricingRule>> {
    Json(state.engine.rules().list_seasonal_rules().await)
}

/// Handler for POST /api/rules/seasonal
#[utoipa::path(
    post,
    path = "/api/rules/seasonal",
    request_body = SeasonalRuleRequest,
    responses(
        (status = 201, description = "Seasonal rule created", body = SeasonalPricingRule),
        (status = 400, description = "Invalid seasonal rule")
    ),
    tag = "rules"
)]
pub async fn create_seasonal_rule_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<SeasonalRuleRequest>,
) -> Result<(StatusCode, Json<SeasonalPricingRule>), BookingRulesError> {
    let rule = request.into_rule(Uuid::new_v4().to_string(), Utc::now());
    let rule = state.engine.rules().save_seasonal_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Handler for PUT /api/rules/seasonal/:id
#[utoipa::path(
    put,
    path = "/api/rules/seasonal/{id}",
    params(("id" = String, Path, description = "Seasonal rule identifier")),
    request_body = SeasonalRuleRequest,
    responses(
        (status = 200, description = "Seasonal rule updated", body = SeasonalPricingRule),
        (status = 404, description = "Seasonal rule not found")
    ),
    tag = "rules"
)]
pub async fn update_seasonal_rule_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
    Json(request): Json<SeasonalRuleRequest>,
) -> Result<Json<SeasonalPricingRule>, BookingRulesError> {
    let rules = state.engine.rules();
    let existing = rules
        .list_seasonal_rules()
        .await
        .into_iter()
        .find(|rule| rule.id == id)
        .ok_or_else(|| BookingRulesError::not_found("Seasonal rule", id.as_str()))?;

    let rule = rules
        .save_seasonal_rule(request.into_rule(existing.id, existing.created_at))
        .await?;
    Ok(Json(rule))
}

/// Handler for DELETE /api/rules/seasonal/:id
#[utoipa::path(
    delete,
    path = "/api/rules/seasonal/{id}",
    params(("id" = String, Path, description = "Seasonal rule identifier")),
    responses(
        (status = 204, description = "Seasonal rule deleted"),
        (status = 404, description = "Seasonal rule not found")
    ),
    tag = "rules"
)]
pub async fn delete_seasonal_rule_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BookingRulesError> {
    state.engine.rules().delete_seasonal_rule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/rules/blackouts
#[utoipa::path(
    get,
    path = "/api/rules/blackouts",
    responses((status = 200, description = "All blackouts", body = Vec<BlackoutRule>)),
    tag = "rules"
)]
pub async fn list_blackouts_handler(State(state): State<crate::AppState>) -> Json<Vec<BlackoutRule>> {
    Json(state.engine.rules().list_blackouts().await)
}

/// Handler for POST /api/rules/blackouts
#[utoipa::path(
    post,
    path = "/api/rules/blackouts",
    request_body = BlackoutRuleRequest,
    responses(
        (status = 201, description = "Blackout created", body = BlackoutRule),
        (status = 400, description = "Invalid blackout")
    ),
    tag = "rules"
)]
pub async fn create_blackout_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<BlackoutRuleRequest>,
) -> Result<(StatusCode, Json<BlackoutRule>), BookingRulesError> {
    let rule = request.into_rule(Uuid::new_v4().to_string(), Utc::now());
    let rule = state.engine.rules().save_blackout(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Handler for PUT /api/rules/blackouts/:id
#[utoipa::path(
    put,
    path = "/api/rules/blackouts/{id}",
    params(("id" = String, Path, description = "Blackout identifier")),
    request_body = BlackoutRuleRequest,
    responses(
        (status = 200, description = "Blackout updated", body = BlackoutRule),
        (status = 404, description = "Blackout not found")
    ),
    tag = "rules"
)]
pub async fn update_blackout_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
    Json(request): Json<BlackoutRuleRequest>,
) -> Result<Json<BlackoutRule>, BookingRulesError> {
    let rules = state.engine.rules();
    let existing = rules
        .list_blackouts()
        .await
        .into_iter()
        .find(|rule| rule.id == id)
        .ok_or_else(|| BookingRulesError::not_found("Blackout", id.as_str()))?;

    let rule = rules
        .save_blackout(request.into_rule(existing.id, existing.created_at))
        .await?;
    Ok(Json(rule))
}

/// Handler for DELETE /api/rules/blackouts/:id
#[utoipa::path(
    delete,
    path = "/api/rules/blackouts/{id}",
    params(("id" = String, Path, description = "Blackout identifier")),
    responses(
        (status = 204, description = "Blackout deleted"),
        (status = 404, description = "Blackout not found")
    ),
    tag = "rules"
)]
pub async fn delete_blackout_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BookingRulesError> {
    state.engine.rules().delete_blackout(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/rules/maintenance
#[utoipa::path(
    get,
    path = "/api/rules/maintenance",
    responses((status = 200, description = "All maintenance schedules", body = Vec<MaintenanceSchedule>)),
    tag = "rules"
)]
pub async fn list_maintenance_handler(
    State(state): State<crate::AppState>,
) -> Json<Vec<MaintenanceSchedule>> {
    Json(state.engine.rules().list_maintenance().await)
}

/// Handler for POST /api/rules/maintenance
#[utoipa::path(
    post,
    path = "/api/rules/maintenance",
    request_body = MaintenanceRequest,
    responses(
        (status = 201, description = "Maintenance scheduled", body = MaintenanceSchedule),
        (status = 400, description = "Invalid schedule")
    ),
    tag = "rules"
)]
pub async fn create_maintenance_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<(StatusCode, Json<MaintenanceSchedule>), BookingRulesError> {
    let schedule = request.into_rule(Uuid::new_v4().to_string(), Utc::now());
    let schedule = state.engine.rules().save_maintenance(schedule).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Handler for PUT /api/rules/maintenance/:id
#[utoipa::path(
    put,
    path = "/api/rules/maintenance/{id}",
    params(("id" = String, Path, description = "Maintenance identifier")),
    request_body = MaintenanceRequest,
    responses(
        (status = 200, description = "Maintenance updated", body = MaintenanceSchedule),
        (status = 404, description = "Maintenance not found")
    ),
    tag = "rules"
)]
pub async fn update_maintenance_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<MaintenanceSchedule>, BookingRulesError> {
    let rules = state.engine.rules();
    let existing = rules
        .list_maintenance()
        .await
        .into_iter()
        .find(|schedule| schedule.id == id)
        .ok_or_else(|| BookingRulesError::not_found("Maintenance", id.as_str()))?;

    let schedule = rules
        .save_maintenance(request.into_rule(existing.id, existing.created_at))
        .await?;
    Ok(Json(schedule))
}

/// Handler for DELETE /api/rules/maintenance/:id
#[utoipa::path(
    delete,
    path = "/api/rules/maintenance/{id}",
    params(("id" = String, Path, description = "Maintenance identifier")),
    responses(
        (status = 204, description = "Maintenance deleted"),
        (status = 404, description = "Maintenance not found")
    ),
    tag = "rules"
)]
pub async fn delete_maintenance_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BookingRulesError> {
    state.engine.rules().delete_maintenance(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/rules/conflicts
/// Lists rule pairs that cannot be ordered deterministically
#[utoipa::path(
    get,
    path = "/api/rules/conflicts",
    responses((status = 200, description = "Conflicting rule pairs", body = Vec<RuleConflict>)),
    tag = "rules"
)]
pub async fn rule_conflicts_handler(State(state): State<crate::AppState>) -> Json<Vec<RuleConflict>> {
    Json(state.engine.detect_conflicts().await)
}

// ============================================================================
// Loyalty
// ============================================================================

/// Handler for GET /api/loyalty/:user_id
#[utoipa::path(
    get,
    path = "/api/loyalty/{user_id}",
    params(("user_id" = String, Path, description = "Member identifier")),
    responses((status = 200, description = "Balance, tier and history", body = MemberAccount)),
    tag = "loyalty"
)]
pub async fn get_member_handler(
    State(state): State<crate::AppState>,
    Path(user_id): Path<String>,
) -> Json<MemberAccount> {
    let _timer = state.engine.metrics().start(OperationType::Loyalty);
    Json(state.engine.loyalty().member(&user_id, Utc::now()).await)
}

/// Handler for POST /api/loyalty/:user_id/earn
/// Credits points outside a booking (goodwill, corrections)
#[utoipa::path(
    post,
    path = "/api/loyalty/{user_id}/earn",
    params(("user_id" = String, Path, description = "Member identifier")),
    request_body = PointsRequest,
    responses(
        (status = 201, description = "Points credited", body = PointsTransaction),
        (status = 400, description = "Invalid points amount")
    ),
    tag = "loyalty"
)]
pub async fn earn_points_handler(
    State(state): State<crate::AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PointsRequest>,
) -> Result<(StatusCode, Json<PointsTransaction>), BookingRulesError> {
    request.check()?;

    let _timer = state.engine.metrics().start(OperationType::Loyalty);
    let transaction = state
        .engine
        .loyalty()
        .record_earn(
            &user_id,
            request.points,
            &request.reason,
            request.booking_id.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Handler for POST /api/loyalty/:user_id/redeem
#[utoipa::path(
    post,
    path = "/api/loyalty/{user_id}/redeem",
    params(("user_id" = String, Path, description = "Member identifier")),
    request_body = PointsRequest,
    responses(
        (status = 201, description = "Points redeemed", body = PointsTransaction),
        (status = 400, description = "Invalid points amount"),
        (status = 409, description = "Insufficient points")
    ),
    tag = "loyalty"
)]
pub async fn redeem_points_handler(
    State(state): State<crate::AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PointsRequest>,
) -> Result<(StatusCode, Json<PointsTransaction>), BookingRulesError> {
    request.check()?;

    let _timer = state.engine.metrics().start(OperationType::Loyalty);
    let transaction = state
        .engine
        .loyalty()
        .redeem(&user_id, request.points, &request.reason, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Handler for POST /api/loyalty/sweep
/// Expires overdue points for every member
#[utoipa::path(
    post,
    path = "/api/loyalty/sweep",
    responses((status = 200, description = "Expiry sweep finished", body = SweepResponse)),
    tag = "loyalty"
)]
pub async fn sweep_points_handler(
    State(state): State<crate::AppState>,
) -> Result<Json<SweepResponse>, BookingRulesError> {
    let _timer = state.engine.metrics().start(OperationType::Loyalty);
    let expired_transactions = state.engine.loyalty().sweep_all(Utc::now()).await?;
    Ok(Json(SweepResponse { expired_transactions }))
}

// ============================================================================
// Notifications
// ============================================================================

/// Handler for POST /api/notifications
#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = EnqueueNotificationRequest,
    responses(
        (status = 201, description = "Intent queued", body = NotificationIntent),
        (status = 400, description = "Empty payload reference")
    ),
    tag = "notifications"
)]
pub async fn enqueue_notification_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<EnqueueNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationIntent>), BookingRulesError> {
    let intent = state
        .engine
        .notifications()
        .enqueue(request.channel, &request.payload_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// Handler for GET /api/notifications/pending
/// Intents awaiting delivery, oldest first
#[utoipa::path(
    get,
    path = "/api/notifications/pending",
    responses((status = 200, description = "Queued and retrying intents", body = Vec<NotificationIntent>)),
    tag = "notifications"
)]
pub async fn pending_notifications_handler(
    State(state): State<crate::AppState>,
) -> Json<Vec<NotificationIntent>> {
    Json(state.engine.notifications().pending().await)
}

/// Handler for GET /api/notifications/:id
#[utoipa::path(
    get,
    path = "/api/notifications/{id}",
    params(("id" = String, Path, description = "Intent identifier")),
    responses(
        (status = 200, description = "Intent found", body = NotificationIntent),
        (status = 404, description = "Intent not found")
    ),
    tag = "notifications"
)]
pub async fn get_notification_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<Json<NotificationIntent>, BookingRulesError> {
    let intent = state.engine.notifications().get(&id).await?;
    Ok(Json(intent))
}

/// Handler for POST /api/notifications/:id/attempts
/// Delivery provider reports the outcome of one attempt
#[utoipa::path(
    post,
    path = "/api/notifications/{id}/attempts",
    params(("id" = String, Path, description = "Intent identifier")),
    request_body = DeliveryAttemptRequest,
    responses(
        (status = 200, description = "Attempt recorded", body = NotificationIntent),
        (status = 404, description = "Intent not found"),
        (status = 409, description = "Intent already sent or failed")
    ),
    tag = "notifications"
)]
pub async fn record_attempt_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
    Json(request): Json<DeliveryAttemptRequest>,
) -> Result<Json<NotificationIntent>, BookingRulesError> {
    let _timer = state.engine.metrics().start(OperationType::Notification);
    let intent = state
        .engine
        .notifications()
        .mark_attempt(&id, request.outcome)
        .await?;
    Ok(Json(intent))
}

/// Handler for GET /api/metrics
#[utoipa::path(
    get,
    path = "/api/metrics",
    responses((status = 200, description = "Operation counters and timings", body = MetricsSummary)),
    tag = "metrics"
)]
pub async fn metrics_handler(State(state): State<crate::AppState>) -> Json<MetricsSummary> {
    Json(state.engine.metrics().summary())
}
