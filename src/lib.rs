pub mod booking_rules;
pub mod bookings;
pub mod config;
pub mod store;
pub mod validation;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use booking_rules::{error::BRResult, handlers as rules, BookingRulesEngine};
use bookings::{handlers as booking_handlers, BookingRepository, BookingService, RoomRepository};
use config::AppConfig;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        booking_handlers::upsert_room_handler,
        booking_handlers::list_rooms_handler,
        booking_handlers::get_room_handler,
        booking_handlers::quote_handler,
        booking_handlers::availability_handler,
        booking_handlers::calendar_handler,
        booking_handlers::create_booking_handler,
        booking_handlers::list_bookings_handler,
        booking_handlers::get_booking_handler,
        booking_handlers::payment_result_handler,
        booking_handlers::cancel_booking_handler,
        booking_handlers::complete_booking_handler,
        rules::list_holidays_handler,
        rules::create_holiday_handler,
        rules::update_holiday_handler,
        rules::delete_holiday_handler,
        rules::list_seasonal_rules_handler,
        rules::create_seasonal_rule_handler,
        rules::update_seasonal_rule_handler,
        rules::delete_seasonal_rule_handler,
        rules::list_blackouts_handler,
        rules::create_blackout_handler,
        rules::update_blackout_handler,
        rules::delete_blackout_handler,
        rules::list_maintenance_handler,
        rules::create_maintenance_handler,
        rules::update_maintenance_handler,
        rules::delete_maintenance_handler,
        rules::rule_conflicts_handler,
        rules::get_member_handler,
        rules::earn_points_handler,
        rules::redeem_points_handler,
        rules::sweep_points_handler,
        rules::enqueue_notification_handler,
        rules::pending_notifications_handler,
        rules::get_notification_handler,
        rules::record_attempt_handler,
        rules::metrics_handler,
    ),
    components(
        schemas(
            bookings::Room,
            bookings::Booking,
            bookings::UpsertRoomRequest,
            bookings::CreateBookingRequest,
            bookings::PaymentResultRequest,
            booking_rules::DateRange,
            booking_rules::BookingStatus,
            booking_rules::DayStatus,
            booking_rules::PaymentStatus,
            booking_rules::AdjustmentStrategy,
            booking_rules::BlackoutType,
            booking_rules::MaintenanceStatus,
            booking_rules::LoyaltyTier,
            booking_rules::TransactionType,
            booking_rules::NotificationChannel,
            booking_rules::NotificationStatus,
            booking_rules::DeliveryOutcome,
            booking_rules::AvailabilityReport,
            booking_rules::CalendarDay,
            booking_rules::DayAvailability,
            booking_rules::Quote,
            booking_rules::QuoteAdjustment,
            booking_rules::pricing::NightlyRate,
            booking_rules::pricing::AdjustmentKind,
            booking_rules::HolidayRule,
            booking_rules::SeasonalPricingRule,
            booking_rules::rule_store::LongStayDiscount,
            booking_rules::rule_store::EarlyBird,
            booking_rules::BlackoutRule,
            booking_rules::rule_store::BlackoutPriceAdjustment,
            booking_rules::MaintenanceSchedule,
            booking_rules::RuleConflict,
            booking_rules::MemberAccount,
            booking_rules::loyalty::PointsBatch,
            booking_rules::PointsTransaction,
            booking_rules::NotificationIntent,
            booking_rules::MetricsSummary,
            booking_rules::metrics::OperationStats,
            rules::HolidayRuleRequest,
            rules::SeasonalRuleRequest,
            rules::BlackoutRuleRequest,
            rules::MaintenanceRequest,
            rules::PointsRequest,
            rules::SweepResponse,
            rules::EnqueueNotificationRequest,
            rules::DeliveryAttemptRequest,
        )
    ),
    tags(
        (name = "rooms", description = "Rooms, quotes, availability and calendars"),
        (name = "bookings", description = "Booking lifecycle and payment callback"),
        (name = "rules", description = "Holiday, seasonal, blackout and maintenance rule administration"),
        (name = "loyalty", description = "Points balance, redemption and expiry"),
        (name = "notifications", description = "Outbound notification intents"),
        (name = "metrics", description = "Operation counters")
    ),
    info(
        title = "Pool Villa Booking API",
        version = "1.0.0",
        description = "Availability, pricing, bookings and loyalty for pool villa rentals"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingRulesEngine>,
    pub booking_service: BookingService,
}

impl AppState {
    fn from_parts(engine: Arc<BookingRulesEngine>, rooms: RoomRepository, bookings: BookingRepository) -> Self {
        Self {
            booking_service: BookingService::new(rooms, bookings, engine.clone()),
            engine,
        }
    }

    /// State with every collection held in memory
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::from_parts(
            Arc::new(BookingRulesEngine::in_memory(config)),
            RoomRepository::in_memory(),
            BookingRepository::in_memory(),
        )
    }

    /// State persisted under `DATA_DIR`, or in memory when it is unset
    pub async fn from_config(config: &AppConfig) -> BRResult<Self> {
        let Some(dir) = config.data_dir.as_deref() else {
            tracing::warn!("DATA_DIR not set; data will not survive a restart");
            return Ok(Self::in_memory(config));
        };

        tracing::info!("Loading collections from {}", dir.display());
        Ok(Self::from_parts(
            Arc::new(BookingRulesEngine::open(dir, config).await?),
            RoomRepository::open(dir).await?,
            BookingRepository::open(dir).await?,
        ))
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds request tracing and CORS middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Rooms
        .route(
            "/api/rooms",
            get(booking_handlers::list_rooms_handler).put(booking_handlers::upsert_room_handler),
        )
        .route("/api/rooms/:room_id", get(booking_handlers::get_room_handler))
        .route("/api/rooms/:room_id/quote", get(booking_handlers::quote_handler))
        .route(
            "/api/rooms/:room_id/availability",
            get(booking_handlers::availability_handler),
        )
        .route("/api/rooms/:room_id/calendar", get(booking_handlers::calendar_handler))
        // Bookings
        .route(
            "/api/bookings",
            post(booking_handlers::create_booking_handler).get(booking_handlers::list_bookings_handler),
        )
        .route("/api/bookings/:booking_id", get(booking_handlers::get_booking_handler))
        .route(
            "/api/bookings/:booking_id/payment",
            post(booking_handlers::payment_result_handler),
        )
        .route(
            "/api/bookings/:booking_id/cancel",
            post(booking_handlers::cancel_booking_handler),
        )
        .route(
            "/api/bookings/:booking_id/complete",
            post(booking_handlers::complete_booking_handler),
        )
        // Rule administration
        .route(
            "/api/rules/holidays",
            get(rules::list_holidays_handler).post(rules::create_holiday_handler),
        )
        .route(
            "/api/rules/holidays/:id",
            put(rules::update_holiday_handler).delete(rules::delete_holiday_handler),
        )
        .route(
            "/api/rules/seasonal",
            get(rules::list_seasonal_rules_handler).post(rules::create_seasonal_rule_handler),
        )
        .route(
            "/api/rules/seasonal/:id",
            put(rules::update_seasonal_rule_handler).delete(rules::delete_seasonal_rule_handler),
        )
        .route(
            "/api/rules/blackouts",
            get(rules::list_blackouts_handler).post(rules::create_blackout_handler),
        )
        .route(
            "/api/rules/blackouts/:id",
            put(rules::update_blackout_handler).delete(rules::delete_blackout_handler),
        )
        .route(
            "/api/rules/maintenance",
            get(rules::list_maintenance_handler).post(rules::create_maintenance_handler),
        )
        .route(
            "/api/rules/maintenance/:id",
            put(rules::update_maintenance_handler).delete(rules::delete_maintenance_handler),
        )
        .route("/api/rules/conflicts", get(rules::rule_conflicts_handler))
        // Loyalty
        .route("/api/loyalty/sweep", post(rules::sweep_points_handler))
        .route("/api/loyalty/:user_id", get(rules::get_member_handler))
        .route("/api/loyalty/:user_id/earn", post(rules::earn_points_handler))
        .route("/api/loyalty/:user_id/redeem", post(rules::redeem_points_handler))
        // Notifications
        .route("/api/notifications", post(rules::enqueue_notification_handler))
        .route(
            "/api/notifications/pending",
            get(rules::pending_notifications_handler),
        )
        .route("/api/notifications/:id", get(rules::get_notification_handler))
        .route(
            "/api/notifications/:id/attempts",
            post(rules::record_attempt_handler),
        )
        // Metrics
        .route("/api/metrics", get(rules::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
