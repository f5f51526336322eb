// HTTP handlers for room, quote and booking endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::booking_rules::{
    date_range::DateRange, error::BookingRulesError, AvailabilityReport, CalendarDay, Quote,
};
use crate::bookings::models::{
    Booking, BookingListQuery, CreateBookingRequest, PaymentResultRequest, Room, UpsertRoomRequest,
};

/// Query parameters naming a stay
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StayQuery {
    /// Check-in date (`YYYY-MM-DD`)
    pub check_in: String,
    /// Check-out date (`YYYY-MM-DD`)
    pub check_out: String,
}

impl StayQuery {
    fn range(&self) -> Result<DateRange, BookingRulesError> {
        DateRange::parse(&self.check_in, &self.check_out)
    }
}

/// Query parameters selecting a calendar month
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CalendarQuery {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

/// Handler for PUT /api/rooms
/// Creates or replaces a room
#[utoipa::path(
    put,
    path = "/api/rooms",
    request_body = UpsertRoomRequest,
    responses(
        (status = 200, description = "Room saved", body = Room),
        (status = 400, description = "Invalid room data")
    ),
    tag = "rooms"
)]
pub async fn upsert_room_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<UpsertRoomRequest>,
) -> Result<Json<Room>, BookingRulesError> {
    let room = state.booking_service.upsert_room(request).await?;
    Ok(Json(room))
}

/// Handler for GET /api/rooms
#[utoipa::path(
    get,
    path = "/api/rooms",
    responses((status = 200, description = "All rooms", body = Vec<Room>)),
    tag = "rooms"
)]
pub async fn list_rooms_handler(State(state): State<crate::AppState>) -> Json<Vec<Room>> {
    Json(state.booking_service.list_rooms().await)
}

/// Handler for GET /api/rooms/:room_id
#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room found", body = Room),
        (status = 404, description = "Room not found")
    ),
    tag = "rooms"
)]
pub async fn get_room_handler(
    State(state): State<crate::AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, BookingRulesError> {
    let room = state.booking_service.get_room(&room_id).await?;
    Ok(Json(room))
}

/// Handler for GET /api/rooms/:room_id/quote
/// Prices a stay without booking it
#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/quote",
    params(("room_id" = String, Path, description = "Room identifier"), StayQuery),
    responses(
        (status = 200, description = "Itemised quote", body = Quote),
        (status = 400, description = "Malformed dates or range"),
        (status = 404, description = "Room not found"),
        (status = 409, description = "A day in the stay is unavailable")
    ),
    tag = "rooms"
)]
pub async fn quote_handler(
    State(state): State<crate::AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<StayQuery>,
) -> Result<Json<Quote>, BookingRulesError> {
    let range = query.range()?;
    let quote = state
        .booking_service
        .quote(&room_id, &range, Utc::now().date_naive())
        .await?;
    Ok(Json(quote))
}

/// Handler for GET /api/rooms/:room_id/availability
#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/availability",
    params(("room_id" = String, Path, description = "Room identifier"), StayQuery),
    responses(
        (status = 200, description = "Bookability and per-day status", body = AvailabilityReport),
        (status = 400, description = "Malformed dates or range"),
        (status = 404, description = "Room not found")
    ),
    tag = "rooms"
)]
pub async fn availability_handler(
    State(state): State<crate::AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<StayQuery>,
) -> Result<Json<AvailabilityReport>, BookingRulesError> {
    let range = query.range()?;
    let report = state
        .booking_service
        .availability(&room_id, &range, Utc::now().date_naive())
        .await?;
    Ok(Json(report))
}

/// Handler for GET /api/rooms/:room_id/calendar
#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/calendar",
    params(("room_id" = String, Path, description = "Room identifier"), CalendarQuery),
    responses(
        (status = 200, description = "One entry per day of the month", body = Vec<CalendarDay>),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "Room not found")
    ),
    tag = "rooms"
)]
pub async fn calendar_handler(
    State(state): State<crate::AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<CalendarDay>>, BookingRulesError> {
    let days = state
        .booking_service
        .calendar(&room_id, query.year, query.month)
        .await?;
    Ok(Json(days))
}

/// Handler for POST /api/bookings
/// Creates a pending booking at the quoted total
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Room not found"),
        (status = 409, description = "A day in the stay is unavailable")
    ),
    tag = "bookings"
)]
pub async fn create_booking_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), BookingRulesError> {
    let booking = state
        .booking_service
        .create_booking(request, Utc::now().date_naive())
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Handler for GET /api/bookings
#[utoipa::path(
    get,
    path = "/api/bookings",
    params(BookingListQuery),
    responses(
        (status = 200, description = "Bookings ordered by check-in", body = Vec<Booking>),
        (status = 400, description = "Invalid range filter")
    ),
    tag = "bookings"
)]
pub async fn list_bookings_handler(
    State(state): State<crate::AppState>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<Booking>>, BookingRulesError> {
    let bookings = state.booking_service.list_bookings(query).await?;
    Ok(Json(bookings))
}

/// Handler for GET /api/bookings/:booking_id
#[utoipa::path(
    get,
    path = "/api/bookings/{booking_id}",
    params(("booking_id" = String, Path, description = "Booking identifier")),
    responses(
        (status = 200, description = "Booking found", body = Booking),
        (status = 404, description = "Booking not found")
    ),
    tag = "bookings"
)]
pub async fn get_booking_handler(
    State(state): State<crate::AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, BookingRulesError> {
    let booking = state.booking_service.get_booking(&booking_id).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/:booking_id/payment
/// Payment gateway callback
#[utoipa::path(
    post,
    path = "/api/bookings/{booking_id}/payment",
    params(("booking_id" = String, Path, description = "Booking identifier")),
    request_body = PaymentResultRequest,
    responses(
        (status = 200, description = "Booking after the payment result", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking can no longer be confirmed")
    ),
    tag = "bookings"
)]
pub async fn payment_result_handler(
    State(state): State<crate::AppState>,
    Path(booking_id): Path<String>,
    Json(request): Json<PaymentResultRequest>,
) -> Result<Json<Booking>, BookingRulesError> {
    let booking = state
        .booking_service
        .apply_payment_result(&booking_id, request)
        .await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/:booking_id/cancel
#[utoipa::path(
    post,
    path = "/api/bookings/{booking_id}/cancel",
    params(("booking_id" = String, Path, description = "Booking identifier")),
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking is already completed")
    ),
    tag = "bookings"
)]
pub async fn cancel_booking_handler(
    State(state): State<crate::AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, BookingRulesError> {
    let booking = state.booking_service.cancel_booking(&booking_id).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/:booking_id/complete
#[utoipa::path(
    post,
    path = "/api/bookings/{booking_id}/complete",
    params(("booking_id" = String, Path, description = "Booking identifier")),
    responses(
        (status = 200, description = "Booking completed", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Only confirmed bookings can complete")
    ),
    tag = "bookings"
)]
pub async fn complete_booking_handler(
    State(state): State<crate::AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, BookingRulesError> {
    let booking = state.booking_service.complete_booking(&booking_id).await?;
    Ok(Json(booking))
}
