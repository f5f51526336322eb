use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::booking_rules::{
    date_range::DateRange,
    types::{BookingStatus, PaymentStatus},
};
use crate::store::Record;

/// A bookable villa
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[schema(value_type = f64, example = 3000)]
    pub base_nightly_rate: Decimal,
    pub max_guests: u32,
    pub is_active: bool,
}

impl Record for Room {
    fn key(&self) -> String {
        self.id.clone()
    }
}

/// A reservation of one room for a date range
///
/// `total` is the quote taken when the booking was created and is never
/// recomputed when rules change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: String,
    pub room_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub guest_name: String,
    pub guest_email: String,
    pub guests: u32,
    pub date_range: DateRange,
    pub status: BookingStatus,
    #[schema(value_type = f64, example = 7500)]
    pub total: Decimal,
    #[serde(default)]
    pub points_earned: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Booking {
    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Request DTO for creating or replacing a room
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpsertRoomRequest {
    #[validate(length(min = 1, max = 64, message = "Room id must be 1-64 characters"))]
    pub id: String,
    #[validate(length(min = 1, message = "Room name is required"))]
    pub name: String,
    #[schema(value_type = f64, example = 3000)]
    pub base_nightly_rate: Decimal,
    #[validate(range(min = 1, message = "A room must hold at least one guest"))]
    pub max_guests: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Request DTO for creating a booking
///
/// Dates are plain `YYYY-MM-DD` strings so malformed input surfaces as
/// `INVALID_DATE` instead of a generic body rejection.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "room_id is required"))]
    pub room_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Guest name must be 1-200 characters"))]
    pub guest_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub guest_email: String,
    #[validate(range(min = 1, message = "At least one guest is required"))]
    pub guests: u32,
    #[schema(example = "2025-01-01")]
    pub check_in: String,
    #[schema(example = "2025-01-03")]
    pub check_out: String,
}

/// Payment gateway callback body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentResultRequest {
    pub status: PaymentStatus,
    #[schema(value_type = f64, example = 7500)]
    pub amount: Decimal,
}

/// Query parameters for listing bookings
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookingListQuery {
    pub room_id: Option<String>,
    /// Range start (`YYYY-MM-DD`); requires `end`
    pub start: Option<String>,
    /// Range end (`YYYY-MM-DD`); requires `start`
    pub end: Option<String>,
}
