// Error types for the booking rules core
// Covers date parsing, availability, pricing, loyalty and notification failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::store::StoreError;

/// Main error type for the booking rules core
///
/// Every variant is recoverable at the calling layer: the request that
/// triggered it is rejected and nothing is written.
#[derive(Debug, Error)]
pub enum BookingRulesError {
    /// A date string could not be parsed as `YYYY-MM-DD`
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A date range whose start is after its end
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// A quote or booking touched a day that cannot be booked
    #[error("Room {room_id} is unavailable on {date}: {reason}")]
    UnavailableDate {
        room_id: String,
        date: NaiveDate,
        reason: String,
    },

    /// A redemption exceeded the member's current balance
    #[error("Insufficient points for user {user_id}: requested {requested}, available {available}")]
    InsufficientPoints {
        user_id: String,
        requested: i64,
        available: i64,
    },

    /// Two rules of the same kind cannot be ordered deterministically
    #[error("Rule conflict between {first} and {second}: {reason}")]
    RuleConflict {
        first: String,
        second: String,
        reason: String,
    },

    /// Request or rule input failed validation
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Configuration values are missing or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A booking or notification status change that the lifecycle forbids
    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(String),

    /// A referenced record does not exist
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The backing store failed to read or persist a collection
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Result type alias for booking rules operations
pub type BRResult<T> = Result<T, BookingRulesError>;

impl BookingRulesError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        BookingRulesError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Machine-readable error code used in API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            BookingRulesError::InvalidDate(_) => "INVALID_DATE",
            BookingRulesError::InvalidRange { .. } => "INVALID_RANGE",
            BookingRulesError::UnavailableDate { .. } => "UNAVAILABLE_DATE",
            BookingRulesError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            BookingRulesError::RuleConflict { .. } => "RULE_CONFLICT",
            BookingRulesError::ValidationError(_) => "VALIDATION_ERROR",
            BookingRulesError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            BookingRulesError::InvalidStatusTransition(_) => "INVALID_STATUS_TRANSITION",
            BookingRulesError::NotFound { .. } => "NOT_FOUND",
            BookingRulesError::StoreError(_) => "STORE_ERROR",
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingRulesError::InvalidDate(_)
            | BookingRulesError::InvalidRange { .. }
            | BookingRulesError::ValidationError(_) => StatusCode::BAD_REQUEST,
            BookingRulesError::UnavailableDate { .. }
            | BookingRulesError::InsufficientPoints { .. }
            | BookingRulesError::RuleConflict { .. }
            | BookingRulesError::InvalidStatusTransition(_) => StatusCode::CONFLICT,
            BookingRulesError::NotFound { .. } => StatusCode::NOT_FOUND,
            BookingRulesError::StoreError(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            BookingRulesError::InvalidConfiguration(_) | BookingRulesError::StoreError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for BookingRulesError {
    fn from(err: validator::ValidationErrors) -> Self {
        BookingRulesError::ValidationError(err.to_string())
    }
}

/// Consistent error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl IntoResponse for BookingRulesError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage and configuration details stay in the logs
        let message = if status.is_server_error() {
            error!("Internal error: {}", self);
            "An internal server error occurred".to_string()
        } else if status == StatusCode::CONFLICT {
            warn!("Request rejected: {}", self);
            self.to_string()
        } else {
            debug!("Client error: {}", self);
            self.to_string()
        };

        let details = match &self {
            BookingRulesError::UnavailableDate { room_id, date, .. } => Some(serde_json::json!({
                "room_id": room_id,
                "date": date,
            })),
            BookingRulesError::InsufficientPoints {
                requested,
                available,
                ..
            } => Some(serde_json::json!({
                "requested": requested,
                "available": available,
            })),
            _ => None,
        };

        let body = ErrorResponse {
            error_code: self.error_code().to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
