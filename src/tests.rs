// Handler tests for the Pool Villa Booking API
// Runs the full router against in-memory state

use super::*;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::booking_rules::{BookingStatus, LoyaltyTier, MemberAccount, NotificationIntent};
use crate::bookings::Booking;

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper function to create a test server with an empty in-memory state
fn create_test_app() -> TestServer {
    let state = AppState::in_memory(&AppConfig::default());
    TestServer::new(create_router(state)).unwrap()
}

/// January 1st two years out, so stays are never in the past
fn future_new_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(Utc::now().year() + 2, 1, 1).unwrap()
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn stay(offset: i64, nights: i64) -> (String, String) {
    let start = future_new_year() + chrono::Duration::days(offset);
    (date_str(start), date_str(start + chrono::Duration::days(nights)))
}

/// Read a decimal field; amounts serialize as strings
fn decimal(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

async fn create_room(server: &TestServer) {
    let response = server
        .put("/api/rooms")
        .json(&json!({
            "id": "villa-1",
            "name": "Sunset Pool Villa",
            "base_nightly_rate": "3000",
            "max_guests": 4
        }))
        .await;
    response.assert_status_ok();
}

fn booking_payload(check_in: &str, check_out: &str) -> serde_json::Value {
    json!({
        "room_id": "villa-1",
        "user_id": "u1",
        "guest_name": "Somchai",
        "guest_email": "somchai@example.com",
        "guests": 2,
        "check_in": check_in,
        "check_out": check_out
    })
}

async fn quote_total(server: &TestServer, check_in: &str, check_out: &str) -> serde_json::Value {
    let response = server
        .get("/api/rooms/villa-1/quote")
        .add_query_param("check_in", check_in)
        .add_query_param("check_out", check_out)
        .await;
    response.assert_status_ok();
    response.json()
}

async fn earn(server: &TestServer, user_id: &str, points: i64) {
    let response = server
        .post(&format!("/api/loyalty/{}/earn", user_id))
        .json(&json!({ "points": points, "reason": "Welcome bonus" }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

// ============================================================================
// Quote Tests (GET /api/rooms/:room_id/quote)
// ============================================================================

/// Two nights at the base rate with no rules active
#[tokio::test]
async fn test_quote_base_rate_only() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(0, 2);
    let body = quote_total(&server, &check_in, &check_out).await;

    assert_eq!(body["nights"], 2);
    assert_eq!(decimal(&body["subtotal"]), dec!(6000));
    assert_eq!(decimal(&body["total"]), dec!(6000));
}

/// A holiday multiplier raises only the night it covers
#[tokio::test]
async fn test_quote_with_holiday() {
    let server = create_test_app();
    create_room(&server).await;

    let new_year = date_str(future_new_year());
    let response = server
        .post("/api/rules/holidays")
        .json(&json!({
            "date_range": { "start": new_year, "end": new_year },
            "name_local": "วันขึ้นปีใหม่",
            "name_en": "New Year's Day",
            "price_multiplier": "1.5"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let (check_in, check_out) = stay(0, 2);
    let body = quote_total(&server, &check_in, &check_out).await;

    assert_eq!(decimal(&body["nightly_rates"][0]["rate"]), dec!(4500));
    assert_eq!(decimal(&body["nightly_rates"][1]["rate"]), dec!(3000));
    assert_eq!(decimal(&body["total"]), dec!(7500));
}

/// A seasonal reduction applies after the holiday multiplier
#[tokio::test]
async fn test_quote_holiday_then_seasonal() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(0, 2);
    server
        .post("/api/rules/holidays")
        .json(&json!({
            "date_range": { "start": check_in, "end": check_in },
            "name_local": "วันขึ้นปีใหม่",
            "name_en": "New Year's Day",
            "price_multiplier": "1.5"
        }))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/api/rules/seasonal")
        .json(&json!({
            "name": "Green season",
            "date_range": { "start": check_in, "end": check_out },
            "strategy": "percentage",
            "base_adjustment": "-20"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let body = quote_total(&server, &check_in, &check_out).await;

    assert_eq!(decimal(&body["nightly_rates"][0]["rate"]), dec!(3600));
    assert_eq!(decimal(&body["nightly_rates"][1]["rate"]), dec!(2400));
    assert_eq!(decimal(&body["total"]), dec!(6000));
}

/// Malformed dates are rejected with INVALID_DATE
#[tokio::test]
async fn test_quote_malformed_date() {
    let server = create_test_app();
    create_room(&server).await;

    let response = server
        .get("/api/rooms/villa-1/quote")
        .add_query_param("check_in", "01/02/2030")
        .add_query_param("check_out", "2030-01-03")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error_code"], "INVALID_DATE");
}

/// Quoting an unknown room is a 404
#[tokio::test]
async fn test_quote_unknown_room() {
    let server = create_test_app();
    let (check_in, check_out) = stay(0, 2);

    let response = server
        .get("/api/rooms/villa-404/quote")
        .add_query_param("check_in", check_in)
        .add_query_param("check_out", check_out)
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

/// Stays longer than a year are rejected on both read endpoints
#[tokio::test]
async fn test_quote_and_availability_cap_stay_length() {
    let server = create_test_app();
    create_room(&server).await;
    let (check_in, _) = stay(0, 1);

    for path in ["/api/rooms/villa-1/quote", "/api/rooms/villa-1/availability"] {
        let response = server
            .get(path)
            .add_query_param("check_in", &check_in)
            .add_query_param("check_out", "9999-12-31")
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
    }

    let (check_in, check_out) = stay(0, 365);
    let response = server
        .get("/api/rooms/villa-1/availability")
        .add_query_param("check_in", check_in)
        .add_query_param("check_out", check_out)
        .await;
    response.assert_status_ok();
}

/// A room rate too large to price is refused when the room is saved
#[tokio::test]
async fn test_room_rate_must_be_priceable() {
    let server = create_test_app();

    let response = server
        .put("/api/rooms")
        .json(&json!({
            "id": "villa-1",
            "name": "Sunset Pool Villa",
            "base_nightly_rate": "79228162514264337593543950335",
            "max_guests": 4
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let rooms: serde_json::Value = server.get("/api/rooms").await.json();
    assert_eq!(rooms.as_array().map(Vec::len), Some(0));
}

// ============================================================================
// Booking Tests (POST /api/bookings)
// ============================================================================

/// Booking, paying and earning points end to end
#[tokio::test]
async fn test_booking_lifecycle() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(10, 2);
    let response = server
        .post("/api/bookings")
        .json(&booking_payload(&check_in, &check_out))
        .await;
    response.assert_status(StatusCode::CREATED);
    let booking: Booking = response.json();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total, dec!(6000));

    let response = server
        .post(&format!("/api/bookings/{}/payment", booking.id))
        .json(&json!({ "status": "paid", "amount": "6000" }))
        .await;
    response.assert_status_ok();
    let confirmed: Booking = response.json();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.points_earned, 600);

    let member: MemberAccount = server.get("/api/loyalty/u1").await.json();
    assert_eq!(member.points, 600);

    // created email + confirmed LINE and email
    let pending: Vec<NotificationIntent> = server.get("/api/notifications/pending").await.json();
    assert_eq!(pending.len(), 3);

    let response = server
        .post(&format!("/api/bookings/{}/complete", booking.id))
        .await;
    response.assert_status_ok();
    let completed: Booking = response.json();
    assert_eq!(completed.status, BookingStatus::Completed);
}

/// The day another stay checks out cannot be a check-in day
#[tokio::test]
async fn test_overlapping_booking_conflict() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(20, 3);
    server
        .post("/api/bookings")
        .json(&booking_payload(&check_in, &check_out))
        .await
        .assert_status(StatusCode::CREATED);

    let (_, later_out) = stay(23, 2);
    let response = server
        .post("/api/bookings")
        .json(&booking_payload(&check_out, &later_out))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error_code"], "UNAVAILABLE_DATE");
}

/// Exactly one of two concurrent overlapping bookings succeeds
#[tokio::test]
async fn test_concurrent_double_booking() {
    let server = create_test_app();
    create_room(&server).await;

    let (first_in, first_out) = stay(40, 3);
    let (second_in, second_out) = stay(41, 3);
    let first = booking_payload(&first_in, &first_out);
    let second = booking_payload(&second_in, &second_out);

    let (a, b) = tokio::join!(
        async { server.post("/api/bookings").json(&first).await },
        async { server.post("/api/bookings").json(&second).await },
    );

    let statuses = [a.status_code(), b.status_code()];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 1);

    let bookings: Vec<Booking> = server.get("/api/bookings").await.json();
    assert_eq!(bookings.len(), 1);
}

/// Cancelled bookings free their dates
#[tokio::test]
async fn test_cancel_frees_dates() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(60, 2);
    let booking: Booking = server
        .post("/api/bookings")
        .json(&booking_payload(&check_in, &check_out))
        .await
        .json();

    server
        .post(&format!("/api/bookings/{}/cancel", booking.id))
        .await
        .assert_status_ok();

    let report: serde_json::Value = server
        .get("/api/rooms/villa-1/availability")
        .add_query_param("check_in", &check_in)
        .add_query_param("check_out", &check_out)
        .await
        .json();
    assert_eq!(report["bookable"], true);

    let response = server
        .post(&format!("/api/bookings/{}/payment", booking.id))
        .json(&json!({ "status": "paid", "amount": "6000" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

/// Zero-night and oversize bookings are validation errors
#[tokio::test]
async fn test_booking_validation() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, _) = stay(80, 1);
    let response = server
        .post("/api/bookings")
        .json(&booking_payload(&check_in, &check_in))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let (check_in, check_out) = stay(80, 2);
    let mut payload = booking_payload(&check_in, &check_out);
    payload["guests"] = json!(12);
    let response = server.post("/api/bookings").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

/// Blackouts that disallow booking block the stay
#[tokio::test]
async fn test_blackout_blocks_booking() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(100, 3);
    server
        .post("/api/rules/blackouts")
        .json(&json!({
            "name": "Private event",
            "date_range": { "start": check_out, "end": check_out },
            "type": "private_event",
            "allow_booking": false
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/api/bookings")
        .json(&booking_payload(&check_in, &check_out))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

// ============================================================================
// Loyalty Tests (/api/loyalty)
// ============================================================================

/// Crossing the silver threshold by one point upgrades the tier
#[tokio::test]
async fn test_tier_upgrade_at_threshold() {
    let server = create_test_app();

    earn(&server, "u9", 9999).await;
    let member: MemberAccount = server.get("/api/loyalty/u9").await.json();
    assert_eq!(member.tier, LoyaltyTier::Bronze);

    earn(&server, "u9", 1).await;
    let member: MemberAccount = server.get("/api/loyalty/u9").await.json();
    assert_eq!(member.lifetime_points, 10000);
    assert_eq!(member.tier, LoyaltyTier::Silver);
}

/// Overdrawing is rejected and leaves the balance unchanged
#[tokio::test]
async fn test_redeem_insufficient_points() {
    let server = create_test_app();
    earn(&server, "u5", 500).await;

    let response = server
        .post("/api/loyalty/u5/redeem")
        .json(&json!({ "points": 600, "reason": "Spa voucher" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error_code"], "INSUFFICIENT_POINTS");

    let member: MemberAccount = server.get("/api/loyalty/u5").await.json();
    assert_eq!(member.points, 500);
}

/// Non-positive redemptions are validation errors
#[tokio::test]
async fn test_redeem_rejects_non_positive_points() {
    let server = create_test_app();

    let response = server
        .post("/api/loyalty/u5/redeem")
        .json(&json!({ "points": 0, "reason": "Nothing" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

/// A single earn cannot exceed the per-transaction ceiling
#[tokio::test]
async fn test_earn_rejects_oversized_points() {
    let server = create_test_app();

    let response = server
        .post("/api/loyalty/u6/earn")
        .json(&json!({ "points": i64::MAX, "reason": "Jackpot" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let member: serde_json::Value = server.get("/api/loyalty/u6").await.json();
    assert_eq!(member["points"], 0);
    assert_eq!(member["lifetime_points"], 0);
}

// ============================================================================
// Notification Tests (/api/notifications)
// ============================================================================

/// Failed attempts retry until the ceiling, then the intent is terminal
#[tokio::test]
async fn test_notification_retry_ceiling() {
    let server = create_test_app();

    let intent: NotificationIntent = server
        .post("/api/notifications")
        .json(&json!({ "channel": "line", "payload_ref": "booking/b1/created" }))
        .await
        .json();

    let path = format!("/api/notifications/{}/attempts", intent.id);
    for _ in 0..3 {
        server
            .post(&path)
            .json(&json!({ "outcome": "failed" }))
            .await
            .assert_status_ok();
    }

    let failed: NotificationIntent = server
        .get(&format!("/api/notifications/{}", intent.id))
        .await
        .json();
    assert_eq!(failed.attempts, 3);
    assert!(failed.status.is_terminal());

    let response = server.post(&path).json(&json!({ "outcome": "sent" })).await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let pending: Vec<NotificationIntent> = server.get("/api/notifications/pending").await.json();
    assert!(pending.is_empty());
}

// ============================================================================
// Rule Administration Tests (/api/rules)
// ============================================================================

/// Invalid rules are rejected at creation and unknown ids are 404
#[tokio::test]
async fn test_rule_validation_and_delete() {
    let server = create_test_app();
    let (start, end) = stay(0, 5);

    let response = server
        .post("/api/rules/holidays")
        .json(&json!({
            "date_range": { "start": end, "end": start },
            "name_local": "x",
            "name_en": "Backwards",
            "price_multiplier": "1.5"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/rules/holidays")
        .json(&json!({
            "date_range": { "start": start, "end": end },
            "name_local": "x",
            "name_en": "Discount holiday",
            "price_multiplier": "0.5"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server.delete("/api/rules/seasonal/missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

/// Metrics count quotes served over HTTP
#[tokio::test]
async fn test_metrics_endpoint() {
    let server = create_test_app();
    create_room(&server).await;

    let (check_in, check_out) = stay(0, 2);
    quote_total(&server, &check_in, &check_out).await;

    let metrics: serde_json::Value = server.get("/api/metrics").await.json();
    assert_eq!(metrics["quotes"]["count"], 1);
}
