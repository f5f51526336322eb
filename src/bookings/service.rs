use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::booking_rules::{
    date_range::DateRange,
    error::{BRResult, BookingRulesError},
    types::{BookingStatus, NotificationChannel, PaymentStatus},
    AvailabilityReport, BookingRulesEngine, CalendarDay, Quote,
};
use crate::bookings::{
    models::{Booking, BookingListQuery, CreateBookingRequest, PaymentResultRequest, Room, UpsertRoomRequest},
    repository::{BookingRepository, RoomRepository},
    status_machine::StatusMachine,
};
use crate::store::KeyedLocks;
use crate::validation::{ensure, validate_identifier, validate_nightly_rate};

/// Service for booking business logic
///
/// Availability check and booking write for a room run under that room's
/// lock, so two overlapping requests cannot both pass the check.
#[derive(Clone)]
pub struct BookingService {
    rooms: RoomRepository,
    bookings: BookingRepository,
    engine: Arc<BookingRulesEngine>,
    room_locks: KeyedLocks,
}

impl BookingService {
    pub fn new(
        rooms: RoomRepository,
        bookings: BookingRepository,
        engine: Arc<BookingRulesEngine>,
    ) -> Self {
        Self {
            rooms,
            bookings,
            engine,
            room_locks: KeyedLocks::new(),
        }
    }

    pub fn engine(&self) -> &BookingRulesEngine {
        &self.engine
    }

    /// Create or replace a room
    pub async fn upsert_room(&self, request: UpsertRoomRequest) -> BRResult<Room> {
        request.validate()?;
        ensure("id", validate_identifier(&request.id))?;
        ensure(
            "base_nightly_rate",
            validate_nightly_rate(&request.base_nightly_rate),
        )?;

        let room = Room {
            id: request.id,
            name: request.name,
            base_nightly_rate: request.base_nightly_rate,
            max_guests: request.max_guests,
            is_active: request.is_active,
        };
        self.rooms.save(room.clone()).await?;

        tracing::info!(room_id = %room.id, rate = %room.base_nightly_rate, "Saved room");
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> BRResult<Room> {
        self.rooms
            .find_by_id(room_id)
            .await
            .ok_or_else(|| BookingRulesError::not_found("Room", room_id))
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        self.rooms.list().await
    }

    /// Quote a stay for a room at its base nightly rate
    pub async fn quote(
        &self,
        room_id: &str,
        range: &DateRange,
        booked_on: NaiveDate,
    ) -> BRResult<Quote> {
        let room = self.bookable_room(room_id, range).await?;
        let bookings = self.load_room_bookings(room_id).await;
        self.engine
            .quote(room_id, range, room.base_nightly_rate, booked_on, bookings.as_deref())
            .await
    }

    pub async fn availability(
        &self,
        room_id: &str,
        range: &DateRange,
        booked_on: NaiveDate,
    ) -> BRResult<AvailabilityReport> {
        let room = self.get_room(room_id).await?;
        let bookings = self.load_room_bookings(room_id).await;
        let mut report = self
            .engine
            .check_availability(room_id, range, booked_on, bookings.as_deref())
            .await?;

        if !room.is_active {
            report.bookable = false;
            report.reason = Some("room is not active".to_string());
        }
        Ok(report)
    }

    pub async fn calendar(&self, room_id: &str, year: i32, month: u32) -> BRResult<Vec<CalendarDay>> {
        let room = self.get_room(room_id).await?;
        let bookings = self.load_room_bookings(room_id).await;
        self.engine
            .calendar(room_id, year, month, room.base_nightly_rate, bookings.as_deref())
            .await
    }

    /// Create a pending booking at the quoted total
    ///
    /// Nothing is written if validation, availability or pricing fails.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        booked_on: NaiveDate,
    ) -> BRResult<Booking> {
        let result = self.try_create_booking(request, booked_on).await;
        match result {
            Ok(_) => self.engine.metrics().record_booking_created(),
            Err(_) => self.engine.metrics().record_booking_rejected(),
        }
        result
    }

    async fn try_create_booking(
        &self,
        request: CreateBookingRequest,
        booked_on: NaiveDate,
    ) -> BRResult<Booking> {
        request.validate()?;
        let range = DateRange::parse(&request.check_in, &request.check_out)?;
        if range.nights() == 0 {
            return Err(BookingRulesError::ValidationError(
                "Check-out must be at least one night after check-in".to_string(),
            ));
        }

        let room = self.bookable_room(&request.room_id, &range).await?;
        if request.guests > room.max_guests {
            return Err(BookingRulesError::ValidationError(format!(
                "{} holds at most {} guests",
                room.name, room.max_guests
            )));
        }

        let _guard = self.room_locks.lock(&room.id).await;

        let bookings = self.load_room_bookings(&room.id).await;
        let quote = self
            .engine
            .quote(&room.id, &range, room.base_nightly_rate, booked_on, bookings.as_deref())
            .await?;

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            room_id: room.id.clone(),
            user_id: request.user_id,
            guest_name: request.guest_name,
            guest_email: request.guest_email,
            guests: request.guests,
            date_range: range,
            status: BookingStatus::Pending,
            total: quote.total,
            points_earned: 0,
            created_at: now,
            updated_at: now,
        };
        self.bookings.save(booking.clone()).await?;

        tracing::info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            range = %booking.date_range,
            total = %booking.total,
            "Booking created"
        );

        self.notify(NotificationChannel::Email, &booking, "created").await;
        Ok(booking)
    }

    /// React to the payment gateway's result for a booking
    ///
    /// Only `paid` changes anything: the booking is confirmed and saved, then
    /// the guest earns points on the paid amount. The earn is keyed by the
    /// booking, so a `paid` retried after a failure finishes the job without
    /// earning twice. A repeated `paid` on a settled booking is a no-op.
    pub async fn apply_payment_result(
        &self,
        booking_id: &str,
        payment: PaymentResultRequest,
    ) -> BRResult<Booking> {
        if payment.amount < Decimal::ZERO {
            return Err(BookingRulesError::ValidationError(
                "Payment amount cannot be negative".to_string(),
            ));
        }

        let mut booking = self.get_booking(booking_id).await?;
        let _guard = self.room_locks.lock(&booking.room_id).await;
        booking = self.get_booking(booking_id).await?;

        if payment.status != PaymentStatus::Paid {
            tracing::info!(booking_id, status = ?payment.status, "Payment not completed; booking unchanged");
            return Ok(booking);
        }

        if booking.status != BookingStatus::Confirmed {
            booking.status = StatusMachine::transition(booking.status, BookingStatus::Confirmed)?;
            booking.updated_at = Utc::now();
            self.bookings.save(booking.clone()).await?;
            tracing::info!(booking_id, "Booking confirmed");

            self.notify(NotificationChannel::Line, &booking, "confirmed").await;
            self.notify(NotificationChannel::Email, &booking, "confirmed").await;
        } else if booking.points_earned > 0 || booking.user_id.is_none() {
            tracing::debug!(booking_id, "Duplicate paid callback ignored");
            return Ok(booking);
        }

        let Some(user_id) = booking.user_id.clone() else {
            return Ok(booking);
        };
        let now = Utc::now();
        if let Some(earned) = self
            .engine
            .award_booking_points(&user_id, &booking.id, payment.amount, now)
            .await?
        {
            booking.points_earned = earned.points;
            booking.updated_at = now;
            self.bookings.save(booking.clone()).await?;
            tracing::info!(booking_id, points = booking.points_earned, "Booking points recorded");
        }

        Ok(booking)
    }

    pub async fn cancel_booking(&self, booking_id: &str) -> BRResult<Booking> {
        self.update_status(booking_id, BookingStatus::Cancelled).await
    }

    pub async fn complete_booking(&self, booking_id: &str) -> BRResult<Booking> {
        self.update_status(booking_id, BookingStatus::Completed).await
    }

    pub async fn get_booking(&self, booking_id: &str) -> BRResult<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await
            .ok_or_else(|| BookingRulesError::not_found("Booking", booking_id))
    }

    pub async fn list_bookings(&self, query: BookingListQuery) -> BRResult<Vec<Booking>> {
        let range = match (query.start.as_deref(), query.end.as_deref()) {
            (Some(start), Some(end)) => Some(DateRange::parse(start, end)?),
            (None, None) => None,
            _ => {
                return Err(BookingRulesError::ValidationError(
                    "start and end must be given together".to_string(),
                ))
            }
        };

        Ok(self
            .bookings
            .list(query.room_id.as_deref(), range.as_ref())
            .await?)
    }

    async fn update_status(&self, booking_id: &str, to: BookingStatus) -> BRResult<Booking> {
        let booking = self.get_booking(booking_id).await?;
        let _guard = self.room_locks.lock(&booking.room_id).await;
        let mut booking = self.get_booking(booking_id).await?;

        let from = booking.status;
        booking.status = StatusMachine::transition(from, to)?;
        if from == to {
            return Ok(booking);
        }

        booking.updated_at = Utc::now();
        self.bookings.save(booking.clone()).await?;
        tracing::info!(booking_id, %from, %to, "Booking status changed");

        self.notify(NotificationChannel::Email, &booking, to.as_str()).await;
        Ok(booking)
    }

    async fn bookable_room(&self, room_id: &str, range: &DateRange) -> BRResult<Room> {
        let room = self.get_room(room_id).await?;
        if !room.is_active {
            return Err(BookingRulesError::UnavailableDate {
                room_id: room.id,
                date: range.start,
                reason: "room is not active".to_string(),
            });
        }
        Ok(room)
    }

    /// Bookings for one room, or `None` when the collection cannot be read
    async fn load_room_bookings(&self, room_id: &str) -> Option<Vec<Booking>> {
        match self.bookings.list(Some(room_id), None).await {
            Ok(bookings) => Some(bookings),
            Err(e) => {
                tracing::error!(room_id, error = %e, "Failed to load bookings");
                None
            }
        }
    }

    /// Queue a notification; a queue failure never undoes the booking change
    async fn notify(&self, channel: NotificationChannel, booking: &Booking, event: &str) {
        let payload_ref = format!("booking/{}/{}", booking.id, event);
        if let Err(e) = self.engine.notifications().enqueue(channel, &payload_ref).await {
            tracing::warn!(booking_id = %booking.id, %channel, error = %e, "Failed to queue notification");
        }
    }
}
