use std::path::Path;
use std::sync::Arc;

use crate::booking_rules::date_range::DateRange;
use crate::bookings::models::{Booking, Room};
use crate::store::{JsonStore, StoreResult};

/// Repository for room operations
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<JsonStore<Room>>,
}

impl RoomRepository {
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(JsonStore::in_memory("rooms")),
        }
    }

    pub async fn open(dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            store: Arc::new(JsonStore::open(dir, "rooms").await?),
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Room> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Vec<Room> {
        self.store.list().await
    }

    pub async fn save(&self, room: Room) -> StoreResult<()> {
        self.store.put(room).await
    }
}

/// Repository for booking operations
///
/// This is the booking collection the availability index reads.
#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<JsonStore<Booking>>,
}

impl BookingRepository {
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(JsonStore::in_memory("bookings")),
        }
    }

    pub async fn open(dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            store: Arc::new(JsonStore::open(dir, "bookings").await?),
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Booking> {
        self.store.get(id).await
    }

    /// Bookings filtered by room and by overlap with `range`, ordered by check-in
    ///
    /// Fails with `StoreError::Unavailable` when the collection stays locked
    /// by a writer past the read timeout.
    pub async fn list(
        &self,
        room_id: Option<&str>,
        range: Option<&DateRange>,
    ) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .store
            .try_list()
            .await?
            .into_iter()
            .filter(|booking| room_id.map_or(true, |id| booking.room_id == id))
            .filter(|booking| range.map_or(true, |r| booking.date_range.overlaps(r)))
            .collect();

        bookings.sort_by(|a, b| {
            a.date_range
                .start
                .cmp(&b.date_range.start)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(bookings)
    }

    pub async fn save(&self, booking: Booking) -> StoreResult<()> {
        self.store.put(booking).await
    }

    #[cfg(test)]
    pub(crate) fn in_memory_with_read_timeout(timeout: std::time::Duration) -> Self {
        Self {
            store: Arc::new(JsonStore::in_memory("bookings").with_read_timeout(timeout)),
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &JsonStore<Booking> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_rules::availability::fixtures::booking;
    use crate::booking_rules::types::BookingStatus;

    #[tokio::test]
    async fn test_list_filters_by_room_and_range() {
        let repo = BookingRepository::in_memory();
        repo.save(booking("b2", "villa-1", "2025-01-10", "2025-01-12", BookingStatus::Confirmed))
            .await
            .unwrap();
        repo.save(booking("b1", "villa-1", "2025-01-01", "2025-01-03", BookingStatus::Pending))
            .await
            .unwrap();
        repo.save(booking("b3", "villa-2", "2025-01-01", "2025-01-03", BookingStatus::Pending))
            .await
            .unwrap();

        let all_villa_1 = repo.list(Some("villa-1"), None).await.unwrap();
        let ids: Vec<&str> = all_villa_1.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);

        let range = DateRange::parse("2025-01-03", "2025-01-05").unwrap();
        let overlapping = repo.list(None, Some(&range)).await.unwrap();
        let mut ids: Vec<&str> = overlapping.iter().map(|b| b.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b1", "b3"]);
    }
}
