// Notification Intent Queue
//
// Records outbound email/LINE/SMS notifications and their delivery status.
// Delivery itself belongs to an external provider, which polls `pending` and
// reports each try back through `mark_attempt`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::booking_rules::{
    error::{BRResult, BookingRulesError},
    types::{DeliveryOutcome, NotificationChannel, NotificationStatus},
};
use crate::store::{JsonStore, KeyedLocks, Record};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A notification waiting for, or finished with, delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationIntent {
    pub id: String,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub attempts: u32,
    /// Reference to the message content held by the delivery provider
    pub payload_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for NotificationIntent {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl NotificationIntent {
    /// Apply one delivery outcome
    ///
    /// Terminal intents cannot be attempted again.
    pub fn record_attempt(
        &mut self,
        outcome: DeliveryOutcome,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> BRResult<()> {
        if self.status.is_terminal() {
            return Err(BookingRulesError::InvalidStatusTransition(format!(
                "Notification {} is already {}",
                self.id, self.status
            )));
        }

        self.attempts += 1;
        self.status = match outcome {
            DeliveryOutcome::Sent => NotificationStatus::Sent,
            DeliveryOutcome::Failed if self.attempts >= max_attempts => NotificationStatus::Failed,
            DeliveryOutcome::Failed => NotificationStatus::Retry,
        };
        self.updated_at = now;
        Ok(())
    }
}

/// Notification Intent Queue
pub struct NotificationIntentQueue {
    intents: JsonStore<NotificationIntent>,
    locks: KeyedLocks,
    max_attempts: u32,
}

impl NotificationIntentQueue {
    pub fn in_memory(max_attempts: u32) -> Self {
        Self {
            intents: JsonStore::in_memory("notifications"),
            locks: KeyedLocks::new(),
            max_attempts,
        }
    }

    pub async fn open(dir: &Path, max_attempts: u32) -> BRResult<Self> {
        Ok(Self {
            intents: JsonStore::open(dir, "notifications").await?,
            locks: KeyedLocks::new(),
            max_attempts,
        })
    }

    /// Queue a new intent with no attempts
    pub async fn enqueue(
        &self,
        channel: NotificationChannel,
        payload_ref: &str,
    ) -> BRResult<NotificationIntent> {
        if payload_ref.trim().is_empty() {
            return Err(BookingRulesError::ValidationError(
                "payload_ref cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let intent = NotificationIntent {
            id: Uuid::new_v4().to_string(),
            channel,
            status: NotificationStatus::Queued,
            attempts: 0,
            payload_ref: payload_ref.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.intents.put(intent.clone()).await?;

        tracing::debug!(intent_id = %intent.id, %channel, payload_ref, "Notification queued");
        Ok(intent)
    }

    /// Record a delivery attempt reported by the provider
    pub async fn mark_attempt(
        &self,
        id: &str,
        outcome: DeliveryOutcome,
    ) -> BRResult<NotificationIntent> {
        let _guard = self.locks.lock(id).await;

        let mut intent = self
            .intents
            .get(id)
            .await
            .ok_or_else(|| BookingRulesError::not_found("Notification", id))?;
        intent.record_attempt(outcome, self.max_attempts, Utc::now())?;
        self.intents.put(intent.clone()).await?;

        match intent.status {
            NotificationStatus::Sent => {
                tracing::info!(intent_id = id, attempts = intent.attempts, "Notification sent")
            }
            NotificationStatus::Failed => tracing::warn!(
                intent_id = id,
                attempts = intent.attempts,
                "Notification failed permanently"
            ),
            _ => tracing::debug!(intent_id = id, attempts = intent.attempts, "Notification will retry"),
        }

        Ok(intent)
    }

    pub async fn get(&self, id: &str) -> BRResult<NotificationIntent> {
        self.intents
            .get(id)
            .await
            .ok_or_else(|| BookingRulesError::not_found("Notification", id))
    }

    /// Intents still awaiting delivery, oldest first
    pub async fn pending(&self) -> Vec<NotificationIntent> {
        let mut pending: Vec<NotificationIntent> = self
            .intents
            .list()
            .await
            .into_iter()
            .filter(|intent| !intent.status.is_terminal())
            .collect();
        pending.sort_by_key(|intent| intent.created_at);
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_starts_queued() {
        let queue = NotificationIntentQueue::in_memory(DEFAULT_MAX_ATTEMPTS);
        let intent = queue
            .enqueue(NotificationChannel::Email, "booking-confirmed/b1")
            .await
            .unwrap();

        assert_eq!(intent.status, NotificationStatus::Queued);
        assert_eq!(intent.attempts, 0);
        assert_eq!(queue.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_ceiling() {
        let queue = NotificationIntentQueue::in_memory(3);
        let intent = queue.enqueue(NotificationChannel::Line, "msg-1").await.unwrap();

        let first = queue.mark_attempt(&intent.id, DeliveryOutcome::Failed).await.unwrap();
        assert_eq!(first.status, NotificationStatus::Retry);
        assert_eq!(first.attempts, 1);

        let second = queue.mark_attempt(&intent.id, DeliveryOutcome::Failed).await.unwrap();
        assert_eq!(second.status, NotificationStatus::Retry);

        let third = queue.mark_attempt(&intent.id, DeliveryOutcome::Failed).await.unwrap();
        assert_eq!(third.status, NotificationStatus::Failed);
        assert_eq!(third.attempts, 3);
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_sent_after_retry() {
        let queue = NotificationIntentQueue::in_memory(3);
        let intent = queue.enqueue(NotificationChannel::Sms, "otp-1").await.unwrap();

        queue.mark_attempt(&intent.id, DeliveryOutcome::Failed).await.unwrap();
        let sent = queue.mark_attempt(&intent.id, DeliveryOutcome::Sent).await.unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert_eq!(sent.attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_intent_rejects_attempts() {
        let queue = NotificationIntentQueue::in_memory(3);
        let intent = queue.enqueue(NotificationChannel::Email, "msg-2").await.unwrap();
        queue.mark_attempt(&intent.id, DeliveryOutcome::Sent).await.unwrap();

        let result = queue.mark_attempt(&intent.id, DeliveryOutcome::Failed).await;
        assert!(matches!(result, Err(BookingRulesError::InvalidStatusTransition(_))));
        assert_eq!(queue.get(&intent.id).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let queue = NotificationIntentQueue::in_memory(3);
        let result = queue.mark_attempt("missing", DeliveryOutcome::Sent).await;
        assert!(matches!(result, Err(BookingRulesError::NotFound { .. })));
    }

    #[test]
    fn test_single_attempt_ceiling() {
        let now = Utc::now();
        let mut intent = NotificationIntent {
            id: "n1".to_string(),
            channel: NotificationChannel::Email,
            status: NotificationStatus::Queued,
            attempts: 0,
            payload_ref: "msg".to_string(),
            created_at: now,
            updated_at: now,
        };
        intent.record_attempt(DeliveryOutcome::Failed, 1, now).unwrap();
        assert_eq!(intent.status, NotificationStatus::Failed);
    }
}
