//! Delivery-state coordination: queued → delivered → read.

use std::sync::Arc;

use chrono::Utc;

use crate::error::ApiError;
use crate::store::{ChatStore, MarkOutcome};

/// Advances each (message, recipient) pair through its delivery lifecycle.
///
/// Both operations are idempotent: the first acknowledgement wins and replays
/// leave the stored timestamp untouched. A read acknowledgement is accepted
/// even when no delivery acknowledgement ever arrived — the two transitions
/// are deliberately independent, matching how clients ack out of order.
pub struct DeliveryCoordinator {
    store: Arc<dyn ChatStore>,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn mark_delivered(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<(), ApiError> {
        match self
            .store
            .set_delivered_if_null(message_id, recipient_id, Utc::now())
            .await?
        {
            MarkOutcome::Applied => {
                tracing::debug!(message_id, recipient_id, "message delivered");
                Ok(())
            }
            MarkOutcome::AlreadySet => Ok(()),
            MarkOutcome::NotFound => Err(ApiError::not_found("Delivery record not found")),
        }
    }

    pub async fn mark_read(&self, message_id: i64, recipient_id: &str) -> Result<(), ApiError> {
        match self
            .store
            .set_read_if_null(message_id, recipient_id, Utc::now())
            .await?
        {
            MarkOutcome::Applied => {
                tracing::debug!(message_id, recipient_id, "message read");
                Ok(())
            }
            MarkOutcome::AlreadySet => Ok(()),
            MarkOutcome::NotFound => Err(ApiError::not_found("Delivery record not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn coordinator_with_record(message_id: i64, recipient: &str) -> DeliveryCoordinator {
        let store = Arc::new(MemoryStore::new());
        store
            .create_message_recipient(message_id, recipient)
            .await
            .unwrap();
        DeliveryCoordinator::new(store)
    }

    #[tokio::test]
    async fn mark_delivered_is_idempotent() {
        let coordinator = coordinator_with_record(1, "usr_b").await;

        coordinator.mark_delivered(1, "usr_b").await.unwrap();
        let first = coordinator
            .store
            .message_recipient(1, "usr_b")
            .await
            .unwrap()
            .unwrap()
            .delivered_at
            .unwrap();

        // Replay: accepted, timestamp unchanged.
        coordinator.mark_delivered(1, "usr_b").await.unwrap();
        let second = coordinator
            .store
            .message_recipient(1, "usr_b")
            .await
            .unwrap()
            .unwrap()
            .delivered_at
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn mark_read_before_delivered_is_accepted() {
        let coordinator = coordinator_with_record(2, "usr_b").await;

        coordinator.mark_read(2, "usr_b").await.unwrap();

        let record = coordinator
            .store
            .message_recipient(2, "usr_b")
            .await
            .unwrap()
            .unwrap();
        assert!(record.read_at.is_some());
        assert!(record.delivered_at.is_none());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let coordinator = coordinator_with_record(3, "usr_b").await;

        coordinator.mark_read(3, "usr_b").await.unwrap();
        let first = coordinator
            .store
            .message_recipient(3, "usr_b")
            .await
            .unwrap()
            .unwrap()
            .read_at
            .unwrap();

        coordinator.mark_read(3, "usr_b").await.unwrap();
        let second = coordinator
            .store
            .message_recipient(3, "usr_b")
            .await
            .unwrap()
            .unwrap()
            .read_at
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_record_is_a_recoverable_error() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = DeliveryCoordinator::new(store);

        let err = coordinator.mark_delivered(99, "usr_x").await.unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }
}
