//! Realtime seat/order fan-out.
//!
//! At-most-once semantics are acceptable: clients reconcile through polling.
//! Like notifications, publishing runs post-commit off the event channel and
//! never feeds back into the booking path.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::SeatStatus;

/// Minimal seat-state snapshot pushed to subscribers of a trip's room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatUpdate {
    pub seat_id: Uuid,
    pub status: SeatStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Abstract realtime publisher (websocket hub, redis pub/sub, ...).
#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    async fn publish_seat_update(
        &self,
        trip_id: Uuid,
        seats: &[SeatUpdate],
    ) -> Result<(), PublishError>;

    async fn publish_order_event(&self, subject_id: Uuid, kind: &str) -> Result<(), PublishError>;
}

/// Redis pub/sub implementation. One channel per trip room, one shared
/// channel for order events.
pub struct RedisRealtimePublisher {
    client: Arc<redis::Client>,
    channel_prefix: String,
}

impl RedisRealtimePublisher {
    pub fn new(client: Arc<redis::Client>, channel_prefix: String) -> Self {
        Self {
            client,
            channel_prefix,
        }
    }

    fn trip_channel(&self, trip_id: Uuid) -> String {
        format!("{}:{}:seats", self.channel_prefix, trip_id)
    }

    fn order_channel(&self) -> String {
        format!("{}:orders", self.channel_prefix)
    }
}

#[async_trait]
impl RealtimePublisher for RedisRealtimePublisher {
    async fn publish_seat_update(
        &self,
        trip_id: Uuid,
        seats: &[SeatUpdate],
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_string(seats)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| PublishError::Backend(e.to_string()))?;

        conn.publish::<_, _, ()>(self.trip_channel(trip_id), payload)
            .await
            .map_err(|e| PublishError::Backend(e.to_string()))?;

        debug!(trip_id = %trip_id, seats = seats.len(), "Published seat update");
        Ok(())
    }

    async fn publish_order_event(&self, subject_id: Uuid, kind: &str) -> Result<(), PublishError> {
        let payload = serde_json::json!({ "subject_id": subject_id, "kind": kind }).to_string();

        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| PublishError::Backend(e.to_string()))?;

        conn.publish::<_, _, ()>(self.order_channel(), payload)
            .await
            .map_err(|e| PublishError::Backend(e.to_string()))?;

        Ok(())
    }
}

/// Log-only implementation for development and tests.
pub struct LogPublisher;

#[async_trait]
impl RealtimePublisher for LogPublisher {
    async fn publish_seat_update(
        &self,
        trip_id: Uuid,
        seats: &[SeatUpdate],
    ) -> Result<(), PublishError> {
        info!(trip_id = %trip_id, seats = seats.len(), "seat update");
        Ok(())
    }

    async fn publish_order_event(&self, subject_id: Uuid, kind: &str) -> Result<(), PublishError> {
        info!(subject_id = %subject_id, kind, "order event");
        Ok(())
    }
}
