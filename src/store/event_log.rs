//! Append-only audit log of [`ClaimEvent`]s in the `claim_events` table.

use sqlx::PgPool;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::StoreError;
use super::postgres::map_sqlx;
use crate::domain::{ClaimEvent, EventBus};

/// Writes domain events to PostgreSQL.
///
/// The recorder is a bus subscriber; a failed insert is logged and the
/// event dropped. It never feeds back into the request path.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    pool: PgPool,
}

impl EventRecorder {
    /// Creates a recorder over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one event and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if serialization or the insert fails.
    pub async fn record(&self, event: &ClaimEvent) -> Result<i64, StoreError> {
        let payload =
            serde_json::to_string(event).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO claim_events (offer_id, claim_id, event_type, payload) \
             VALUES ($1, $2, $3, $4::jsonb) RETURNING id",
        )
        .bind(*event.offer_id().as_uuid())
        .bind(event.claim_id().map(|id| *id.as_uuid()))
        .bind(event.event_type_str())
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    /// Subscribes to `bus` and records every event until the bus closes.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.record(&event).await {
                            tracing::warn!(
                                error = %e,
                                event_type = event.event_type_str(),
                                offer_id = %event.offer_id(),
                                "failed to record claim event"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event recorder lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("event recorder stopped");
        })
    }
}
