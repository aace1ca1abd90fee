//! Effective-status projection with optional lazy write-back.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Claim, ClaimEvent, ClaimStatus, Clock, EventBus, effective_status};
use crate::store::{ClaimLedger, ClaimRecord, Transition};

/// Projects stored claims onto the status they have at the current time.
///
/// When write-back is enabled, a claim observed as newly expired is
/// persisted as `expired` on a background task. The caller gets the
/// projected value regardless of whether that write succeeds, and the
/// write is guarded on the stored status still being `active`.
#[derive(Debug, Clone)]
pub struct StatusProjector {
    ledger: Arc<dyn ClaimLedger>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    write_back: bool,
}

impl StatusProjector {
    /// Creates a projector.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn ClaimLedger>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        write_back: bool,
    ) -> Self {
        Self {
            ledger,
            clock,
            event_bus,
            write_back,
        }
    }

    /// The current time according to the projector's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Effective status of `claim` at the current time. Never writes.
    #[must_use]
    pub fn project(&self, claim: &Claim, offer_expiry: DateTime<Utc>) -> ClaimStatus {
        effective_status(claim.status, offer_expiry, self.clock.now())
    }

    /// Returns `claim` carrying its effective status, scheduling the
    /// `expired` write-back if the stored row is stale.
    pub fn observe(&self, mut claim: Claim, offer_expiry: DateTime<Utc>) -> Claim {
        let effective = self.project(&claim, offer_expiry);
        if effective != claim.status {
            if effective == ClaimStatus::Expired && claim.status == ClaimStatus::Active {
                self.schedule_write_back(&claim);
            }
            claim.status = effective;
        }
        claim
    }

    /// [`Self::observe`] over a joined record.
    pub fn observe_record(&self, mut record: ClaimRecord) -> ClaimRecord {
        record.claim = self.observe(record.claim, record.offer_expiry);
        record
    }

    fn schedule_write_back(&self, claim: &Claim) {
        if !self.write_back {
            return;
        }
        let ledger = Arc::clone(&self.ledger);
        let clock = Arc::clone(&self.clock);
        let event_bus = self.event_bus.clone();
        let claim_id = claim.id;
        let offer_id = claim.offer_id;
        tokio::spawn(async move {
            match ledger.mark_expired(claim_id).await {
                Ok(Transition::Applied(_)) => {
                    tracing::debug!(%claim_id, %offer_id, "claim expiry written back");
                    let _ = event_bus.publish(ClaimEvent::ClaimExpired {
                        offer_id,
                        claim_id,
                        timestamp: clock.now(),
                    });
                }
                Ok(Transition::Rejected(_) | Transition::NotFound) => {}
                Err(e) => {
                    tracing::warn!(%claim_id, error = %e, "claim expiry write-back failed");
                }
            }
        });
    }
}
