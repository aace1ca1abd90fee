//! Claim listings for customers and businesses.

use std::sync::Arc;

use crate::domain::{ClaimScope, ClaimStatus, Page, PageRequest};
use crate::error::GatewayError;
use crate::service::{RetryPolicy, StatusProjector};
use crate::store::{ClaimLedger, ClaimRecord};

/// Read path over the claim ledger. Every returned claim carries its
/// effective status.
#[derive(Debug, Clone)]
pub struct ClaimQueryService {
    ledger: Arc<dyn ClaimLedger>,
    projector: StatusProjector,
    retry: RetryPolicy,
}

impl ClaimQueryService {
    /// Creates a new `ClaimQueryService`.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn ClaimLedger>,
        projector: StatusProjector,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            projector,
            retry,
        }
    }

    /// Lists claims in `scope`, newest first, filtered on effective status.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the ledger stays unavailable.
    pub async fn list_claims(
        &self,
        scope: ClaimScope,
        status: Option<ClaimStatus>,
        page: PageRequest,
    ) -> Result<Page<ClaimRecord>, GatewayError> {
        let now = self.projector.now();
        let listed = self
            .retry
            .run("list_claims", || self.ledger.list_claims(scope, status, now, page))
            .await?;
        Ok(listed.map(|record| self.projector.observe_record(record)))
    }
}
