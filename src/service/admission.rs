//! Claim admission: "customer wants to claim offer X".

use std::sync::Arc;

use crate::domain::{
    Claim, ClaimEvent, ClaimMetadata, ClaimType, Clock, CodeGenerator, CustomerId, EventBus,
    NewClaim, OfferId,
};
use crate::error::GatewayError;
use crate::service::RetryPolicy;
use crate::store::{Admission, ClaimLedger, OfferRegistry, StoreError};

/// A customer's request to claim an offer.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Claiming customer.
    pub customer_id: CustomerId,
    /// Target offer.
    pub offer_id: OfferId,
    /// In-store or online.
    pub claim_type: ClaimType,
    /// Where an online claim sends the customer.
    pub merchant_redirect_url: Option<String>,
    /// Customer snapshot shown to the business at redemption.
    pub metadata: ClaimMetadata,
}

/// Result of [`ClaimAdmissionService::claim_offer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// The new or pre-existing claim.
    pub claim: Claim,
    /// `true` when the customer already held this claim.
    pub already_claimed: bool,
}

/// Orchestrates claim admission against the offer registry and ledger.
///
/// Claiming is idempotent per (customer, offer): a repeated or racing
/// request for the same pair gets the existing claim back and never
/// consumes a second capacity unit.
#[derive(Debug, Clone)]
pub struct ClaimAdmissionService {
    offers: Arc<dyn OfferRegistry>,
    ledger: Arc<dyn ClaimLedger>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    retry: RetryPolicy,
    code_attempts: u32,
    verification_base_url: String,
}

impl ClaimAdmissionService {
    /// Creates a new `ClaimAdmissionService`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        offers: Arc<dyn OfferRegistry>,
        ledger: Arc<dyn ClaimLedger>,
        codes: Arc<dyn CodeGenerator>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        retry: RetryPolicy,
        code_attempts: u32,
        verification_base_url: String,
    ) -> Self {
        Self {
            offers,
            ledger,
            codes,
            clock,
            event_bus,
            retry,
            code_attempts: code_attempts.max(1),
            verification_base_url,
        }
    }

    /// Claims an offer for a customer.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::OfferNotFound`] if the offer does not exist.
    /// - [`GatewayError::OfferNotActive`] if it is switched off or outside
    ///   its window.
    /// - [`GatewayError::OfferFull`] if no capacity is left.
    /// - [`GatewayError::Transient`] if storage stays unavailable after
    ///   the retry budget.
    pub async fn claim_offer(&self, request: ClaimRequest) -> Result<ClaimOutcome, GatewayError> {
        let ClaimRequest {
            customer_id,
            offer_id,
            claim_type,
            merchant_redirect_url,
            metadata,
        } = request;

        let offer = self
            .retry
            .run("get_offer", || self.offers.get_offer(offer_id))
            .await?
            .ok_or_else(|| GatewayError::OfferNotFound(offer_id.into()))?;

        let now = self.clock.now();
        offer.ensure_claimable(now)?;

        if let Some(existing) = self
            .retry
            .run("find_existing_claim", || {
                self.ledger.find_existing_claim(customer_id, offer_id)
            })
            .await?
        {
            tracing::debug!(%offer_id, %customer_id, claim_id = %existing.id, "claim replayed");
            return Ok(ClaimOutcome {
                claim: existing,
                already_claimed: true,
            });
        }

        for attempt in 1..=self.code_attempts {
            let code = self.codes.generate();
            let new_claim = NewClaim {
                customer_id,
                offer_id,
                verification_url: match claim_type {
                    ClaimType::InStore => Some(code.verification_url(&self.verification_base_url)),
                    ClaimType::Online => None,
                },
                merchant_redirect_url: match claim_type {
                    ClaimType::Online => merchant_redirect_url.clone(),
                    ClaimType::InStore => None,
                },
                redemption_code: code,
                claim_type,
                metadata: metadata.clone(),
            };

            let admitted = self
                .retry
                .run("admit_claim", || {
                    self.ledger.admit_claim(new_claim.clone(), now)
                })
                .await;

            match admitted {
                Ok(Admission::Created {
                    claim,
                    current_claims,
                }) => {
                    let _ = self.event_bus.publish(ClaimEvent::ClaimCreated {
                        offer_id,
                        claim_id: claim.id,
                        customer_id,
                        claim_type,
                        current_claims,
                        timestamp: now,
                    });
                    tracing::info!(
                        %offer_id,
                        %customer_id,
                        claim_id = %claim.id,
                        current_claims,
                        "claim created"
                    );
                    return Ok(ClaimOutcome {
                        claim,
                        already_claimed: false,
                    });
                }
                Ok(Admission::Duplicate(existing)) => {
                    tracing::debug!(%offer_id, %customer_id, "concurrent claim resolved to existing");
                    return Ok(ClaimOutcome {
                        claim: existing,
                        already_claimed: true,
                    });
                }
                Ok(Admission::CapacityExceeded) => {
                    return Err(GatewayError::OfferFull(offer_id.into()));
                }
                Ok(Admission::OfferNotFound) => {
                    return Err(GatewayError::OfferNotFound(offer_id.into()));
                }
                Err(StoreError::CodeCollision) => {
                    tracing::warn!(%offer_id, attempt, "redemption code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(GatewayError::Internal(format!(
            "no unique redemption code after {} attempts",
            self.code_attempts
        )))
    }
}
