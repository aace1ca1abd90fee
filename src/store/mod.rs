//! Storage layer: offer registry and claim ledger.
//!
//! [`OfferRegistry`] owns offer records and the capacity counter.
//! [`ClaimLedger`] owns claim records, their uniqueness, and their status.
//! Both traits are object-safe so services hold `Arc<dyn ...>` and the
//! binary picks a backend at startup:
//!
//! - [`memory::MemoryStore`]: per-offer `tokio` locks, used by tests and
//!   when persistence is disabled.
//! - [`postgres::PgStore`]: conditional updates and unique constraints in
//!   PostgreSQL via `sqlx`.
//!
//! Every mutation that guards an invariant is a single atomic unit inside
//! the backend. Callers never read-compare-write the counter or a status.

pub mod event_log;
pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    BusinessId, Claim, ClaimId, ClaimIdentifier, ClaimScope, ClaimStatus, CustomerId, NewClaim,
    Offer, OfferId, Page, PageRequest,
};
use crate::error::GatewayError;

/// Failures reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A claim already exists for this (customer, offer) pair.
    #[error("a claim already exists for this customer and offer")]
    DuplicateClaim,
    /// The candidate redemption code is already in use.
    #[error("redemption code already issued")]
    CodeCollision,
    /// The call did not complete within its deadline.
    #[error("storage call timed out")]
    Timeout,
    /// Lock contention, serialization failure, or a dropped connection.
    #[error("storage contention: {0}")]
    Contention(String),
    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` when retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Contention(_))
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout | StoreError::Contention(_) => Self::Transient(err.to_string()),
            StoreError::Backend(msg) => Self::PersistenceError(msg),
            StoreError::DuplicateClaim | StoreError::CodeCollision => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Outcome of [`OfferRegistry::try_reserve_capacity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// One unit was granted; carries the counter after the increment.
    Reserved {
        /// `current_claims` after the increment.
        current_claims: u32,
    },
    /// The offer is at `max_claims`. Nothing was changed.
    CapacityExceeded,
    /// No such offer.
    NotFound,
}

/// Outcome of [`ClaimLedger::admit_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The claim was inserted and one capacity unit consumed.
    Created {
        /// The stored claim.
        claim: Claim,
        /// `current_claims` after the reservation.
        current_claims: u32,
    },
    /// The customer already holds a claim on this offer. No capacity used.
    Duplicate(Claim),
    /// The offer is at `max_claims`. Nothing was changed.
    CapacityExceeded,
    /// No such offer.
    OfferNotFound,
}

/// Outcome of a guarded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The claim was `active` and now carries the new status.
    Applied(Claim),
    /// The claim was not `active`; it is returned unchanged.
    Rejected(Claim),
    /// No such claim.
    NotFound,
}

/// A claim joined with the parent-offer fields read paths need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    /// The stored claim.
    pub claim: Claim,
    /// Business owning the parent offer.
    pub business_id: BusinessId,
    /// Parent offer title.
    pub offer_title: String,
    /// Parent offer expiry, for status projection.
    pub offer_expiry: DateTime<Utc>,
}

/// Read/write access to offer records. Owns the capacity counter.
#[async_trait]
pub trait OfferRegistry: Send + Sync + std::fmt::Debug {
    /// Stores a new offer.
    async fn insert_offer(&self, offer: Offer) -> Result<Offer, StoreError>;

    /// Loads an offer with its window, capacity and active flag.
    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>, StoreError>;

    /// Flips the kill switch. Returns the updated offer, or `None` if absent.
    async fn set_active(
        &self,
        offer_id: OfferId,
        is_active: bool,
    ) -> Result<Option<Offer>, StoreError>;

    /// Lists a business's offers, newest first.
    async fn list_offers(&self, business_id: BusinessId) -> Result<Vec<Offer>, StoreError>;

    /// Atomically grants one capacity unit if `max_claims` allows it.
    ///
    /// Either increments `current_claims` by exactly one, or changes
    /// nothing. N concurrent callers against a capacity of 1 produce
    /// exactly one [`Reservation::Reserved`].
    async fn try_reserve_capacity(&self, offer_id: OfferId) -> Result<Reservation, StoreError>;
}

/// Read/write access to claim records. Owns uniqueness and status.
#[async_trait]
pub trait ClaimLedger: Send + Sync + std::fmt::Debug {
    /// Finds the claim a customer holds on an offer, if any.
    async fn find_existing_claim(
        &self,
        customer_id: CustomerId,
        offer_id: OfferId,
    ) -> Result<Option<Claim>, StoreError>;

    /// Resolves a claim by id or redemption code.
    async fn find_claim(&self, identifier: &ClaimIdentifier) -> Result<Option<Claim>, StoreError>;

    /// Inserts a claim without touching offer capacity.
    ///
    /// Fails with [`StoreError::DuplicateClaim`] if the pair already has a
    /// claim and [`StoreError::CodeCollision`] if the code is taken.
    async fn create_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Claim, StoreError>;

    /// Reserves one capacity unit and inserts the claim as one atomic unit.
    ///
    /// Pair uniqueness is checked before capacity, so a customer who
    /// already holds a claim gets [`Admission::Duplicate`] even when the
    /// offer is full. If the insert fails the reservation is not kept.
    ///
    /// Fails with [`StoreError::CodeCollision`] if the code is taken; no
    /// capacity is consumed in that case either.
    async fn admit_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Admission, StoreError>;

    /// Moves an `active` claim to `redeemed`.
    async fn mark_redeemed(
        &self,
        claim_id: ClaimId,
        redeemed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Transition, StoreError>;

    /// Moves an `active` claim to `expired`. Never touches a redeemed claim.
    async fn mark_expired(&self, claim_id: ClaimId) -> Result<Transition, StoreError>;

    /// Lists claims in `scope`, newest first.
    ///
    /// `status` filters on the effective status at `now`, so an `active`
    /// row under an expired offer matches `expired`.
    async fn list_claims(
        &self,
        scope: ClaimScope,
        status: Option<ClaimStatus>,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<ClaimRecord>, StoreError>;

    /// All claims against a business's offers made at or after `since`.
    async fn claims_since(
        &self,
        business_id: BusinessId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRecord>, StoreError>;
}
