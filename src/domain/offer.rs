//! Offer aggregate: time window, kill switch, and capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{BusinessId, OfferId, ProductId};
use crate::error::GatewayError;

/// A business-published, time-boxed, optionally capacity-limited discount.
///
/// `current_claims` is only ever incremented, and only through
/// [`crate::store::OfferRegistry::try_reserve_capacity`] or the combined
/// admission unit. It never exceeds `max_claims` when that is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identifier.
    pub id: OfferId,
    /// Owning business.
    pub business_id: BusinessId,
    /// Linked product.
    pub product_id: ProductId,
    /// Display title shown on the redemption screen.
    pub title: String,
    /// Discount percentage, 1 to 100.
    pub discount_percentage: u8,
    /// Optional fixed discount code printed on the offer.
    pub discount_code: Option<String>,
    /// First instant at which the offer can be claimed.
    pub start_date: DateTime<Utc>,
    /// Last instant at which the offer can be claimed or redeemed.
    pub expiry_date: DateTime<Utc>,
    /// Business-controlled kill switch, independent of the window.
    pub is_active: bool,
    /// Capacity limit; `None` means unlimited.
    pub max_claims: Option<u32>,
    /// Number of capacity units granted so far.
    pub current_claims: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Where an offer sits relative to its window and kill switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OfferWindow {
    /// Switched off by the business.
    Inactive,
    /// Window has not opened yet.
    Upcoming,
    /// Claimable right now (capacity permitting).
    Active,
    /// Window has closed.
    Expired,
}

impl OfferWindow {
    /// Returns the lowercase name used in filters and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl Offer {
    /// Builds a fresh offer record from a validated creation request.
    #[must_use]
    pub fn from_new(new: NewOffer, now: DateTime<Utc>) -> Self {
        Self {
            id: OfferId::new(),
            business_id: new.business_id,
            product_id: new.product_id,
            title: new.title,
            discount_percentage: new.discount_percentage,
            discount_code: new.discount_code,
            start_date: new.start_date,
            expiry_date: new.expiry_date,
            is_active: new.is_active,
            max_claims: new.max_claims,
            current_claims: 0,
            created_at: now,
        }
    }

    /// Classifies the offer at `now`. The kill switch wins over the window.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> OfferWindow {
        if !self.is_active {
            OfferWindow::Inactive
        } else if now < self.start_date {
            OfferWindow::Upcoming
        } else if now > self.expiry_date {
            OfferWindow::Expired
        } else {
            OfferWindow::Active
        }
    }

    /// Checks that the offer may be claimed at `now`, ignoring capacity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OfferNotActive`] when the offer is switched
    /// off or `now` falls outside `[start_date, expiry_date]`.
    pub fn ensure_claimable(&self, now: DateTime<Utc>) -> Result<(), GatewayError> {
        let reason = match self.window(now) {
            OfferWindow::Active => return Ok(()),
            OfferWindow::Inactive => "offer is not active",
            OfferWindow::Upcoming => "offer has not started yet",
            OfferWindow::Expired => "offer has expired",
        };
        Err(GatewayError::OfferNotActive {
            offer_id: *self.id.as_uuid(),
            reason: reason.to_string(),
        })
    }

    /// Returns `true` when at least one more claim can be granted.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.max_claims.is_none_or(|max| self.current_claims < max)
    }

    /// Remaining capacity units, or `None` for unlimited offers.
    #[must_use]
    pub fn remaining_claims(&self) -> Option<u32> {
        self.max_claims
            .map(|max| max.saturating_sub(self.current_claims))
    }
}

/// Largest accepted `max_claims`; the counter columns are `INTEGER`.
pub const MAX_CLAIMS_LIMIT: u32 = i32::MAX as u32;

/// Input for publishing a new offer.
#[derive(Debug, Clone)]
pub struct NewOffer {
    /// Owning business.
    pub business_id: BusinessId,
    /// Linked product.
    pub product_id: ProductId,
    /// Display title.
    pub title: String,
    /// Discount percentage, 1 to 100.
    pub discount_percentage: u8,
    /// Optional fixed discount code.
    pub discount_code: Option<String>,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end, strictly after `start_date`.
    pub expiry_date: DateTime<Utc>,
    /// Initial kill-switch state.
    pub is_active: bool,
    /// Capacity limit; `None` means unlimited.
    pub max_claims: Option<u32>,
}

impl NewOffer {
    /// Validates field ranges and window ordering.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.title.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "title must not be empty".to_string(),
            ));
        }
        if !(1..=100).contains(&self.discount_percentage) {
            return Err(GatewayError::InvalidRequest(format!(
                "discount_percentage must be between 1 and 100, got {}",
                self.discount_percentage
            )));
        }
        if self.expiry_date <= self.start_date {
            return Err(GatewayError::InvalidRequest(
                "expiry_date must be after start_date".to_string(),
            ));
        }
        if let Some(code) = &self.discount_code
            && code.trim().is_empty()
        {
            return Err(GatewayError::InvalidRequest(
                "discount_code must not be blank when provided".to_string(),
            ));
        }
        if let Some(max) = self.max_claims
            && max > MAX_CLAIMS_LIMIT
        {
            return Err(GatewayError::InvalidRequest(format!(
                "max_claims must be at most {MAX_CLAIMS_LIMIT}, got {max}"
            )));
        }
        Ok(())
    }
}
