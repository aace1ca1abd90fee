//! Offer DTOs for create, get, toggle, and list operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{BusinessId, NewOffer, OfferWindow, ProductId};
use crate::service::OfferSnapshot;

/// Request body for `POST /offers`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOfferRequest {
    /// Linked product.
    pub product_id: uuid::Uuid,
    /// Display title.
    pub title: String,
    /// Discount percentage, 1 to 100.
    pub discount_percentage: u8,
    /// Optional fixed discount code printed on the offer.
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end, strictly after `start_date`.
    pub expiry_date: DateTime<Utc>,
    /// Initial kill-switch state. Defaults to `true`.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Capacity limit. Omit for unlimited.
    #[serde(default)]
    pub max_claims: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl CreateOfferRequest {
    /// Binds the request to the calling business.
    #[must_use]
    pub fn into_new_offer(self, business_id: BusinessId) -> NewOffer {
        NewOffer {
            business_id,
            product_id: ProductId::from_uuid(self.product_id),
            title: self.title,
            discount_percentage: self.discount_percentage,
            discount_code: self.discount_code,
            start_date: self.start_date,
            expiry_date: self.expiry_date,
            is_active: self.is_active,
            max_claims: self.max_claims,
        }
    }
}

/// Offer as returned by every offer endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfferResponse {
    /// Offer identifier.
    pub offer_id: uuid::Uuid,
    /// Owning business.
    pub business_id: uuid::Uuid,
    /// Linked product.
    pub product_id: uuid::Uuid,
    /// Display title.
    pub title: String,
    /// Discount percentage.
    pub discount_percentage: u8,
    /// Fixed discount code, if any.
    pub discount_code: Option<String>,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end.
    pub expiry_date: DateTime<Utc>,
    /// Kill-switch state.
    pub is_active: bool,
    /// Capacity limit; `null` means unlimited.
    pub max_claims: Option<u32>,
    /// Capacity units granted so far.
    pub current_claims: u32,
    /// Units still available; `null` means unlimited.
    pub remaining_claims: Option<u32>,
    /// Window state at read time.
    pub status: OfferWindow,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<OfferSnapshot> for OfferResponse {
    fn from(snapshot: OfferSnapshot) -> Self {
        let OfferSnapshot { offer, window } = snapshot;
        let remaining_claims = offer.remaining_claims();
        Self {
            offer_id: offer.id.into(),
            business_id: offer.business_id.into(),
            product_id: offer.product_id.into(),
            title: offer.title,
            discount_percentage: offer.discount_percentage,
            discount_code: offer.discount_code,
            start_date: offer.start_date,
            expiry_date: offer.expiry_date,
            is_active: offer.is_active,
            max_claims: offer.max_claims,
            current_claims: offer.current_claims,
            remaining_claims,
            status: window,
            created_at: offer.created_at,
        }
    }
}

/// Request body for `PATCH /offers/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetOfferStatusRequest {
    /// New kill-switch state.
    pub is_active: bool,
}

/// Query parameters for `GET /business/offers`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OfferListQuery {
    /// Only offers currently in this window state.
    #[serde(default)]
    pub status: Option<OfferWindow>,
}

/// Response body for `GET /business/offers`.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfferListResponse {
    /// Offers, newest first.
    pub data: Vec<OfferResponse>,
    /// Number of offers returned.
    pub total: usize,
}
