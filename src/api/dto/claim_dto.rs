//! Claim DTOs for claiming and listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use crate::domain::{Claim, ClaimMetadata, ClaimStatus, ClaimType, CustomerId, OfferId};
use crate::service::{ClaimOutcome, ClaimRequest};
use crate::store::ClaimRecord;

/// Request body for `POST /offers/{id}/claim`. Every field is optional.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClaimOfferRequest {
    /// In-store (default) or online.
    #[serde(default)]
    pub claim_type: ClaimType,
    /// Merchant page an online claim sends the customer to.
    #[serde(default)]
    pub merchant_redirect_url: Option<String>,
    /// Customer display name shown at redemption.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Customer email shown at redemption.
    #[serde(default)]
    pub customer_email: Option<String>,
}

impl ClaimOfferRequest {
    /// Binds the request to the calling customer and target offer.
    #[must_use]
    pub fn into_claim_request(self, customer_id: CustomerId, offer_id: OfferId) -> ClaimRequest {
        ClaimRequest {
            customer_id,
            offer_id,
            claim_type: self.claim_type,
            merchant_redirect_url: self.merchant_redirect_url,
            metadata: ClaimMetadata {
                customer_name: self.customer_name,
                customer_email: self.customer_email,
            },
        }
    }
}

/// A claim as exposed over the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimDto {
    /// Claim identifier.
    pub claim_id: uuid::Uuid,
    /// Claiming customer.
    pub customer_id: uuid::Uuid,
    /// Claimed offer.
    pub offer_id: uuid::Uuid,
    /// Code the customer presents at redemption.
    pub redemption_code: String,
    /// Effective status.
    pub status: ClaimStatus,
    /// In-store or online.
    pub claim_type: ClaimType,
    /// Claim timestamp.
    pub claimed_at: DateTime<Utc>,
    /// Redemption timestamp.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Notes recorded at redemption.
    pub redemption_notes: Option<String>,
    /// Content of the in-store QR code.
    pub verification_url: Option<String>,
    /// Merchant page for online claims.
    pub merchant_redirect_url: Option<String>,
    /// Customer display name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
}

impl From<Claim> for ClaimDto {
    fn from(claim: Claim) -> Self {
        Self {
            claim_id: claim.id.into(),
            customer_id: claim.customer_id.into(),
            offer_id: claim.offer_id.into(),
            redemption_code: claim.redemption_code.into_inner(),
            status: claim.status,
            claim_type: claim.claim_type,
            claimed_at: claim.claimed_at,
            redeemed_at: claim.redeemed_at,
            redemption_notes: claim.redemption_notes,
            verification_url: claim.verification_url,
            merchant_redirect_url: claim.merchant_redirect_url,
            customer_name: claim.metadata.customer_name,
            customer_email: claim.metadata.customer_email,
        }
    }
}

/// Response body for `POST /offers/{id}/claim`.
///
/// Returned with `201 Created` for a new claim and `200 OK` when the
/// customer already held one.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimOfferResponse {
    /// The claim.
    pub claim: ClaimDto,
    /// `true` when the claim existed before this request.
    pub already_claimed: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl From<ClaimOutcome> for ClaimOfferResponse {
    fn from(outcome: ClaimOutcome) -> Self {
        let message = if outcome.already_claimed {
            "You have already claimed this offer"
        } else {
            "Offer claimed successfully"
        };
        Self {
            claim: outcome.claim.into(),
            already_claimed: outcome.already_claimed,
            message: message.to_string(),
        }
    }
}

/// A listed claim with its parent offer's display fields.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimSummary {
    /// The claim.
    #[serde(flatten)]
    pub claim: ClaimDto,
    /// Business owning the offer.
    pub business_id: uuid::Uuid,
    /// Offer title.
    pub offer_title: String,
    /// Offer expiry.
    pub offer_expiry: DateTime<Utc>,
}

impl From<ClaimRecord> for ClaimSummary {
    fn from(record: ClaimRecord) -> Self {
        Self {
            claim: record.claim.into(),
            business_id: record.business_id.into(),
            offer_title: record.offer_title,
            offer_expiry: record.offer_expiry,
        }
    }
}

/// Filter parameters for `GET /claims`. Paging comes from
/// [`PaginationParams`](super::PaginationParams).
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClaimListQuery {
    /// Only claims with this effective status.
    #[serde(default)]
    pub status: Option<ClaimStatus>,
}

/// Filter parameters for `GET /business/claims`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BusinessClaimListQuery {
    /// Only claims against this offer.
    #[serde(default)]
    pub offer_id: Option<uuid::Uuid>,
    /// Only claims with this effective status.
    #[serde(default)]
    pub status: Option<ClaimStatus>,
}

/// Paginated claim listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedClaims {
    /// Claims on this page, newest first.
    pub data: Vec<ClaimSummary>,
    /// Paging metadata.
    pub pagination: PaginationMeta,
}
