//! Redemption DTOs: verify, complete, and stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::claim_dto::ClaimDto;
use crate::domain::{Claim, ClaimType, Offer};
use crate::service::redemption::DEFAULT_STATS_DAYS;
use crate::service::{Verification, VerificationFailure};

/// Request body for `POST /redeem/verify`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyClaimRequest {
    /// Claim UUID, redemption code, or scanned QR content.
    pub claim_identifier: String,
}

/// What the redemption screen shows for a valid claim.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimDetails {
    /// Claim identifier.
    pub claim_id: uuid::Uuid,
    /// Redemption code.
    pub redemption_code: String,
    /// In-store or online.
    pub claim_type: ClaimType,
    /// Claim timestamp.
    pub claimed_at: DateTime<Utc>,
    /// Customer display name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Offer identifier.
    pub offer_id: uuid::Uuid,
    /// Offer title.
    pub offer_title: String,
    /// Discount percentage.
    pub discount_percentage: u8,
    /// Fixed discount code, if any.
    pub discount_code: Option<String>,
    /// Offer expiry.
    pub offer_expiry: DateTime<Utc>,
}

impl ClaimDetails {
    fn new(claim: Claim, offer: Offer) -> Self {
        Self {
            claim_id: claim.id.into(),
            redemption_code: claim.redemption_code.into_inner(),
            claim_type: claim.claim_type,
            claimed_at: claim.claimed_at,
            customer_name: claim.metadata.customer_name,
            customer_email: claim.metadata.customer_email,
            offer_id: offer.id.into(),
            offer_title: offer.title,
            discount_percentage: offer.discount_percentage,
            discount_code: offer.discount_code,
            offer_expiry: offer.expiry_date,
        }
    }
}

/// Response body for `POST /redeem/verify`.
///
/// Always `200 OK`: an unusable claim is a normal verification outcome,
/// reported through `is_valid = false` and `error_code`.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct VerifyClaimResponse {
    /// Whether the claim can be redeemed now.
    pub is_valid: bool,
    /// Resolved claim, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<uuid::Uuid>,
    /// Present when `is_valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_details: Option<ClaimDetails>,
    /// `CLAIM_NOT_FOUND`, `UNAUTHORIZED_BUSINESS`, `ALREADY_REDEEMED`
    /// or `OFFER_EXPIRED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Message for the redemption screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Earlier redemption time, for `ALREADY_REDEEMED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Earlier redemption notes, for `ALREADY_REDEEMED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redemption_notes: Option<String>,
    /// Offer expiry, for `OFFER_EXPIRED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl From<Verification> for VerifyClaimResponse {
    fn from(verification: Verification) -> Self {
        match verification {
            Verification::Valid { claim, offer } => Self {
                is_valid: true,
                claim_id: Some(claim.id.into()),
                claim_details: Some(ClaimDetails::new(claim, offer)),
                ..Self::default()
            },
            Verification::Invalid(failure) => {
                let mut response = Self {
                    error_code: Some(failure.code().to_string()),
                    error_message: Some(failure.message().to_string()),
                    ..Self::default()
                };
                match failure {
                    VerificationFailure::ClaimNotFound
                    | VerificationFailure::UnauthorizedBusiness => {}
                    VerificationFailure::AlreadyRedeemed { claim } => {
                        response.claim_id = Some(claim.id.into());
                        response.redeemed_at = claim.redeemed_at;
                        response.redemption_notes = claim.redemption_notes;
                    }
                    VerificationFailure::OfferExpired { claim, expiry_date } => {
                        response.claim_id = Some(claim.id.into());
                        response.expiry_date = Some(expiry_date);
                    }
                }
                response
            }
        }
    }
}

/// Request body for `POST /redeem/complete`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemClaimRequest {
    /// Claim UUID, redemption code, or scanned QR content.
    pub claim_id: String,
    /// Free-form notes stored with the redemption.
    #[serde(default)]
    pub redemption_notes: Option<String>,
}

/// Response body for `POST /redeem/complete`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemClaimResponse {
    /// Always `true`; failures are reported as errors.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The redeemed claim.
    pub claim: ClaimDto,
}

impl From<Claim> for RedeemClaimResponse {
    fn from(claim: Claim) -> Self {
        Self {
            success: true,
            message: "Offer redeemed successfully".to_string(),
            claim: claim.into(),
        }
    }
}

/// Query parameters for `GET /redeem/stats`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Trailing window in days, 1 to 365. Defaults to 30.
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    DEFAULT_STATS_DAYS
}
