//! Claim aggregate and its lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{BusinessId, ClaimId, CustomerId, OfferId, RedemptionCode};

/// Lifecycle state of a claim.
///
/// `Active` is the only non-terminal state. `Redeemed` is reached through
/// an explicit redemption, `Expired` only by projection once the parent
/// offer's window has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Claimed, not yet used.
    Active,
    /// Used at the business. Terminal.
    Redeemed,
    /// The offer expired before the claim was used. Terminal.
    Expired,
}

impl ClaimStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored enum string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized stored value: {0}")]
pub struct UnknownValue(pub String);

impl FromStr for ClaimStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// How the customer intends to use the claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Presented at the counter by code or QR scan.
    #[default]
    InStore,
    /// Used on the merchant's website.
    Online,
}

impl ClaimType {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InStore => "in_store",
            Self::Online => "online",
        }
    }
}

impl FromStr for ClaimType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_store" => Ok(Self::InStore),
            "online" => Ok(Self::Online),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Customer details captured at claim time for the redemption screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimMetadata {
    /// Customer display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Customer email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

/// A customer's reservation against an offer's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim identifier.
    pub id: ClaimId,
    /// Claiming customer.
    pub customer_id: CustomerId,
    /// Claimed offer.
    pub offer_id: OfferId,
    /// Globally unique redemption code.
    pub redemption_code: RedemptionCode,
    /// Last persisted status. See [`super::effective_status`] for display.
    pub status: ClaimStatus,
    /// In-store or online.
    pub claim_type: ClaimType,
    /// When the claim was created.
    pub claimed_at: DateTime<Utc>,
    /// When the claim was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Notes recorded at redemption.
    pub redemption_notes: Option<String>,
    /// URL encoded in the in-store QR code.
    pub verification_url: Option<String>,
    /// Merchant page for online claims.
    pub merchant_redirect_url: Option<String>,
    /// Customer snapshot.
    pub metadata: ClaimMetadata,
}

/// Everything needed to insert a claim row.
#[derive(Debug, Clone)]
pub struct NewClaim {
    /// Claiming customer.
    pub customer_id: CustomerId,
    /// Claimed offer.
    pub offer_id: OfferId,
    /// Candidate redemption code.
    pub redemption_code: RedemptionCode,
    /// In-store or online.
    pub claim_type: ClaimType,
    /// URL encoded in the in-store QR code.
    pub verification_url: Option<String>,
    /// Merchant page for online claims.
    pub merchant_redirect_url: Option<String>,
    /// Customer snapshot.
    pub metadata: ClaimMetadata,
}

impl Claim {
    /// Materializes a new `Active` claim.
    #[must_use]
    pub fn from_new(new: NewClaim, claimed_at: DateTime<Utc>) -> Self {
        Self {
            id: ClaimId::new(),
            customer_id: new.customer_id,
            offer_id: new.offer_id,
            redemption_code: new.redemption_code,
            status: ClaimStatus::Active,
            claim_type: new.claim_type,
            claimed_at,
            redeemed_at: None,
            redemption_notes: None,
            verification_url: new.verification_url,
            merchant_redirect_url: new.merchant_redirect_url,
            metadata: new.metadata,
        }
    }
}

/// Whose claims a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimScope {
    /// Claims made by one customer.
    Customer(CustomerId),
    /// Claims against a business's offers, optionally a single offer.
    Business {
        /// Owning business.
        business_id: BusinessId,
        /// Restrict to this offer.
        offer_id: Option<OfferId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [ClaimStatus::Active, ClaimStatus::Redeemed, ClaimStatus::Expired] {
            assert_eq!(status.as_str().parse::<ClaimStatus>(), Ok(status));
        }
        assert!("used".parse::<ClaimStatus>().is_err());
    }

    #[test]
    fn claim_type_defaults_to_in_store() {
        assert_eq!(ClaimType::default(), ClaimType::InStore);
        assert_eq!("online".parse::<ClaimType>(), Ok(ClaimType::Online));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ClaimStatus::Redeemed).unwrap_or_default();
        assert_eq!(json, "\"redeemed\"");
    }
}
