//! Database row models and their conversion into domain records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ClaimRecord, StoreError};
use crate::domain::{
    BusinessId, Claim, ClaimId, ClaimMetadata, ClaimStatus, ClaimType, CustomerId, Offer, OfferId,
    ProductId, RedemptionCode,
};

/// A row from the `offers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    /// Offer identifier.
    pub id: Uuid,
    /// Owning business.
    pub business_id: Uuid,
    /// Linked product.
    pub product_id: Uuid,
    /// Display title.
    pub title: String,
    /// Discount percentage (1–100).
    pub discount_percentage: i16,
    /// Optional fixed discount code.
    pub discount_code: Option<String>,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end.
    pub expiry_date: DateTime<Utc>,
    /// Kill switch.
    pub is_active: bool,
    /// Capacity limit; NULL is unlimited.
    pub max_claims: Option<i32>,
    /// Granted capacity units.
    pub current_claims: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = StoreError;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        let corrupt =
            |field: &str| StoreError::Backend(format!("offer {}: invalid {field}", row.id));
        Ok(Self {
            id: OfferId::from_uuid(row.id),
            business_id: BusinessId::from_uuid(row.business_id),
            product_id: ProductId::from_uuid(row.product_id),
            discount_percentage: u8::try_from(row.discount_percentage)
                .map_err(|_| corrupt("discount_percentage"))?,
            max_claims: row
                .max_claims
                .map(u32::try_from)
                .transpose()
                .map_err(|_| corrupt("max_claims"))?,
            current_claims: u32::try_from(row.current_claims)
                .map_err(|_| corrupt("current_claims"))?,
            title: row.title,
            discount_code: row.discount_code,
            start_date: row.start_date,
            expiry_date: row.expiry_date,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// A row from the `claims` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRow {
    /// Claim identifier.
    pub id: Uuid,
    /// Claiming customer.
    pub customer_id: Uuid,
    /// Claimed offer.
    pub offer_id: Uuid,
    /// Redemption code.
    pub redemption_code: String,
    /// `active`, `redeemed` or `expired`.
    pub status: String,
    /// `in_store` or `online`.
    pub claim_type: String,
    /// Claim timestamp.
    pub claimed_at: DateTime<Utc>,
    /// Redemption timestamp.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Redemption notes.
    pub redemption_notes: Option<String>,
    /// QR verification URL.
    pub verification_url: Option<String>,
    /// Merchant redirect for online claims.
    pub merchant_redirect_url: Option<String>,
    /// Snapshot of the customer's name.
    pub customer_name: Option<String>,
    /// Snapshot of the customer's email.
    pub customer_email: Option<String>,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = StoreError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        let corrupt =
            |e: &dyn std::fmt::Display| StoreError::Backend(format!("claim {}: {e}", row.id));
        Ok(Self {
            id: ClaimId::from_uuid(row.id),
            customer_id: CustomerId::from_uuid(row.customer_id),
            offer_id: OfferId::from_uuid(row.offer_id),
            redemption_code: RedemptionCode::parse(&row.redemption_code)
                .ok_or_else(|| corrupt(&"malformed redemption code"))?,
            status: row.status.parse::<ClaimStatus>().map_err(|e| corrupt(&e))?,
            claim_type: row.claim_type.parse::<ClaimType>().map_err(|e| corrupt(&e))?,
            claimed_at: row.claimed_at,
            redeemed_at: row.redeemed_at,
            redemption_notes: row.redemption_notes,
            verification_url: row.verification_url,
            merchant_redirect_url: row.merchant_redirect_url,
            metadata: ClaimMetadata {
                customer_name: row.customer_name,
                customer_email: row.customer_email,
            },
        })
    }
}

/// A claim row joined with its parent offer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRecordRow {
    /// Claim columns.
    #[sqlx(flatten)]
    pub claim: ClaimRow,
    /// Business owning the offer.
    pub business_id: Uuid,
    /// Offer title.
    pub offer_title: String,
    /// Offer expiry.
    pub offer_expiry: DateTime<Utc>,
}

impl TryFrom<ClaimRecordRow> for ClaimRecord {
    type Error = StoreError;

    fn try_from(row: ClaimRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            claim: Claim::try_from(row.claim)?,
            business_id: BusinessId::from_uuid(row.business_id),
            offer_title: row.offer_title,
            offer_expiry: row.offer_expiry,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn claim_row() -> ClaimRow {
        ClaimRow {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            redemption_code: "K7QM-3XPA-H2ZD".to_string(),
            status: "redeemed".to_string(),
            claim_type: "online".to_string(),
            claimed_at: Utc::now(),
            redeemed_at: Some(Utc::now()),
            redemption_notes: Some("ok".to_string()),
            verification_url: None,
            merchant_redirect_url: Some("https://shop.example".to_string()),
            customer_name: Some("Ada".to_string()),
            customer_email: None,
        }
    }

    #[test]
    fn claim_row_converts() {
        let Ok(claim) = Claim::try_from(claim_row()) else {
            panic!("conversion failed");
        };
        assert_eq!(claim.status, ClaimStatus::Redeemed);
        assert_eq!(claim.claim_type, ClaimType::Online);
        assert_eq!(claim.metadata.customer_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn unknown_status_is_a_backend_error() {
        let mut row = claim_row();
        row.status = "used".to_string();
        assert!(matches!(Claim::try_from(row), Err(StoreError::Backend(_))));
    }

    #[test]
    fn negative_counter_is_rejected() {
        let row = OfferRow {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            title: "t".to_string(),
            discount_percentage: 10,
            discount_code: None,
            start_date: Utc::now(),
            expiry_date: Utc::now(),
            is_active: true,
            max_claims: Some(3),
            current_claims: -1,
            created_at: Utc::now(),
        };
        assert!(Offer::try_from(row).is_err());
    }
}
