//! Domain events reflecting offer and claim state transitions.
//!
//! Every committed transition emits a [`ClaimEvent`] through the
//! [`super::EventBus`]. When persistence is enabled the events are also
//! appended to the `claim_events` audit table.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BusinessId, ClaimId, ClaimType, CustomerId, OfferId};

/// Domain event emitted after a committed state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ClaimEvent {
    /// A business published an offer.
    OfferCreated {
        /// Offer identifier.
        offer_id: OfferId,
        /// Owning business.
        business_id: BusinessId,
        /// Capacity limit, if any.
        max_claims: Option<u32>,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A business flipped an offer's kill switch.
    OfferStatusChanged {
        /// Offer identifier.
        offer_id: OfferId,
        /// New kill-switch state.
        is_active: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A new claim was admitted and a capacity unit consumed.
    ClaimCreated {
        /// Offer identifier.
        offer_id: OfferId,
        /// Claim identifier.
        claim_id: ClaimId,
        /// Claiming customer.
        customer_id: CustomerId,
        /// In-store or online.
        claim_type: ClaimType,
        /// Offer counter after the reservation.
        current_claims: u32,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A business redeemed a claim.
    ClaimRedeemed {
        /// Offer identifier.
        offer_id: OfferId,
        /// Claim identifier.
        claim_id: ClaimId,
        /// Redeeming business.
        business_id: BusinessId,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A claim's expired status was written back.
    ClaimExpired {
        /// Offer identifier.
        offer_id: OfferId,
        /// Claim identifier.
        claim_id: ClaimId,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ClaimEvent {
    /// Returns the offer this event concerns.
    #[must_use]
    pub const fn offer_id(&self) -> OfferId {
        match self {
            Self::OfferCreated { offer_id, .. }
            | Self::OfferStatusChanged { offer_id, .. }
            | Self::ClaimCreated { offer_id, .. }
            | Self::ClaimRedeemed { offer_id, .. }
            | Self::ClaimExpired { offer_id, .. } => *offer_id,
        }
    }

    /// Returns the claim this event concerns, if it is claim-scoped.
    #[must_use]
    pub const fn claim_id(&self) -> Option<ClaimId> {
        match self {
            Self::ClaimCreated { claim_id, .. }
            | Self::ClaimRedeemed { claim_id, .. }
            | Self::ClaimExpired { claim_id, .. } => Some(*claim_id),
            Self::OfferCreated { .. } | Self::OfferStatusChanged { .. } => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::OfferCreated { .. } => "offer_created",
            Self::OfferStatusChanged { .. } => "offer_status_changed",
            Self::ClaimCreated { .. } => "claim_created",
            Self::ClaimRedeemed { .. } => "claim_redeemed",
            Self::ClaimExpired { .. } => "claim_expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_created_serializes_with_tag() {
        let event = ClaimEvent::ClaimCreated {
            offer_id: OfferId::new(),
            claim_id: ClaimId::new(),
            customer_id: CustomerId::new(),
            claim_type: ClaimType::InStore,
            current_claims: 3,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"claim_created\""));
        assert!(json.contains("\"claim_type\":\"in_store\""));
        assert_eq!(event.event_type_str(), "claim_created");
    }

    #[test]
    fn accessors() {
        let offer_id = OfferId::new();
        let event = ClaimEvent::OfferStatusChanged {
            offer_id,
            is_active: false,
            timestamp: Utc::now(),
        };
        assert_eq!(event.offer_id(), offer_id);
        assert_eq!(event.claim_id(), None);
    }
}
