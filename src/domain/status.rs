//! Effective claim status at read time.

use chrono::{DateTime, Utc};

use super::ClaimStatus;

/// Derives the status a claim should be shown with at `now`.
///
/// `Redeemed` is terminal and never overridden. Anything else reads as
/// `Expired` once `now` is past the offer's `expiry_date`, otherwise as
/// whatever was stored. A stored `Expired` stays expired even if the
/// offer's expiry was later pushed out.
#[must_use]
pub fn effective_status(
    stored: ClaimStatus,
    offer_expiry: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ClaimStatus {
    match stored {
        ClaimStatus::Redeemed => ClaimStatus::Redeemed,
        ClaimStatus::Expired => ClaimStatus::Expired,
        ClaimStatus::Active if now > offer_expiry => ClaimStatus::Expired,
        ClaimStatus::Active => ClaimStatus::Active,
    }
}
