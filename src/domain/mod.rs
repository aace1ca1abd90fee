//! Domain layer: identifiers, offers, claims, codes, time, and events.
//!
//! Everything here is storage-agnostic. The capacity and uniqueness
//! invariants are enforced by the stores in [`crate::store`]; this module
//! only defines the records and the pure rules over them.

pub mod claim;
pub mod claim_event;
pub mod clock;
pub mod event_bus;
pub mod ids;
pub mod offer;
pub mod page;
pub mod redemption_code;
pub mod status;

pub use claim::{Claim, ClaimMetadata, ClaimScope, ClaimStatus, ClaimType, NewClaim};
pub use claim_event::ClaimEvent;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_bus::EventBus;
pub use ids::{BusinessId, ClaimId, CustomerId, OfferId, ProductId};
pub use offer::{NewOffer, Offer, OfferWindow};
pub use page::{Page, PageRequest};
pub use redemption_code::{ClaimIdentifier, CodeGenerator, RandomCodeGenerator, RedemptionCode};
pub use status::effective_status;
