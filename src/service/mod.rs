//! Service layer: business logic orchestration.
//!
//! [`ClaimAdmissionService`] and [`RedemptionService`] own the two
//! write paths. [`StatusProjector`] derives effective claim status for
//! every read. All of them talk to storage through [`RetryPolicy`], which
//! bounds each call with a deadline and retries transient failures, and
//! publish committed transitions on the [`crate::domain::EventBus`].

pub mod admission;
pub mod offers;
pub mod queries;
pub mod redemption;
pub mod retry;
pub mod status;

pub use admission::{ClaimAdmissionService, ClaimOutcome, ClaimRequest};
pub use offers::{OfferService, OfferSnapshot};
pub use queries::ClaimQueryService;
pub use redemption::{
    ClaimTypeCounts, DailyCount, RedemptionService, RedemptionStats, Verification,
    VerificationFailure,
};
pub use retry::RetryPolicy;
pub use status::StatusProjector;
