//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers are exposed as plain UUIDs and timestamps as RFC 3339
//! strings.

pub mod claim_dto;
pub mod common_dto;
pub mod offer_dto;
pub mod redemption_dto;

pub use claim_dto::*;
pub use common_dto::*;
pub use offer_dto::*;
pub use redemption_dto::*;
