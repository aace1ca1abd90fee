//! # offer-claim-gateway
//!
//! REST gateway for claiming and redeeming capacity-limited, time-boxed
//! discount offers.
//!
//! Businesses publish offers. Customers claim them, at most once each, and
//! receive a redemption code. Businesses verify and redeem that code in
//! store. Capacity is never oversold and a claim is redeemed at most once,
//! regardless of how many requests race.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers + identity extractors (api/)
//!     │
//!     ├── OfferService, ClaimAdmissionService,
//!     │   RedemptionService, ClaimQueryService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── OfferRegistry + ClaimLedger traits (store/)
//!     │
//!     └── MemoryStore | PgStore (+ claim_events audit log)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
