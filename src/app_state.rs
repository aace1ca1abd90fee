//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::domain::{Clock, CodeGenerator, EventBus, RandomCodeGenerator, SystemClock};
use crate::service::{
    ClaimAdmissionService, ClaimQueryService, OfferService, RedemptionService, RetryPolicy,
    StatusProjector,
};
use crate::store::memory::MemoryStore;
use crate::store::{ClaimLedger, OfferRegistry};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Offer management.
    pub offers: Arc<OfferService>,
    /// Claim admission.
    pub admission: Arc<ClaimAdmissionService>,
    /// Verification, redemption and stats.
    pub redemption: Arc<RedemptionService>,
    /// Claim listings.
    pub queries: Arc<ClaimQueryService>,
    /// Domain event bus.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires every service over the given backends.
    #[must_use]
    pub fn new(
        offers: Arc<dyn OfferRegistry>,
        ledger: Arc<dyn ClaimLedger>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        config: &GatewayConfig,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let retry = RetryPolicy::from_config(config);
        let projector = StatusProjector::new(
            Arc::clone(&ledger),
            Arc::clone(&clock),
            event_bus.clone(),
            config.expiry_writeback_enabled,
        );

        Self {
            offers: Arc::new(OfferService::new(
                Arc::clone(&offers),
                Arc::clone(&clock),
                event_bus.clone(),
                retry,
            )),
            admission: Arc::new(ClaimAdmissionService::new(
                Arc::clone(&offers),
                Arc::clone(&ledger),
                codes,
                clock,
                event_bus.clone(),
                retry,
                config.code_generation_attempts,
                config.verification_base_url.clone(),
            )),
            redemption: Arc::new(RedemptionService::new(
                offers,
                Arc::clone(&ledger),
                projector.clone(),
                event_bus.clone(),
                retry,
            )),
            queries: Arc::new(ClaimQueryService::new(ledger, projector, retry)),
            event_bus,
        }
    }

    /// State over a fresh [`MemoryStore`] with the system clock and
    /// random codes.
    #[must_use]
    pub fn in_memory(config: &GatewayConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            Arc::clone(&store) as Arc<dyn OfferRegistry>,
            store,
            Arc::new(SystemClock),
            Arc::new(RandomCodeGenerator),
            config,
        )
    }
}
