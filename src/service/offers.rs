//! Offer management: create, inspect, toggle and list.

use std::sync::Arc;

use crate::domain::{BusinessId, ClaimEvent, Clock, EventBus, NewOffer, Offer, OfferId, OfferWindow};
use crate::error::GatewayError;
use crate::service::RetryPolicy;
use crate::store::OfferRegistry;

/// An offer together with its window state at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSnapshot {
    /// The stored offer.
    pub offer: Offer,
    /// Window state at the time of the read.
    pub window: OfferWindow,
}

/// Business-facing offer operations.
#[derive(Debug, Clone)]
pub struct OfferService {
    offers: Arc<dyn OfferRegistry>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    retry: RetryPolicy,
}

impl OfferService {
    /// Creates a new `OfferService`.
    #[must_use]
    pub fn new(
        offers: Arc<dyn OfferRegistry>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            offers,
            clock,
            event_bus,
            retry,
        }
    }

    fn snapshot(&self, offer: Offer) -> OfferSnapshot {
        let window = offer.window(self.clock.now());
        OfferSnapshot { offer, window }
    }

    /// Publishes a new offer with a zero claim counter.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if validation fails, or a
    /// storage error.
    pub async fn create_offer(&self, new_offer: NewOffer) -> Result<OfferSnapshot, GatewayError> {
        new_offer.validate()?;
        let now = self.clock.now();
        let offer = Offer::from_new(new_offer, now);
        let stored = self
            .retry
            .run("insert_offer", || self.offers.insert_offer(offer.clone()))
            .await?;

        let _ = self.event_bus.publish(ClaimEvent::OfferCreated {
            offer_id: stored.id,
            business_id: stored.business_id,
            max_claims: stored.max_claims,
            timestamp: now,
        });
        tracing::info!(
            offer_id = %stored.id,
            business_id = %stored.business_id,
            max_claims = ?stored.max_claims,
            "offer created"
        );
        Ok(self.snapshot(stored))
    }

    /// Loads one offer.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OfferNotFound`] if the offer does not exist.
    pub async fn get_offer(&self, offer_id: OfferId) -> Result<OfferSnapshot, GatewayError> {
        let offer = self
            .retry
            .run("get_offer", || self.offers.get_offer(offer_id))
            .await?
            .ok_or_else(|| GatewayError::OfferNotFound(offer_id.into()))?;
        Ok(self.snapshot(offer))
    }

    /// Flips an offer's kill switch. Only the owning business may do this.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::OfferNotFound`] if the offer does not exist.
    /// - [`GatewayError::UnauthorizedBusiness`] if it belongs to another
    ///   business.
    pub async fn set_active(
        &self,
        business_id: BusinessId,
        offer_id: OfferId,
        is_active: bool,
    ) -> Result<OfferSnapshot, GatewayError> {
        let current = self.get_offer(offer_id).await?;
        if current.offer.business_id != business_id {
            return Err(GatewayError::UnauthorizedBusiness);
        }
        let updated = self
            .retry
            .run("set_active", || self.offers.set_active(offer_id, is_active))
            .await?
            .ok_or_else(|| GatewayError::OfferNotFound(offer_id.into()))?;

        let _ = self.event_bus.publish(ClaimEvent::OfferStatusChanged {
            offer_id,
            is_active,
            timestamp: self.clock.now(),
        });
        tracing::info!(%offer_id, %business_id, is_active, "offer status changed");
        Ok(self.snapshot(updated))
    }

    /// Lists a business's offers, newest first, optionally restricted to
    /// one window state.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the registry stays unavailable.
    pub async fn list_offers(
        &self,
        business_id: BusinessId,
        window: Option<OfferWindow>,
    ) -> Result<Vec<OfferSnapshot>, GatewayError> {
        let offers = self
            .retry
            .run("list_offers", || self.offers.list_offers(business_id))
            .await?;
        Ok(offers
            .into_iter()
            .map(|offer| self.snapshot(offer))
            .filter(|snapshot| window.is_none_or(|w| snapshot.window == w))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::domain::ManualClock;
    use crate::domain::offer::test_support::open_offer;
    use crate::store::memory::MemoryStore;

    fn service() -> (OfferService, Arc<ManualClock>, EventBus) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let bus = EventBus::new(16);
        let service = OfferService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            bus.clone(),
            RetryPolicy::default(),
        );
        (service, clock, bus)
    }

    #[tokio::test]
    async fn create_validates_and_publishes() {
        let (service, clock, bus) = service();
        let mut rx = bus.subscribe();

        let mut bad = open_offer(clock.now(), Some(10));
        bad.discount_percentage = 0;
        assert!(matches!(
            service.create_offer(bad).await,
            Err(GatewayError::InvalidRequest(_))
        ));

        let Ok(created) = service.create_offer(open_offer(clock.now(), Some(10))).await else {
            panic!("create failed");
        };
        assert_eq!(created.window, OfferWindow::Active);
        assert_eq!(created.offer.current_claims, 0);
        assert_eq!(created.offer.remaining_claims(), Some(10));

        let Ok(ClaimEvent::OfferCreated { offer_id, .. }) = rx.recv().await else {
            panic!("expected OfferCreated");
        };
        assert_eq!(offer_id, created.offer.id);
    }

    #[tokio::test]
    async fn only_owner_can_toggle() {
        let (service, clock, _bus) = service();
        let Ok(created) = service.create_offer(open_offer(clock.now(), None)).await else {
            panic!("create failed");
        };
        let offer_id = created.offer.id;

        assert!(matches!(
            service.set_active(BusinessId::new(), offer_id, false).await,
            Err(GatewayError::UnauthorizedBusiness)
        ));

        let Ok(toggled) = service
            .set_active(created.offer.business_id, offer_id, false)
            .await
        else {
            panic!("toggle failed");
        };
        assert!(!toggled.offer.is_active);
        assert_eq!(toggled.window, OfferWindow::Inactive);
    }

    #[tokio::test]
    async fn list_filters_by_window() {
        let (service, clock, _bus) = service();
        let now = clock.now();
        let business_id = BusinessId::new();

        let mut upcoming = open_offer(now, None);
        upcoming.business_id = business_id;
        upcoming.start_date = now + Duration::days(2);
        upcoming.expiry_date = now + Duration::days(9);
        let mut active = open_offer(now, None);
        active.business_id = business_id;

        for new_offer in [upcoming, active] {
            let Ok(_) = service.create_offer(new_offer).await else {
                panic!("create failed");
            };
        }

        let Ok(all) = service.list_offers(business_id, None).await else {
            panic!("list failed");
        };
        assert_eq!(all.len(), 2);

        let Ok(only_upcoming) = service
            .list_offers(business_id, Some(OfferWindow::Upcoming))
            .await
        else {
            panic!("list failed");
        };
        assert_eq!(only_upcoming.len(), 1);

        clock.advance(Duration::days(30));
        let Ok(expired) = service
            .list_offers(business_id, Some(OfferWindow::Expired))
            .await
        else {
            panic!("list failed");
        };
        assert_eq!(expired.len(), 2);
    }

    #[tokio::test]
    async fn missing_offer_is_not_found() {
        let (service, _clock, _bus) = service();
        assert!(matches!(
            service.get_offer(OfferId::new()).await,
            Err(GatewayError::OfferNotFound(_))
        ));
    }
}
