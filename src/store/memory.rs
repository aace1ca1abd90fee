//! In-memory backend with per-offer fine-grained locking.
//!
//! Offers live in a `RwLock<HashMap<..>>` where each entry is individually
//! protected by a [`tokio::sync::Mutex`]. Claims and their two unique
//! indexes live behind one `RwLock`.
//!
//! # Lock order
//!
//! Offer entry mutex first, then the claim tables. Read paths that need
//! both snapshot the claims, release the tables, and only then look at
//! offers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{
    Admission, ClaimLedger, ClaimRecord, OfferRegistry, Reservation, StoreError, Transition,
};
use crate::domain::{
    BusinessId, Claim, ClaimId, ClaimIdentifier, ClaimScope, ClaimStatus, CustomerId, NewClaim,
    Offer, OfferId, Page, PageRequest, RedemptionCode, effective_status,
};

#[derive(Debug, Default)]
struct ClaimTables {
    by_id: HashMap<ClaimId, Claim>,
    by_pair: HashMap<(CustomerId, OfferId), ClaimId>,
    by_code: HashMap<RedemptionCode, ClaimId>,
}

impl ClaimTables {
    fn existing_for(&self, customer_id: CustomerId, offer_id: OfferId) -> Option<&Claim> {
        self.by_pair
            .get(&(customer_id, offer_id))
            .and_then(|id| self.by_id.get(id))
    }

    fn check_unique(&self, new_claim: &NewClaim) -> Result<(), StoreError> {
        if self
            .by_pair
            .contains_key(&(new_claim.customer_id, new_claim.offer_id))
        {
            return Err(StoreError::DuplicateClaim);
        }
        if self.by_code.contains_key(&new_claim.redemption_code) {
            return Err(StoreError::CodeCollision);
        }
        Ok(())
    }

    fn insert(&mut self, claim: Claim) -> Claim {
        self.by_pair
            .insert((claim.customer_id, claim.offer_id), claim.id);
        self.by_code.insert(claim.redemption_code.clone(), claim.id);
        self.by_id.insert(claim.id, claim.clone());
        claim
    }

    fn transition(&mut self, claim_id: ClaimId, apply: impl FnOnce(&mut Claim)) -> Transition {
        match self.by_id.get_mut(&claim_id) {
            None => Transition::NotFound,
            Some(claim) if claim.status != ClaimStatus::Active => {
                Transition::Rejected(claim.clone())
            }
            Some(claim) => {
                apply(claim);
                Transition::Applied(claim.clone())
            }
        }
    }
}

/// Grants one unit on a locked offer. Returns the new counter on success.
fn reserve(offer: &mut Offer) -> Option<u32> {
    if !offer.has_capacity() {
        return None;
    }
    offer.current_claims = offer.current_claims.checked_add(1)?;
    Some(offer.current_claims)
}

/// Process-local store for offers and claims.
#[derive(Debug, Default)]
pub struct MemoryStore {
    offers: RwLock<HashMap<OfferId, Arc<Mutex<Offer>>>>,
    claims: RwLock<ClaimTables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn offer_entry(&self, offer_id: OfferId) -> Option<Arc<Mutex<Offer>>> {
        self.offers.read().await.get(&offer_id).map(Arc::clone)
    }

    async fn offer_snapshot(&self, offer_id: OfferId) -> Option<Offer> {
        let entry = self.offer_entry(offer_id).await?;
        let offer = entry.lock().await;
        Some(offer.clone())
    }

    /// Joins claims with their offers. Claims whose offer vanished are skipped.
    async fn attach_offers(&self, claims: Vec<Claim>) -> Vec<ClaimRecord> {
        let mut cache: HashMap<OfferId, Option<Offer>> = HashMap::new();
        let mut records = Vec::with_capacity(claims.len());
        for claim in claims {
            let offer = match cache.get(&claim.offer_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self.offer_snapshot(claim.offer_id).await;
                    cache.insert(claim.offer_id, fetched.clone());
                    fetched
                }
            };
            if let Some(offer) = offer {
                records.push(ClaimRecord {
                    claim,
                    business_id: offer.business_id,
                    offer_title: offer.title,
                    offer_expiry: offer.expiry_date,
                });
            }
        }
        records
    }

    async fn business_offer_ids(&self, business_id: BusinessId) -> Vec<OfferId> {
        let entries: Vec<Arc<Mutex<Offer>>> =
            self.offers.read().await.values().map(Arc::clone).collect();
        let mut ids = Vec::new();
        for entry in entries {
            let offer = entry.lock().await;
            if offer.business_id == business_id {
                ids.push(offer.id);
            }
        }
        ids
    }
}

#[async_trait]
impl OfferRegistry for MemoryStore {
    async fn insert_offer(&self, offer: Offer) -> Result<Offer, StoreError> {
        let mut map = self.offers.write().await;
        if map.contains_key(&offer.id) {
            return Err(StoreError::Backend(format!("offer {} already exists", offer.id)));
        }
        map.insert(offer.id, Arc::new(Mutex::new(offer.clone())));
        Ok(offer)
    }

    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self.offer_snapshot(offer_id).await)
    }

    async fn set_active(
        &self,
        offer_id: OfferId,
        is_active: bool,
    ) -> Result<Option<Offer>, StoreError> {
        let Some(entry) = self.offer_entry(offer_id).await else {
            return Ok(None);
        };
        let mut offer = entry.lock().await;
        offer.is_active = is_active;
        Ok(Some(offer.clone()))
    }

    async fn list_offers(&self, business_id: BusinessId) -> Result<Vec<Offer>, StoreError> {
        let entries: Vec<Arc<Mutex<Offer>>> =
            self.offers.read().await.values().map(Arc::clone).collect();
        let mut offers = Vec::new();
        for entry in entries {
            let offer = entry.lock().await;
            if offer.business_id == business_id {
                offers.push(offer.clone());
            }
        }
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(offers)
    }

    async fn try_reserve_capacity(&self, offer_id: OfferId) -> Result<Reservation, StoreError> {
        let Some(entry) = self.offer_entry(offer_id).await else {
            return Ok(Reservation::NotFound);
        };
        let mut offer = entry.lock().await;
        Ok(match reserve(&mut offer) {
            Some(current_claims) => Reservation::Reserved { current_claims },
            None => Reservation::CapacityExceeded,
        })
    }
}

#[async_trait]
impl ClaimLedger for MemoryStore {
    async fn find_existing_claim(
        &self,
        customer_id: CustomerId,
        offer_id: OfferId,
    ) -> Result<Option<Claim>, StoreError> {
        let tables = self.claims.read().await;
        Ok(tables.existing_for(customer_id, offer_id).cloned())
    }

    async fn find_claim(&self, identifier: &ClaimIdentifier) -> Result<Option<Claim>, StoreError> {
        let tables = self.claims.read().await;
        let id = match identifier {
            ClaimIdentifier::Id(id) => Some(*id),
            ClaimIdentifier::Code(code) => tables.by_code.get(code).copied(),
        };
        Ok(id.and_then(|id| tables.by_id.get(&id)).cloned())
    }

    async fn create_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Claim, StoreError> {
        let mut tables = self.claims.write().await;
        tables.check_unique(&new_claim)?;
        Ok(tables.insert(Claim::from_new(new_claim, claimed_at)))
    }

    async fn admit_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Admission, StoreError> {
        let Some(entry) = self.offer_entry(new_claim.offer_id).await else {
            return Ok(Admission::OfferNotFound);
        };
        let mut offer = entry.lock().await;
        let mut tables = self.claims.write().await;

        if let Some(existing) = tables.existing_for(new_claim.customer_id, new_claim.offer_id) {
            return Ok(Admission::Duplicate(existing.clone()));
        }
        tables.check_unique(&new_claim)?;

        let Some(current_claims) = reserve(&mut offer) else {
            return Ok(Admission::CapacityExceeded);
        };
        let claim = tables.insert(Claim::from_new(new_claim, claimed_at));
        Ok(Admission::Created {
            claim,
            current_claims,
        })
    }

    async fn mark_redeemed(
        &self,
        claim_id: ClaimId,
        redeemed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Transition, StoreError> {
        let mut tables = self.claims.write().await;
        Ok(tables.transition(claim_id, |claim| {
            claim.status = ClaimStatus::Redeemed;
            claim.redeemed_at = Some(redeemed_at);
            claim.redemption_notes = notes;
        }))
    }

    async fn mark_expired(&self, claim_id: ClaimId) -> Result<Transition, StoreError> {
        let mut tables = self.claims.write().await;
        Ok(tables.transition(claim_id, |claim| {
            claim.status = ClaimStatus::Expired;
        }))
    }

    async fn list_claims(
        &self,
        scope: ClaimScope,
        status: Option<ClaimStatus>,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<ClaimRecord>, StoreError> {
        let offer_filter: Option<Vec<OfferId>> = match scope {
            ClaimScope::Customer(_) => None,
            ClaimScope::Business {
                offer_id: Some(offer_id),
                business_id,
            } => Some(
                self.business_offer_ids(business_id)
                    .await
                    .into_iter()
                    .filter(|id| *id == offer_id)
                    .collect(),
            ),
            ClaimScope::Business { business_id, .. } => {
                Some(self.business_offer_ids(business_id).await)
            }
        };

        let claims: Vec<Claim> = {
            let tables = self.claims.read().await;
            tables
                .by_id
                .values()
                .filter(|claim| match (&scope, &offer_filter) {
                    (ClaimScope::Customer(customer_id), _) => claim.customer_id == *customer_id,
                    (_, Some(ids)) => ids.contains(&claim.offer_id),
                    (_, None) => false,
                })
                .cloned()
                .collect()
        };

        let mut records: Vec<ClaimRecord> = self
            .attach_offers(claims)
            .await
            .into_iter()
            .filter(|record| {
                status.is_none_or(|wanted| {
                    effective_status(record.claim.status, record.offer_expiry, now) == wanted
                })
            })
            .collect();
        records.sort_by(|a, b| {
            b.claim
                .claimed_at
                .cmp(&a.claim.claimed_at)
                .then(a.claim.id.cmp(&b.claim.id))
        });

        let total = records.len() as u64;
        let items = records
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(Page {
            items,
            total,
            request: page,
        })
    }

    async fn claims_since(
        &self,
        business_id: BusinessId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRecord>, StoreError> {
        let offer_ids = self.business_offer_ids(business_id).await;
        let claims: Vec<Claim> = {
            let tables = self.claims.read().await;
            tables
                .by_id
                .values()
                .filter(|claim| offer_ids.contains(&claim.offer_id) && claim.claimed_at >= since)
                .cloned()
                .collect()
        };
        Ok(self.attach_offers(claims).await)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::offer::test_support::open_offer;
    use crate::domain::{ClaimMetadata, ClaimType, CodeGenerator, RandomCodeGenerator};

    async fn store_with_offer(max_claims: Option<u32>) -> (Arc<MemoryStore>, Offer) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let Ok(offer) = store
            .insert_offer(Offer::from_new(open_offer(now, max_claims), now))
            .await
        else {
            panic!("insert failed");
        };
        (store, offer)
    }

    fn new_claim(customer_id: CustomerId, offer_id: OfferId) -> NewClaim {
        NewClaim {
            customer_id,
            offer_id,
            redemption_code: RandomCodeGenerator.generate(),
            claim_type: ClaimType::InStore,
            verification_url: None,
            merchant_redirect_url: None,
            metadata: ClaimMetadata::default(),
        }
    }

    #[tokio::test]
    async fn reserve_capacity_stops_at_max() {
        let (store, offer) = store_with_offer(Some(2)).await;
        assert_eq!(
            store.try_reserve_capacity(offer.id).await,
            Ok(Reservation::Reserved { current_claims: 1 })
        );
        assert_eq!(
            store.try_reserve_capacity(offer.id).await,
            Ok(Reservation::Reserved { current_claims: 2 })
        );
        assert_eq!(
            store.try_reserve_capacity(offer.id).await,
            Ok(Reservation::CapacityExceeded)
        );
        assert_eq!(
            store.try_reserve_capacity(OfferId::new()).await,
            Ok(Reservation::NotFound)
        );

        let Ok(Some(stored)) = store.get_offer(offer.id).await else {
            panic!("offer vanished");
        };
        assert_eq!(stored.current_claims, 2);
    }

    #[tokio::test]
    async fn concurrent_reservations_against_capacity_one() {
        let (store, offer) = store_with_offer(Some(1)).await;
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_reserve_capacity(offer.id).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if let Ok(Ok(Reservation::Reserved { .. })) = handle.await {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn create_claim_enforces_both_unique_indexes() {
        let (store, offer) = store_with_offer(None).await;
        let customer = CustomerId::new();
        let first = new_claim(customer, offer.id);
        let code = first.redemption_code.clone();
        assert!(store.create_claim(first, Utc::now()).await.is_ok());

        let again = new_claim(customer, offer.id);
        assert_eq!(
            store.create_claim(again, Utc::now()).await,
            Err(StoreError::DuplicateClaim)
        );

        let mut colliding = new_claim(CustomerId::new(), offer.id);
        colliding.redemption_code = code;
        assert_eq!(
            store.create_claim(colliding, Utc::now()).await,
            Err(StoreError::CodeCollision)
        );
    }

    #[tokio::test]
    async fn admit_claim_duplicate_consumes_no_capacity() {
        let (store, offer) = store_with_offer(Some(5)).await;
        let customer = CustomerId::new();

        let Ok(Admission::Created { claim, current_claims }) =
            store.admit_claim(new_claim(customer, offer.id), Utc::now()).await
        else {
            panic!("expected creation");
        };
        assert_eq!(current_claims, 1);

        let Ok(Admission::Duplicate(existing)) =
            store.admit_claim(new_claim(customer, offer.id), Utc::now()).await
        else {
            panic!("expected duplicate");
        };
        assert_eq!(existing.id, claim.id);

        let Ok(Some(stored)) = store.get_offer(offer.id).await else {
            panic!("offer vanished");
        };
        assert_eq!(stored.current_claims, 1);
    }

    #[tokio::test]
    async fn admit_claim_code_collision_consumes_no_capacity() {
        let (store, offer) = store_with_offer(Some(5)).await;
        let first = new_claim(CustomerId::new(), offer.id);
        let code = first.redemption_code.clone();
        assert!(store.admit_claim(first, Utc::now()).await.is_ok());

        let mut second = new_claim(CustomerId::new(), offer.id);
        second.redemption_code = code;
        assert_eq!(
            store.admit_claim(second, Utc::now()).await,
            Err(StoreError::CodeCollision)
        );

        let Ok(Some(stored)) = store.get_offer(offer.id).await else {
            panic!("offer vanished");
        };
        assert_eq!(stored.current_claims, 1);
    }

    #[tokio::test]
    async fn admit_claim_reports_full_and_missing_offer() {
        let (store, offer) = store_with_offer(Some(0)).await;
        assert_eq!(
            store
                .admit_claim(new_claim(CustomerId::new(), offer.id), Utc::now())
                .await,
            Ok(Admission::CapacityExceeded)
        );
        assert_eq!(
            store
                .admit_claim(new_claim(CustomerId::new(), OfferId::new()), Utc::now())
                .await,
            Ok(Admission::OfferNotFound)
        );
    }

    #[tokio::test]
    async fn transitions_only_apply_to_active_claims() {
        let (store, offer) = store_with_offer(None).await;
        let Ok(claim) = store
            .create_claim(new_claim(CustomerId::new(), offer.id), Utc::now())
            .await
        else {
            panic!("create failed");
        };

        let Ok(Transition::Applied(redeemed)) = store
            .mark_redeemed(claim.id, Utc::now(), Some("till 2".into()))
            .await
        else {
            panic!("first redemption should apply");
        };
        assert_eq!(redeemed.status, ClaimStatus::Redeemed);
        assert_eq!(redeemed.redemption_notes.as_deref(), Some("till 2"));

        assert!(matches!(
            store.mark_redeemed(claim.id, Utc::now(), None).await,
            Ok(Transition::Rejected(_))
        ));
        let Ok(Transition::Rejected(unchanged)) = store.mark_expired(claim.id).await else {
            panic!("expiry must not override a redemption");
        };
        assert_eq!(unchanged.status, ClaimStatus::Redeemed);
        assert_eq!(
            store.mark_expired(ClaimId::new()).await,
            Ok(Transition::NotFound)
        );
    }

    #[tokio::test]
    async fn find_claim_by_id_and_code() {
        let (store, offer) = store_with_offer(None).await;
        let Ok(claim) = store
            .create_claim(new_claim(CustomerId::new(), offer.id), Utc::now())
            .await
        else {
            panic!("create failed");
        };

        let by_id = store.find_claim(&ClaimIdentifier::Id(claim.id)).await;
        let by_code = store
            .find_claim(&ClaimIdentifier::Code(claim.redemption_code.clone()))
            .await;
        assert_eq!(by_id, Ok(Some(claim.clone())));
        assert_eq!(by_code, Ok(Some(claim)));
    }

    #[tokio::test]
    async fn list_claims_filters_on_effective_status() {
        let (store, offer) = store_with_offer(None).await;
        let customer = CustomerId::new();
        let Ok(claim) = store
            .create_claim(new_claim(customer, offer.id), Utc::now())
            .await
        else {
            panic!("create failed");
        };

        let scope = ClaimScope::Customer(customer);
        let page = PageRequest::default();
        let later = offer.expiry_date + Duration::days(1);

        let Ok(active_now) = store
            .list_claims(scope, Some(ClaimStatus::Active), Utc::now(), page)
            .await
        else {
            panic!("list failed");
        };
        assert_eq!(active_now.total, 1);

        let Ok(expired_later) = store
            .list_claims(scope, Some(ClaimStatus::Expired), later, page)
            .await
        else {
            panic!("list failed");
        };
        assert_eq!(expired_later.total, 1);
        assert!(
            expired_later
                .items
                .iter()
                .all(|record| record.claim.id == claim.id)
        );

        let business_scope = ClaimScope::Business {
            business_id: offer.business_id,
            offer_id: None,
        };
        let Ok(for_business) = store.list_claims(business_scope, None, later, page).await else {
            panic!("list failed");
        };
        assert_eq!(for_business.total, 1);

        let other_business = ClaimScope::Business {
            business_id: BusinessId::new(),
            offer_id: None,
        };
        let Ok(none) = store.list_claims(other_business, None, later, page).await else {
            panic!("list failed");
        };
        assert_eq!(none.total, 0);
    }
}
