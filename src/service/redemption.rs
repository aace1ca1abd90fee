//! Redemption: verify a claim, then redeem it, plus redemption stats.
//!
//! Verification is read-only so a business UI can show the claim before
//! committing. Redemption re-validates everything and relies on the
//! ledger's guarded `active -> redeemed` write, never on an earlier
//! verification result.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{
    BusinessId, Claim, ClaimEvent, ClaimIdentifier, ClaimStatus, ClaimType, EventBus, Offer,
};
use crate::error::GatewayError;
use crate::service::{RetryPolicy, StatusProjector};
use crate::store::{ClaimLedger, OfferRegistry, Transition};

/// Why a claim failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The identifier resolves to no claim.
    ClaimNotFound,
    /// The claim belongs to another business's offer.
    UnauthorizedBusiness,
    /// The claim was already used.
    AlreadyRedeemed {
        /// The redeemed claim.
        claim: Claim,
    },
    /// The parent offer expired before redemption.
    OfferExpired {
        /// The expired claim.
        claim: Claim,
        /// Offer expiry.
        expiry_date: DateTime<Utc>,
    },
}

impl VerificationFailure {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ClaimNotFound => "CLAIM_NOT_FOUND",
            Self::UnauthorizedBusiness => "UNAUTHORIZED_BUSINESS",
            Self::AlreadyRedeemed { .. } => "ALREADY_REDEEMED",
            Self::OfferExpired { .. } => "OFFER_EXPIRED",
        }
    }

    /// Message suitable for the redemption screen.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ClaimNotFound => "Claim not found",
            Self::UnauthorizedBusiness => "This claim belongs to a different business",
            Self::AlreadyRedeemed { .. } => "This offer has already been redeemed",
            Self::OfferExpired { .. } => "This offer has expired",
        }
    }
}

/// Outcome of [`RedemptionService::verify_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The claim can be redeemed now.
    Valid {
        /// The claim, with its effective status.
        claim: Claim,
        /// Its parent offer.
        offer: Offer,
    },
    /// The claim cannot be redeemed.
    Invalid(VerificationFailure),
}

/// Claim counts per claim type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClaimTypeCounts {
    /// In-store claims.
    pub in_store: u64,
    /// Online claims.
    pub online: u64,
}

/// Claims and redemptions made on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyCount {
    /// The day.
    pub date: NaiveDate,
    /// Claims made that day.
    pub claims: u64,
    /// Of those, how many are redeemed.
    pub redemptions: u64,
}

/// Redemption statistics over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RedemptionStats {
    /// Window length in days.
    pub period_days: u32,
    /// Window start.
    pub since: DateTime<Utc>,
    /// Window end (now).
    pub until: DateTime<Utc>,
    /// Claims made in the window.
    pub total_claims: u64,
    /// Of those, redeemed.
    pub redeemed: u64,
    /// Of those, still redeemable.
    pub pending: u64,
    /// Of those, expired unredeemed.
    pub expired: u64,
    /// `redeemed / total_claims` in percent, one decimal place.
    pub redemption_rate: f64,
    /// Split by claim type.
    pub claim_types: ClaimTypeCounts,
    /// Per-day counts for the last `min(7, period_days)` days, oldest first.
    pub daily: Vec<DailyCount>,
}

/// Default stats window.
pub const DEFAULT_STATS_DAYS: u32 = 30;
/// Longest stats window.
pub const MAX_STATS_DAYS: u32 = 365;
const DAILY_BREAKDOWN_DAYS: u32 = 7;

/// Orchestrates verification and redemption for a business.
#[derive(Debug, Clone)]
pub struct RedemptionService {
    offers: Arc<dyn OfferRegistry>,
    ledger: Arc<dyn ClaimLedger>,
    projector: StatusProjector,
    event_bus: EventBus,
    retry: RetryPolicy,
}

impl RedemptionService {
    /// Creates a new `RedemptionService`.
    #[must_use]
    pub fn new(
        offers: Arc<dyn OfferRegistry>,
        ledger: Arc<dyn ClaimLedger>,
        projector: StatusProjector,
        event_bus: EventBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            offers,
            ledger,
            projector,
            event_bus,
            retry,
        }
    }

    async fn resolve(
        &self,
        identifier: &ClaimIdentifier,
    ) -> Result<Option<(Claim, Offer)>, GatewayError> {
        let Some(claim) = self
            .retry
            .run("find_claim", || self.ledger.find_claim(identifier))
            .await?
        else {
            return Ok(None);
        };
        let offer_id = claim.offer_id;
        let offer = self
            .retry
            .run("get_offer", || self.offers.get_offer(offer_id))
            .await?
            .ok_or_else(|| GatewayError::OfferNotFound(offer_id.into()))?;
        Ok(Some((claim, offer)))
    }

    /// Checks whether `raw_identifier` names a claim this business can
    /// redeem right now. Never writes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for a blank identifier and
    /// storage errors. Business outcomes are reported in the
    /// [`Verification`], not as errors.
    pub async fn verify_claim(
        &self,
        business_id: BusinessId,
        raw_identifier: &str,
    ) -> Result<Verification, GatewayError> {
        if raw_identifier.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "claim identifier is required".to_string(),
            ));
        }
        let Ok(identifier) = ClaimIdentifier::parse(raw_identifier) else {
            return Ok(Verification::Invalid(VerificationFailure::ClaimNotFound));
        };
        let Some((mut claim, offer)) = self.resolve(&identifier).await? else {
            return Ok(Verification::Invalid(VerificationFailure::ClaimNotFound));
        };
        if offer.business_id != business_id {
            return Ok(Verification::Invalid(
                VerificationFailure::UnauthorizedBusiness,
            ));
        }

        claim.status = self.projector.project(&claim, offer.expiry_date);
        Ok(match claim.status {
            ClaimStatus::Redeemed => {
                Verification::Invalid(VerificationFailure::AlreadyRedeemed { claim })
            }
            ClaimStatus::Expired => Verification::Invalid(VerificationFailure::OfferExpired {
                claim,
                expiry_date: offer.expiry_date,
            }),
            ClaimStatus::Active => Verification::Valid { claim, offer },
        })
    }

    /// Redeems a claim on behalf of the owning business.
    ///
    /// Blank `notes` are replaced by `"Redeemed by business {id}"`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ClaimNotFound`] if the identifier resolves to no claim.
    /// - [`GatewayError::UnauthorizedBusiness`] if the offer belongs to
    ///   another business.
    /// - [`GatewayError::AlreadyRedeemed`] if the claim was redeemed,
    ///   including by a concurrent call that won the race.
    /// - [`GatewayError::OfferExpired`] if the offer's expiry has passed.
    pub async fn redeem_claim(
        &self,
        business_id: BusinessId,
        raw_identifier: &str,
        notes: Option<String>,
    ) -> Result<Claim, GatewayError> {
        let identifier = ClaimIdentifier::parse(raw_identifier)?;
        let Some((claim, offer)) = self.resolve(&identifier).await? else {
            return Err(GatewayError::ClaimNotFound(raw_identifier.trim().to_string()));
        };
        if offer.business_id != business_id {
            tracing::warn!(
                %business_id,
                claim_id = %claim.id,
                "redemption attempted by a foreign business"
            );
            return Err(GatewayError::UnauthorizedBusiness);
        }

        let claim = self.projector.observe(claim, offer.expiry_date);
        match claim.status {
            ClaimStatus::Redeemed => {
                return Err(GatewayError::AlreadyRedeemed {
                    redeemed_at: claim.redeemed_at,
                });
            }
            ClaimStatus::Expired => {
                return Err(GatewayError::OfferExpired {
                    expiry_date: offer.expiry_date,
                });
            }
            ClaimStatus::Active => {}
        }

        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Redeemed by business {business_id}"));
        let redeemed_at = self.projector.now();
        let claim_id = claim.id;

        let transition = self
            .retry
            .run("mark_redeemed", || {
                self.ledger
                    .mark_redeemed(claim_id, redeemed_at, Some(notes.clone()))
            })
            .await?;

        match transition {
            Transition::Applied(redeemed) => {
                let _ = self.event_bus.publish(ClaimEvent::ClaimRedeemed {
                    offer_id: redeemed.offer_id,
                    claim_id,
                    business_id,
                    timestamp: redeemed_at,
                });
                tracing::info!(
                    %claim_id,
                    %business_id,
                    offer_id = %redeemed.offer_id,
                    "claim redeemed"
                );
                Ok(redeemed)
            }
            Transition::Rejected(current) if current.status == ClaimStatus::Redeemed => {
                tracing::debug!(%claim_id, "lost redemption race");
                Err(GatewayError::AlreadyRedeemed {
                    redeemed_at: current.redeemed_at,
                })
            }
            Transition::Rejected(_) => Err(GatewayError::OfferExpired {
                expiry_date: offer.expiry_date,
            }),
            Transition::NotFound => Err(GatewayError::ClaimNotFound(claim_id.to_string())),
        }
    }

    /// Summarizes claims made against the business's offers over the
    /// last `days` days.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `days` is outside
    /// `1..=365`, or a storage error.
    pub async fn redemption_stats(
        &self,
        business_id: BusinessId,
        days: u32,
    ) -> Result<RedemptionStats, GatewayError> {
        if !(1..=MAX_STATS_DAYS).contains(&days) {
            return Err(GatewayError::InvalidRequest(format!(
                "days must be between 1 and {MAX_STATS_DAYS}, got {days}"
            )));
        }
        let until = self.projector.now();
        let since = until - Duration::days(i64::from(days));
        let records = self
            .retry
            .run("claims_since", || self.ledger.claims_since(business_id, since))
            .await?;

        let mut stats = RedemptionStats {
            period_days: days,
            since,
            until,
            total_claims: 0,
            redeemed: 0,
            pending: 0,
            expired: 0,
            redemption_rate: 0.0,
            claim_types: ClaimTypeCounts::default(),
            daily: daily_buckets(until, days),
        };

        for record in &records {
            let status = self.projector.project(&record.claim, record.offer_expiry);
            stats.total_claims += 1;
            match status {
                ClaimStatus::Redeemed => stats.redeemed += 1,
                ClaimStatus::Active => stats.pending += 1,
                ClaimStatus::Expired => stats.expired += 1,
            }
            match record.claim.claim_type {
                ClaimType::InStore => stats.claim_types.in_store += 1,
                ClaimType::Online => stats.claim_types.online += 1,
            }
            let day = record.claim.claimed_at.date_naive();
            if let Some(bucket) = stats.daily.iter_mut().find(|b| b.date == day) {
                bucket.claims += 1;
                if status == ClaimStatus::Redeemed {
                    bucket.redemptions += 1;
                }
            }
        }
        stats.redemption_rate = redemption_rate(stats.redeemed, stats.total_claims);
        Ok(stats)
    }
}

/// Percentage rounded to one decimal place.
#[allow(clippy::cast_precision_loss)]
fn redemption_rate(redeemed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (redeemed as f64 / total as f64 * 1000.0).round() / 10.0
}

fn daily_buckets(until: DateTime<Utc>, days: u32) -> Vec<DailyCount> {
    let today = until.date_naive();
    (0..days.min(DAILY_BREAKDOWN_DAYS))
        .rev()
        .filter_map(|offset| today.checked_sub_signed(Duration::days(i64::from(offset))))
        .map(|date| DailyCount {
            date,
            claims: 0,
            redemptions: 0,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use futures_util::future::join_all;

    use super::*;
    use crate::domain::offer::test_support::open_offer;
    use crate::domain::{
        ClaimMetadata, Clock, CustomerId, ManualClock, OfferId, RandomCodeGenerator, RedemptionCode,
    };
    use crate::service::{ClaimAdmissionService, ClaimRequest};
    use crate::store::memory::MemoryStore;
    use crate::store::test_support::ExpiryTimeoutLedger;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        admission: ClaimAdmissionService,
        service: RedemptionService,
    }

    fn harness() -> Harness {
        harness_over(|store| store as Arc<dyn ClaimLedger>, EventBus::new(256))
    }

    fn harness_over(
        ledger: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn ClaimLedger>,
        bus: EventBus,
    ) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let offers = Arc::clone(&store) as Arc<dyn OfferRegistry>;
        let ledger = ledger(Arc::clone(&store));
        let dyn_clock = Arc::clone(&clock) as Arc<dyn Clock>;
        let admission = ClaimAdmissionService::new(
            Arc::clone(&offers),
            Arc::clone(&ledger),
            Arc::new(RandomCodeGenerator),
            Arc::clone(&dyn_clock),
            bus.clone(),
            RetryPolicy::default(),
            10,
            "https://deals.example".to_string(),
        );
        let projector = StatusProjector::new(Arc::clone(&ledger), dyn_clock, bus.clone(), true);
        let service =
            RedemptionService::new(offers, ledger, projector, bus, RetryPolicy::default());
        Harness {
            store,
            clock,
            admission,
            service,
        }
    }

    impl Harness {
        async fn offer(&self, max_claims: Option<u32>) -> Offer {
            let now = self.clock.now();
            let Ok(offer) = self
                .store
                .insert_offer(Offer::from_new(open_offer(now, max_claims), now))
                .await
            else {
                panic!("insert failed");
            };
            offer
        }

        async fn claim(&self, offer_id: OfferId) -> Result<Claim, GatewayError> {
            self.admission
                .claim_offer(ClaimRequest {
                    customer_id: CustomerId::new(),
                    offer_id,
                    claim_type: ClaimType::InStore,
                    merchant_redirect_url: None,
                    metadata: ClaimMetadata::default(),
                })
                .await
                .map(|outcome| outcome.claim)
        }
    }

    #[tokio::test]
    async fn single_unit_offer_scenario() {
        let h = harness();
        let offer = h.offer(Some(1)).await;

        let Ok(claim_a) = h.claim(offer.id).await else {
            panic!("customer A should get the last unit");
        };
        assert!(RedemptionCode::parse(claim_a.redemption_code.as_str()).is_some());
        let Ok(Some(stored)) = h.store.get_offer(offer.id).await else {
            panic!("offer vanished");
        };
        assert_eq!(stored.current_claims, 1);

        let claim_b = h.claim(offer.id).await;
        assert!(matches!(claim_b, Err(GatewayError::OfferFull(_))));

        let Ok(redeemed) = h
            .service
            .redeem_claim(offer.business_id, claim_a.redemption_code.as_str(), None)
            .await
        else {
            panic!("redemption failed");
        };
        assert_eq!(redeemed.status, ClaimStatus::Redeemed);
        assert_eq!(
            redeemed.redemption_notes,
            Some(format!("Redeemed by business {}", offer.business_id))
        );

        let again = h
            .service
            .redeem_claim(offer.business_id, &claim_a.id.to_string(), Some("again".into()))
            .await;
        assert!(matches!(
            again,
            Err(GatewayError::AlreadyRedeemed {
                redeemed_at: Some(_)
            })
        ));
    }

    #[tokio::test]
    async fn concurrent_redemptions_succeed_once() {
        let h = harness();
        let offer = h.offer(None).await;
        let Ok(claim) = h.claim(offer.id).await else {
            panic!("claim failed");
        };
        let service = Arc::new(h.service.clone());

        let tasks = (0..2).map(|i| {
            let service = Arc::clone(&service);
            let code = claim.redemption_code.clone();
            let business_id = offer.business_id;
            tokio::spawn(async move {
                service
                    .redeem_claim(business_id, code.as_str(), Some(format!("device {i}")))
                    .await
            })
        });
        let mut ok = 0;
        let mut already = 0;
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(_)) => ok += 1,
                Ok(Err(GatewayError::AlreadyRedeemed { .. })) => already += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((ok, already), (1, 1));
    }

    #[tokio::test]
    async fn foreign_business_cannot_redeem_or_verify() {
        let h = harness();
        let offer = h.offer(None).await;
        let Ok(claim) = h.claim(offer.id).await else {
            panic!("claim failed");
        };
        let intruder = BusinessId::new();

        let redeem = h
            .service
            .redeem_claim(intruder, claim.redemption_code.as_str(), None)
            .await;
        assert!(matches!(redeem, Err(GatewayError::UnauthorizedBusiness)));

        let Ok(Verification::Invalid(failure)) = h
            .service
            .verify_claim(intruder, claim.redemption_code.as_str())
            .await
        else {
            panic!("verification should fail");
        };
        assert_eq!(failure.code(), "UNAUTHORIZED_BUSINESS");
    }

    #[tokio::test]
    async fn expired_offer_blocks_redemption() {
        let h = harness();
        let offer = h.offer(None).await;
        let Ok(claim) = h.claim(offer.id).await else {
            panic!("claim failed");
        };
        h.clock.set(offer.expiry_date + Duration::minutes(1));

        let Ok(Verification::Invalid(VerificationFailure::OfferExpired { expiry_date, .. })) = h
            .service
            .verify_claim(offer.business_id, claim.redemption_code.as_str())
            .await
        else {
            panic!("expected OFFER_EXPIRED");
        };
        assert_eq!(expiry_date, offer.expiry_date);

        let redeem = h
            .service
            .redeem_claim(offer.business_id, claim.redemption_code.as_str(), None)
            .await;
        assert!(matches!(redeem, Err(GatewayError::OfferExpired { .. })));
    }

    #[tokio::test]
    async fn expired_redemption_survives_failed_write_back() {
        let bus = EventBus::new(256);
        let h = harness_over(
            |store| Arc::new(ExpiryTimeoutLedger(store)) as Arc<dyn ClaimLedger>,
            bus.clone(),
        );
        let offer = h.offer(None).await;
        let Ok(claim) = h.claim(offer.id).await else {
            panic!("claim failed");
        };
        let mut rx = bus.subscribe();
        h.clock.set(offer.expiry_date + Duration::minutes(1));

        let redeem = h
            .service
            .redeem_claim(offer.business_id, claim.redemption_code.as_str(), None)
            .await;
        let Err(GatewayError::OfferExpired { expiry_date }) = redeem else {
            panic!("expected OfferExpired");
        };
        assert_eq!(expiry_date, offer.expiry_date);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );

        let Ok(Some(stored)) = h
            .store
            .find_claim(&ClaimIdentifier::Id(claim.id))
            .await
        else {
            panic!("claim vanished");
        };
        assert_eq!(stored.status, ClaimStatus::Active);
    }

    #[tokio::test]
    async fn verification_is_read_only_and_accepts_qr_content() {
        let h = harness();
        let offer = h.offer(None).await;
        let Ok(claim) = h.claim(offer.id).await else {
            panic!("claim failed");
        };
        let Some(url) = claim.verification_url.clone() else {
            panic!("in-store claim should carry a verification url");
        };

        for _ in 0..3 {
            let Ok(Verification::Valid { claim: seen, .. }) =
                h.service.verify_claim(offer.business_id, &url).await
            else {
                panic!("verification failed");
            };
            assert_eq!(seen.status, ClaimStatus::Active);
        }
        let Ok(Some(stored)) = h.store.find_claim(&ClaimIdentifier::Id(claim.id)).await else {
            panic!("claim vanished");
        };
        assert_eq!(stored.status, ClaimStatus::Active);
        assert!(stored.redeemed_at.is_none());
    }

    #[tokio::test]
    async fn verification_of_unknown_input_reports_not_found() {
        let h = harness();
        for raw in ["ZZZZ-ZZZZ-ZZZZ", "not a claim at all"] {
            let Ok(Verification::Invalid(failure)) =
                h.service.verify_claim(BusinessId::new(), raw).await
            else {
                panic!("expected CLAIM_NOT_FOUND for {raw}");
            };
            assert_eq!(failure, VerificationFailure::ClaimNotFound);
        }
        assert!(matches!(
            h.service.verify_claim(BusinessId::new(), "   ").await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn stats_count_effective_statuses() {
        let h = harness();
        let offer = h.offer(None).await;
        let mut claims = Vec::new();
        for _ in 0..4 {
            let Ok(claim) = h.claim(offer.id).await else {
                panic!("claim failed");
            };
            claims.push(claim);
        }
        for claim in claims.iter().take(3) {
            let Ok(_) = h
                .service
                .redeem_claim(offer.business_id, &claim.id.to_string(), None)
                .await
            else {
                panic!("redeem failed");
            };
        }

        let Ok(stats) = h.service.redemption_stats(offer.business_id, 30).await else {
            panic!("stats failed");
        };
        assert_eq!(stats.total_claims, 4);
        assert_eq!(stats.redeemed, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.expired, 0);
        assert!((stats.redemption_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.claim_types.in_store, 4);
        assert_eq!(stats.daily.len(), 7);
        let Some(today) = stats.daily.last() else {
            panic!("missing daily buckets");
        };
        assert_eq!((today.claims, today.redemptions), (4, 3));

        h.clock.set(offer.expiry_date + Duration::hours(1));
        let Ok(later) = h.service.redemption_stats(offer.business_id, 30).await else {
            panic!("stats failed");
        };
        assert_eq!((later.pending, later.expired), (0, 1));
    }

    #[tokio::test]
    async fn stats_reject_out_of_range_days() {
        let h = harness();
        for days in [0, 366] {
            let result = h.service.redemption_stats(BusinessId::new(), days).await;
            assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        }
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert!((redemption_rate(1, 3) - 33.3).abs() < 1e-9);
        assert!((redemption_rate(2, 3) - 66.7).abs() < 1e-9);
        assert!(redemption_rate(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn daily_buckets_are_oldest_first() {
        let now = Utc::now();
        let buckets = daily_buckets(now, 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.last().map(|b| b.date), Some(now.date_naive()));
        assert!(
            buckets
                .windows(2)
                .all(|pair| matches!(pair, [a, b] if a.date < b.date))
        );
    }
}
