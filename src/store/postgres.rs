//! PostgreSQL backend using `sqlx::PgPool`.
//!
//! Capacity is guarded by a conditional `UPDATE` on the offer row, and
//! claim uniqueness by the `claims_customer_offer_key` and
//! `claims_redemption_code_key` constraints. [`PgStore::admit_claim`] runs
//! the claim insert and the capacity update in one transaction, so a
//! rejected insert never consumes a unit.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::models::{ClaimRecordRow, ClaimRow, OfferRow};
use super::{
    Admission, ClaimLedger, ClaimRecord, OfferRegistry, Reservation, StoreError, Transition,
};
use crate::config::GatewayConfig;
use crate::domain::{
    BusinessId, Claim, ClaimId, ClaimIdentifier, ClaimScope, ClaimStatus, CustomerId, NewClaim,
    Offer, OfferId, Page, PageRequest,
};

/// Unique constraint on `(customer_id, offer_id)`.
pub const CUSTOMER_OFFER_KEY: &str = "claims_customer_offer_key";
/// Unique constraint on `redemption_code`.
pub const REDEMPTION_CODE_KEY: &str = "claims_redemption_code_key";

const INSERT_CLAIM: &str = "INSERT INTO claims \
     (id, customer_id, offer_id, redemption_code, status, claim_type, claimed_at, \
      verification_url, merchant_redirect_url, customer_name, customer_email) \
     VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8, $9, $10) \
     RETURNING *";

const RESERVE_UNIT: &str = "UPDATE offers SET current_claims = current_claims + 1 \
     WHERE id = $1 AND (max_claims IS NULL OR current_claims < max_claims) \
     RETURNING current_claims";

const CLAIM_RECORD_SELECT: &str = "SELECT c.*, o.business_id, o.title AS offer_title, \
     o.expiry_date AS offer_expiry FROM claims c JOIN offers o ON o.id = c.offer_id";

/// Classifies a driver error.
///
/// Pool exhaustion is a timeout. Serialization failures (`40001`),
/// deadlocks (`40P01`), lock-not-available (`55P03`) and I/O errors are
/// contention. Everything else is a backend failure.
pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Io(_) => StoreError::Contention(err.to_string()),
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001" | "40P01" | "55P03")) =>
        {
            StoreError::Contention(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

/// How an insert into `claims` failed.
enum InsertFailure {
    Duplicate,
    CodeCollision,
    MissingOffer,
    Other(StoreError),
}

fn classify_insert(err: sqlx::Error) -> InsertFailure {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(CUSTOMER_OFFER_KEY) => InsertFailure::Duplicate,
                Some(REDEMPTION_CODE_KEY) => InsertFailure::CodeCollision,
                _ => InsertFailure::Other(map_sqlx(err)),
            };
        }
        if db.is_foreign_key_violation() {
            return InsertFailure::MissingOffer;
        }
    }
    InsertFailure::Other(map_sqlx(err))
}

fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("{field} out of range: {value}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Appends the scope and effective-status predicates for a claim listing.
///
/// An `active` row under an offer whose expiry has passed counts as
/// `expired`, matching [`crate::domain::effective_status`].
fn push_claim_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: ClaimScope,
    status: Option<ClaimStatus>,
    now: DateTime<Utc>,
) {
    match scope {
        ClaimScope::Customer(customer_id) => {
            builder
                .push(" WHERE c.customer_id = ")
                .push_bind(*customer_id.as_uuid());
        }
        ClaimScope::Business {
            business_id,
            offer_id,
        } => {
            builder
                .push(" WHERE o.business_id = ")
                .push_bind(*business_id.as_uuid());
            if let Some(offer_id) = offer_id {
                builder
                    .push(" AND c.offer_id = ")
                    .push_bind(*offer_id.as_uuid());
            }
        }
    }
    match status {
        None => {}
        Some(ClaimStatus::Redeemed) => {
            builder.push(" AND c.status = 'redeemed'");
        }
        Some(ClaimStatus::Active) => {
            builder
                .push(" AND c.status = 'active' AND o.expiry_date >= ")
                .push_bind(now);
        }
        Some(ClaimStatus::Expired) => {
            builder
                .push(" AND (c.status = 'expired' OR (c.status = 'active' AND o.expiry_date < ")
                .push_bind(now)
                .push("))");
        }
    }
}

/// PostgreSQL-backed offer registry and claim ledger.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database cannot be reached.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `./migrations`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("running database migrations");
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        tracing::info!("database migrations complete");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn claim_by_id(&self, claim_id: ClaimId) -> Result<Option<Claim>, StoreError> {
        sqlx::query_as::<_, ClaimRow>("SELECT * FROM claims WHERE id = $1")
            .bind(*claim_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(Claim::try_from)
            .transpose()
    }

    /// Resolves a guarded `UPDATE ... WHERE status = 'active'` result.
    async fn finish_transition(
        &self,
        claim_id: ClaimId,
        updated: Option<ClaimRow>,
    ) -> Result<Transition, StoreError> {
        if let Some(row) = updated {
            return Ok(Transition::Applied(Claim::try_from(row)?));
        }
        Ok(match self.claim_by_id(claim_id).await? {
            Some(claim) => Transition::Rejected(claim),
            None => Transition::NotFound,
        })
    }
}

fn bind_new_claim<'q>(
    query: sqlx::query::QueryAs<'q, Postgres, ClaimRow, sqlx::postgres::PgArguments>,
    new_claim: NewClaim,
    claim_id: Uuid,
    claimed_at: DateTime<Utc>,
) -> sqlx::query::QueryAs<'q, Postgres, ClaimRow, sqlx::postgres::PgArguments> {
    query
        .bind(claim_id)
        .bind(*new_claim.customer_id.as_uuid())
        .bind(*new_claim.offer_id.as_uuid())
        .bind(new_claim.redemption_code.into_inner())
        .bind(new_claim.claim_type.as_str())
        .bind(claimed_at)
        .bind(new_claim.verification_url)
        .bind(new_claim.merchant_redirect_url)
        .bind(new_claim.metadata.customer_name)
        .bind(new_claim.metadata.customer_email)
}

#[async_trait]
impl OfferRegistry for PgStore {
    async fn insert_offer(&self, offer: Offer) -> Result<Offer, StoreError> {
        let row = sqlx::query_as::<_, OfferRow>(
            "INSERT INTO offers (id, business_id, product_id, title, discount_percentage, \
             discount_code, start_date, expiry_date, is_active, max_claims, current_claims, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(*offer.id.as_uuid())
        .bind(*offer.business_id.as_uuid())
        .bind(*offer.product_id.as_uuid())
        .bind(&offer.title)
        .bind(i16::from(offer.discount_percentage))
        .bind(&offer.discount_code)
        .bind(offer.start_date)
        .bind(offer.expiry_date)
        .bind(offer.is_active)
        .bind(
            offer
                .max_claims
                .map(|max| to_i32(max, "max_claims"))
                .transpose()?,
        )
        .bind(to_i32(offer.current_claims, "current_claims")?)
        .bind(offer.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Offer::try_from(row)
    }

    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>, StoreError> {
        sqlx::query_as::<_, OfferRow>("SELECT * FROM offers WHERE id = $1")
            .bind(*offer_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(Offer::try_from)
            .transpose()
    }

    async fn set_active(
        &self,
        offer_id: OfferId,
        is_active: bool,
    ) -> Result<Option<Offer>, StoreError> {
        sqlx::query_as::<_, OfferRow>(
            "UPDATE offers SET is_active = $2 WHERE id = $1 RETURNING *",
        )
        .bind(*offer_id.as_uuid())
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Offer::try_from)
        .transpose()
    }

    async fn list_offers(&self, business_id: BusinessId) -> Result<Vec<Offer>, StoreError> {
        sqlx::query_as::<_, OfferRow>(
            "SELECT * FROM offers WHERE business_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(*business_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .into_iter()
        .map(Offer::try_from)
        .collect()
    }

    async fn try_reserve_capacity(&self, offer_id: OfferId) -> Result<Reservation, StoreError> {
        let updated = sqlx::query_scalar::<_, i32>(RESERVE_UNIT)
            .bind(*offer_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if let Some(current) = updated {
            let current_claims = u32::try_from(current)
                .map_err(|_| StoreError::Backend(format!("negative counter on {offer_id}")))?;
            return Ok(Reservation::Reserved { current_claims });
        }
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM offers WHERE id = $1)")
                .bind(*offer_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(if exists {
            Reservation::CapacityExceeded
        } else {
            Reservation::NotFound
        })
    }
}

#[async_trait]
impl ClaimLedger for PgStore {
    async fn find_existing_claim(
        &self,
        customer_id: CustomerId,
        offer_id: OfferId,
    ) -> Result<Option<Claim>, StoreError> {
        sqlx::query_as::<_, ClaimRow>(
            "SELECT * FROM claims WHERE customer_id = $1 AND offer_id = $2",
        )
        .bind(*customer_id.as_uuid())
        .bind(*offer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Claim::try_from)
        .transpose()
    }

    async fn find_claim(&self, identifier: &ClaimIdentifier) -> Result<Option<Claim>, StoreError> {
        match identifier {
            ClaimIdentifier::Id(id) => self.claim_by_id(*id).await,
            ClaimIdentifier::Code(code) => {
                sqlx::query_as::<_, ClaimRow>("SELECT * FROM claims WHERE redemption_code = $1")
                    .bind(code.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx)?
                    .map(Claim::try_from)
                    .transpose()
            }
        }
    }

    async fn create_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Claim, StoreError> {
        let offer_id = new_claim.offer_id;
        let query = sqlx::query_as::<_, ClaimRow>(INSERT_CLAIM);
        let row = bind_new_claim(query, new_claim, Uuid::new_v4(), claimed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match classify_insert(err) {
                InsertFailure::Duplicate => StoreError::DuplicateClaim,
                InsertFailure::CodeCollision => StoreError::CodeCollision,
                InsertFailure::MissingOffer => {
                    StoreError::Backend(format!("offer {offer_id} does not exist"))
                }
                InsertFailure::Other(e) => e,
            })?;
        Claim::try_from(row)
    }

    async fn admit_claim(
        &self,
        new_claim: NewClaim,
        claimed_at: DateTime<Utc>,
    ) -> Result<Admission, StoreError> {
        let customer_id = new_claim.customer_id;
        let offer_id = new_claim.offer_id;

        if let Some(existing) = self.find_existing_claim(customer_id, offer_id).await? {
            return Ok(Admission::Duplicate(existing));
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = sqlx::query_as::<_, ClaimRow>(INSERT_CLAIM);
        let inserted = bind_new_claim(query, new_claim, Uuid::new_v4(), claimed_at)
            .fetch_one(&mut *tx)
            .await;
        let row = match inserted {
            Ok(row) => row,
            Err(err) => {
                // Postgres aborts the transaction on error.
                let failure = classify_insert(err);
                tx.rollback().await.map_err(map_sqlx)?;
                return match failure {
                    InsertFailure::Duplicate => {
                        match self.find_existing_claim(customer_id, offer_id).await? {
                            Some(existing) => Ok(Admission::Duplicate(existing)),
                            None => Err(StoreError::DuplicateClaim),
                        }
                    }
                    InsertFailure::CodeCollision => Err(StoreError::CodeCollision),
                    InsertFailure::MissingOffer => Ok(Admission::OfferNotFound),
                    InsertFailure::Other(e) => Err(e),
                };
            }
        };

        let reserved = sqlx::query_scalar::<_, i32>(RESERVE_UNIT)
            .bind(*offer_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let Some(current) = reserved else {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(Admission::CapacityExceeded);
        };

        tx.commit().await.map_err(map_sqlx)?;
        let current_claims = u32::try_from(current)
            .map_err(|_| StoreError::Backend(format!("negative counter on {offer_id}")))?;
        Ok(Admission::Created {
            claim: Claim::try_from(row)?,
            current_claims,
        })
    }

    async fn mark_redeemed(
        &self,
        claim_id: ClaimId,
        redeemed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Transition, StoreError> {
        let updated = sqlx::query_as::<_, ClaimRow>(
            "UPDATE claims SET status = 'redeemed', redeemed_at = $2, redemption_notes = $3 \
             WHERE id = $1 AND status = 'active' RETURNING *",
        )
        .bind(*claim_id.as_uuid())
        .bind(redeemed_at)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        self.finish_transition(claim_id, updated).await
    }

    async fn mark_expired(&self, claim_id: ClaimId) -> Result<Transition, StoreError> {
        let updated = sqlx::query_as::<_, ClaimRow>(
            "UPDATE claims SET status = 'expired' WHERE id = $1 AND status = 'active' RETURNING *",
        )
        .bind(*claim_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        self.finish_transition(claim_id, updated).await
    }

    async fn list_claims(
        &self,
        scope: ClaimScope,
        status: Option<ClaimStatus>,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<ClaimRecord>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM claims c JOIN offers o ON o.id = c.offer_id",
        );
        push_claim_filters(&mut count, scope, status, now);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut select = QueryBuilder::<Postgres>::new(CLAIM_RECORD_SELECT);
        push_claim_filters(&mut select, scope, status, now);
        select
            .push(" ORDER BY c.claimed_at DESC, c.id LIMIT ")
            .push_bind(to_i64(page.limit()))
            .push(" OFFSET ")
            .push_bind(to_i64(page.offset()));
        let items = select
            .build_query_as::<ClaimRecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?
            .into_iter()
            .map(ClaimRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            request: page,
        })
    }

    async fn claims_since(
        &self,
        business_id: BusinessId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRecord>, StoreError> {
        sqlx::query_as::<_, ClaimRecordRow>(&format!(
            "{CLAIM_RECORD_SELECT} WHERE o.business_id = $1 AND c.claimed_at >= $2 \
             ORDER BY c.claimed_at DESC"
        ))
        .bind(*business_id.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .into_iter()
        .map(ClaimRecord::try_from)
        .collect()
    }
}
