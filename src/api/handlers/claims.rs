//! Claim handlers: claim an offer and list claims.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    BusinessClaimListQuery, ClaimListQuery, ClaimOfferRequest, ClaimOfferResponse,
    ClaimSummary, PaginatedClaims, PaginationMeta, PaginationParams,
};
use crate::api::extract::{BusinessCaller, CustomerCaller};
use crate::app_state::AppState;
use crate::domain::{ClaimScope, OfferId, Page};
use crate::error::{ErrorResponse, GatewayError};
use crate::store::ClaimRecord;

/// `POST /offers/{id}/claim`: Claim an offer for the calling customer.
///
/// Idempotent per customer and offer: a repeat returns the existing claim
/// with `200 OK` instead of `201 Created`. The body is optional; without
/// one the claim is in-store with no customer snapshot.
///
/// # Errors
///
/// - [`GatewayError::OfferNotFound`] if the offer does not exist.
/// - [`GatewayError::OfferNotActive`] outside the window or when switched off.
/// - [`GatewayError::OfferFull`] when no capacity is left.
#[utoipa::path(
    post,
    path = "/api/v1/offers/{id}/claim",
    tag = "Claims",
    summary = "Claim an offer",
    description = "Reserves one unit of the offer's capacity for the calling customer and issues a redemption code. In-store claims also get a verification URL for the QR code.",
    params(
        ("id" = uuid::Uuid, Path, description = "Offer UUID"),
    ),
    request_body = ClaimOfferRequest,
    responses(
        (status = 201, description = "Claim created", body = ClaimOfferResponse),
        (status = 200, description = "Customer already holds a claim", body = ClaimOfferResponse),
        (status = 400, description = "Offer not claimable or full", body = ErrorResponse),
        (status = 401, description = "Missing customer identity", body = ErrorResponse),
        (status = 404, description = "Offer not found", body = ErrorResponse),
    )
)]
pub async fn claim_offer(
    State(state): State<AppState>,
    CustomerCaller(customer_id): CustomerCaller,
    Path(id): Path<uuid::Uuid>,
    body: Option<Json<ClaimOfferRequest>>,
) -> Result<impl IntoResponse, GatewayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let outcome = state
        .admission
        .claim_offer(req.into_claim_request(customer_id, OfferId::from_uuid(id)))
        .await?;
    let status = if outcome.already_claimed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ClaimOfferResponse::from(outcome))))
}

/// `GET /claims`: List the calling customer's claims.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/claims",
    tag = "Claims",
    summary = "List own claims",
    description = "Returns the calling customer's claims, newest first. The status filter applies to the effective status, so claims on lapsed offers count as expired.",
    params(ClaimListQuery, PaginationParams),
    responses(
        (status = 200, description = "Paginated claims", body = PaginatedClaims),
        (status = 401, description = "Missing customer identity", body = ErrorResponse),
    )
)]
pub async fn list_customer_claims(
    State(state): State<AppState>,
    CustomerCaller(customer_id): CustomerCaller,
    Query(filter): Query<ClaimListQuery>,
    Query(paging): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let page = state
        .queries
        .list_claims(
            ClaimScope::Customer(customer_id),
            filter.status,
            paging.to_request(),
        )
        .await?;
    Ok(Json(paginated(page)))
}

/// `GET /business/claims`: List claims against the calling business's offers.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/business/claims",
    tag = "Claims",
    summary = "List claims on own offers",
    description = "Returns claims against the calling business's offers, newest first, optionally narrowed to one offer and one effective status.",
    params(BusinessClaimListQuery, PaginationParams),
    responses(
        (status = 200, description = "Paginated claims", body = PaginatedClaims),
        (status = 401, description = "Missing business identity", body = ErrorResponse),
    )
)]
pub async fn list_business_claims(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Query(filter): Query<BusinessClaimListQuery>,
    Query(paging): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let scope = ClaimScope::Business {
        business_id,
        offer_id: filter.offer_id.map(OfferId::from_uuid),
    };
    let page = state
        .queries
        .list_claims(scope, filter.status, paging.to_request())
        .await?;
    Ok(Json(paginated(page)))
}

fn paginated(page: Page<ClaimRecord>) -> PaginatedClaims {
    let pagination = PaginationMeta::of(&page);
    PaginatedClaims {
        data: page.items.into_iter().map(ClaimSummary::from).collect(),
        pagination,
    }
}

/// Claim routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/offers/{id}/claim", post(claim_offer))
        .route("/claims", get(list_customer_claims))
        .route("/business/claims", get(list_business_claims))
}
