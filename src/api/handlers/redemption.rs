//! Redemption handlers: verify, complete, and stats.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    RedeemClaimRequest, RedeemClaimResponse, StatsQuery, VerifyClaimRequest, VerifyClaimResponse,
};
use crate::api::extract::BusinessCaller;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::RedemptionStats;

/// `POST /redeem/verify`: Check whether a claim can be redeemed.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a blank identifier.
#[utoipa::path(
    post,
    path = "/api/v1/redeem/verify",
    tag = "Redemption",
    summary = "Verify a claim",
    description = "Resolves a claim UUID, redemption code or scanned QR URL and reports whether the calling business can redeem it. Read-only; invalid claims are reported in the body, not as errors.",
    request_body = VerifyClaimRequest,
    responses(
        (status = 200, description = "Verification outcome", body = VerifyClaimResponse),
        (status = 400, description = "Blank identifier", body = ErrorResponse),
        (status = 401, description = "Missing business identity", body = ErrorResponse),
    )
)]
pub async fn verify_claim(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Json(req): Json<VerifyClaimRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let verification = state
        .redemption
        .verify_claim(business_id, &req.claim_identifier)
        .await?;
    Ok(Json(VerifyClaimResponse::from(verification)))
}

/// `POST /redeem/complete`: Redeem a claim.
///
/// # Errors
///
/// - [`GatewayError::ClaimNotFound`] if the identifier resolves to nothing.
/// - [`GatewayError::UnauthorizedBusiness`] for another business's claim.
/// - [`GatewayError::AlreadyRedeemed`] or [`GatewayError::OfferExpired`]
///   when the claim is no longer active.
#[utoipa::path(
    post,
    path = "/api/v1/redeem/complete",
    tag = "Redemption",
    summary = "Redeem a claim",
    description = "Atomically moves an active claim to redeemed. Exactly one of several concurrent attempts succeeds; the rest get 409.",
    request_body = RedeemClaimRequest,
    responses(
        (status = 200, description = "Claim redeemed", body = RedeemClaimResponse),
        (status = 400, description = "Malformed identifier", body = ErrorResponse),
        (status = 403, description = "Claim belongs to another business", body = ErrorResponse),
        (status = 404, description = "Claim not found", body = ErrorResponse),
        (status = 409, description = "Already redeemed or offer expired", body = ErrorResponse),
    )
)]
pub async fn redeem_claim(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Json(req): Json<RedeemClaimRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let claim = state
        .redemption
        .redeem_claim(business_id, &req.claim_id, req.redemption_notes)
        .await?;
    Ok(Json(RedeemClaimResponse::from(claim)))
}

/// `GET /redeem/stats`: Redemption statistics for the calling business.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if `days` is out of range.
#[utoipa::path(
    get,
    path = "/api/v1/redeem/stats",
    tag = "Redemption",
    summary = "Redemption statistics",
    description = "Counts claims made on the calling business's offers in the trailing window, split by effective status and claim type, with a per-day breakdown for the last week.",
    params(StatsQuery),
    responses(
        (status = 200, description = "Statistics", body = RedemptionStats),
        (status = 400, description = "Window out of range", body = ErrorResponse),
        (status = 401, description = "Missing business identity", body = ErrorResponse),
    )
)]
pub async fn redemption_stats(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let stats = state
        .redemption
        .redemption_stats(business_id, query.days)
        .await?;
    Ok(Json(stats))
}

/// Redemption routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/redeem/verify", post(verify_claim))
        .route("/redeem/complete", post(redeem_claim))
        .route("/redeem/stats", get(redemption_stats))
}
