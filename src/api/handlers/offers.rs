//! Offer handlers: create, get, toggle, and list.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::api::dto::{
    CreateOfferRequest, OfferListQuery, OfferListResponse, OfferResponse, SetOfferStatusRequest,
};
use crate::api::extract::BusinessCaller;
use crate::app_state::AppState;
use crate::domain::OfferId;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /offers`: Publish a new offer.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if validation fails.
#[utoipa::path(
    post,
    path = "/api/v1/offers",
    tag = "Offers",
    summary = "Create an offer",
    description = "Publishes a discount offer owned by the calling business. The claim counter starts at zero; omit `max_claims` for unlimited capacity.",
    request_body = CreateOfferRequest,
    responses(
        (status = 201, description = "Offer created", body = OfferResponse),
        (status = 400, description = "Invalid offer", body = ErrorResponse),
        (status = 401, description = "Missing business identity", body = ErrorResponse),
    )
)]
pub async fn create_offer(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Json(req): Json<CreateOfferRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state
        .offers
        .create_offer(req.into_new_offer(business_id))
        .await?;
    Ok((StatusCode::CREATED, Json(OfferResponse::from(snapshot))))
}

/// `GET /offers/{id}`: Get one offer.
///
/// # Errors
///
/// Returns [`GatewayError::OfferNotFound`] if the offer does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/offers/{id}",
    tag = "Offers",
    summary = "Get offer details",
    description = "Returns an offer with its window state and remaining capacity.",
    params(
        ("id" = uuid::Uuid, Path, description = "Offer UUID"),
    ),
    responses(
        (status = 200, description = "Offer details", body = OfferResponse),
        (status = 404, description = "Offer not found", body = ErrorResponse),
    )
)]
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state.offers.get_offer(OfferId::from_uuid(id)).await?;
    Ok(Json(OfferResponse::from(snapshot)))
}

/// `PATCH /offers/{id}/status`: Flip an offer's kill switch.
///
/// # Errors
///
/// - [`GatewayError::OfferNotFound`] if the offer does not exist.
/// - [`GatewayError::UnauthorizedBusiness`] if another business owns it.
#[utoipa::path(
    patch,
    path = "/api/v1/offers/{id}/status",
    tag = "Offers",
    summary = "Activate or deactivate an offer",
    description = "Switches an offer on or off independently of its time window. Existing claims are unaffected.",
    params(
        ("id" = uuid::Uuid, Path, description = "Offer UUID"),
    ),
    request_body = SetOfferStatusRequest,
    responses(
        (status = 200, description = "Updated offer", body = OfferResponse),
        (status = 403, description = "Offer belongs to another business", body = ErrorResponse),
        (status = 404, description = "Offer not found", body = ErrorResponse),
    )
)]
pub async fn set_offer_status(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<SetOfferStatusRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state
        .offers
        .set_active(business_id, OfferId::from_uuid(id), req.is_active)
        .await?;
    Ok(Json(OfferResponse::from(snapshot)))
}

/// `GET /business/offers`: List the calling business's offers.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/business/offers",
    tag = "Offers",
    summary = "List own offers",
    description = "Returns the calling business's offers, newest first, optionally filtered by window state.",
    params(OfferListQuery),
    responses(
        (status = 200, description = "Offer list", body = OfferListResponse),
        (status = 401, description = "Missing business identity", body = ErrorResponse),
    )
)]
pub async fn list_business_offers(
    State(state): State<AppState>,
    BusinessCaller(business_id): BusinessCaller,
    Query(query): Query<OfferListQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let data: Vec<OfferResponse> = state
        .offers
        .list_offers(business_id, query.status)
        .await?
        .into_iter()
        .map(OfferResponse::from)
        .collect();
    Ok(Json(OfferListResponse {
        total: data.len(),
        data,
    }))
}

/// Offer management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/offers", post(create_offer))
        .route("/offers/{id}", get(get_offer))
        .route("/offers/{id}/status", patch(set_offer_status))
        .route("/business/offers", get(list_business_offers))
}
