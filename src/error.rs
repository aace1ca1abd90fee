//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type. Each variant maps to a
//! specific HTTP status code and a structured JSON error response.
//! Storage backends report [`crate::store::StoreError`], which the
//! services either resolve internally or convert into a `GatewayError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4002,
///     "message": "offer is full: ...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`GatewayError::error_code`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                     |
/// |-----------|------------------|---------------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request / 401           |
/// | 2000–2999 | Not Found        | 404 Not Found                   |
/// | 3000–3999 | Server           | 500 / 503 Service Unavailable   |
/// | 4000–4999 | Offer / Claim    | 400 / 403 / 409                 |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller identity header is missing or malformed.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Offer with the given ID does not exist.
    #[error("offer not found: {0}")]
    OfferNotFound(uuid::Uuid),

    /// Claim identifier does not resolve.
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    /// Offer is switched off or outside its claim window.
    #[error("offer {offer_id} is not claimable: {reason}")]
    OfferNotActive {
        /// Offer that was requested.
        offer_id: uuid::Uuid,
        /// Why the offer cannot be claimed.
        reason: String,
    },

    /// Offer has granted all of its capacity.
    #[error("offer is full: {0}")]
    OfferFull(uuid::Uuid),

    /// Claim belongs to an offer of another business.
    #[error("claim does not belong to this business")]
    UnauthorizedBusiness,

    /// Claim was already redeemed.
    #[error("claim has already been redeemed")]
    AlreadyRedeemed {
        /// When the earlier redemption happened, if known.
        redeemed_at: Option<DateTime<Utc>>,
    },

    /// Parent offer expired before the claim was redeemed.
    #[error("offer expired at {expiry_date}")]
    OfferExpired {
        /// The offer's expiry instant.
        expiry_date: DateTime<Utc>,
    },

    /// Storage timed out or was contended past the retry budget.
    #[error("storage temporarily unavailable: {0}")]
    Transient(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthenticated(_) => 1002,
            Self::OfferNotFound(_) => 2001,
            Self::ClaimNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Transient(_) => 3002,
            Self::OfferNotActive { .. } => 4001,
            Self::OfferFull(_) => 4002,
            Self::UnauthorizedBusiness => 4003,
            Self::AlreadyRedeemed { .. } => 4004,
            Self::OfferExpired { .. } => 4005,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::OfferNotActive { .. } | Self::OfferFull(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::UnauthorizedBusiness => StatusCode::FORBIDDEN,
            Self::OfferNotFound(_) | Self::ClaimNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRedeemed { .. } | Self::OfferExpired { .. } => StatusCode::CONFLICT,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors a caller may retry unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::AlreadyRedeemed {
                redeemed_at: Some(at),
            } => Some(format!("redeemed_at={}", at.to_rfc3339())),
            Self::OfferNotActive { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            GatewayError::OfferFull(id).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::OfferNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::UnauthorizedBusiness.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::AlreadyRedeemed { redeemed_at: None }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GatewayError::OfferExpired {
                expiry_date: Utc::now()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(GatewayError::Transient("timeout".into()).is_retryable());
        assert!(!GatewayError::OfferFull(uuid::Uuid::new_v4()).is_retryable());
        assert_eq!(
            GatewayError::Transient("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn already_redeemed_carries_timestamp_detail() {
        let at = Utc::now();
        let err = GatewayError::AlreadyRedeemed {
            redeemed_at: Some(at),
        };
        assert_eq!(err.details(), Some(format!("redeemed_at={}", at.to_rfc3339())));
        assert_eq!(err.error_code(), 4004);
    }
}
