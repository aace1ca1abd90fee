//! Caller identity extractors.
//!
//! Authentication happens upstream. The auth layer forwards the verified
//! caller as an `x-customer-id` or `x-business-id` header carrying a UUID,
//! and these extractors turn that header into a typed identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::{BusinessId, CustomerId};
use crate::error::GatewayError;

/// Header carrying the authenticated customer's UUID.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";

/// Header carrying the authenticated business's UUID.
pub const BUSINESS_ID_HEADER: &str = "x-business-id";

/// Authenticated customer making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerCaller(pub CustomerId);

/// Authenticated business making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCaller(pub BusinessId);

impl<S: Send + Sync> FromRequestParts<S> for CustomerCaller {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, CUSTOMER_ID_HEADER).map(|id| Self(CustomerId::from_uuid(id)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BusinessCaller {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, BUSINESS_ID_HEADER).map(|id| Self(BusinessId::from_uuid(id)))
    }
}

fn header_uuid(parts: &Parts, name: &'static str) -> Result<uuid::Uuid, GatewayError> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Unauthenticated(format!("missing {name} header")))?;

    raw.trim()
        .parse()
        .map_err(|_| GatewayError::Unauthenticated(format!("malformed {name} header")))
}
