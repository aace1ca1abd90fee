//! REST endpoint handlers organized by resource.

pub mod claims;
pub mod offers;
pub mod redemption;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(offers::routes())
        .merge(claims::routes())
        .merge(redemption::routes())
}
