//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{claims, offers, redemption, system};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description, served at `/api-docs/openapi.json`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Offer Claim Gateway",
        description = "Claim and redeem capacity-limited, time-boxed discount offers."
    ),
    paths(
        system::health_handler,
        offers::create_offer,
        offers::get_offer,
        offers::set_offer_status,
        offers::list_business_offers,
        claims::claim_offer,
        claims::list_customer_claims,
        claims::list_business_claims,
        redemption::verify_claim,
        redemption::redeem_claim,
        redemption::redemption_stats,
    ),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Offers", description = "Business offer management"),
        (name = "Claims", description = "Customer claims and listings"),
        (name = "Redemption", description = "In-store verification and redemption"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/offers",
            "/api/v1/offers/{id}",
            "/api/v1/offers/{id}/status",
            "/api/v1/offers/{id}/claim",
            "/api/v1/business/offers",
            "/api/v1/claims",
            "/api/v1/business/claims",
            "/api/v1/redeem/verify",
            "/api/v1/redeem/complete",
            "/api/v1/redeem/stats",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
