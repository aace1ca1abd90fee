//! End-to-end tests over a real HTTP listener backed by the in-memory store.

use std::net::SocketAddr;

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use offer_claim_gateway::api;
use offer_claim_gateway::app_state::AppState;
use offer_claim_gateway::config::GatewayConfig;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> anyhow::Result<Self> {
        let state = AppState::in_memory(&GatewayConfig::default());
        let app = api::build_router().with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            addr,
            client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn create_offer(&self, business: &str, max_claims: Option<u32>) -> anyhow::Result<Value> {
        let now = Utc::now();
        let resp = self
            .client
            .post(self.url("/api/v1/offers"))
            .header("x-business-id", business)
            .json(&json!({
                "product_id": uuid::Uuid::new_v4(),
                "title": "Two for one espresso",
                "discount_percentage": 50,
                "start_date": now - Duration::hours(1),
                "expiry_date": now + Duration::days(7),
                "max_claims": max_claims,
            }))
            .send()
            .await?;
        anyhow::ensure!(resp.status() == StatusCode::CREATED, "create offer: {}", resp.status());
        Ok(resp.json().await?)
    }

    async fn claim(&self, customer: &str, offer_id: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(&format!("/api/v1/offers/{offer_id}/claim")))
            .header("x-customer-id", customer)
            .json(&json!({ "customer_name": "Ada" }))
            .send()
            .await?)
    }

    async fn redeem(&self, business: &str, identifier: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/api/v1/redeem/complete"))
            .header("x-business-id", business)
            .json(&json!({ "claim_id": identifier, "redemption_notes": "till 2" }))
            .send()
            .await?)
    }
}

fn field<'a>(value: &'a Value, path: &[&str]) -> anyhow::Result<&'a Value> {
    path.iter().try_fold(value, |node, key| {
        node.get(key)
            .ok_or_else(|| anyhow::anyhow!("missing field {key} in {node}"))
    })
}

fn text(value: &Value, path: &[&str]) -> anyhow::Result<String> {
    field(value, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("field {path:?} is not a string"))
}

#[tokio::test]
async fn claim_verify_redeem_lifecycle() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let business = uuid::Uuid::new_v4().to_string();
    let customer = uuid::Uuid::new_v4().to_string();

    let offer = server.create_offer(&business, Some(1)).await?;
    let offer_id = text(&offer, &["offer_id"])?;
    assert_eq!(text(&offer, &["status"])?, "active");
    assert_eq!(field(&offer, &["remaining_claims"])?, &json!(1));

    let first = server.claim(&customer, &offer_id).await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await?;
    let code = text(&first, &["claim", "redemption_code"])?;
    assert_eq!(field(&first, &["already_claimed"])?, &json!(false));
    assert!(text(&first, &["claim", "verification_url"])?.ends_with(&code));

    let again = server.claim(&customer, &offer_id).await?;
    assert_eq!(again.status(), StatusCode::OK);
    let again: Value = again.json().await?;
    assert_eq!(text(&again, &["claim", "redemption_code"])?, code);

    let other = uuid::Uuid::new_v4().to_string();
    let full = server.claim(&other, &offer_id).await?;
    assert_eq!(full.status(), StatusCode::BAD_REQUEST);

    let verified: Value = server
        .client
        .post(server.url("/api/v1/redeem/verify"))
        .header("x-business-id", &business)
        .json(&json!({ "claim_identifier": code }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(field(&verified, &["is_valid"])?, &json!(true));
    assert_eq!(text(&verified, &["claim_details", "customer_name"])?, "Ada");

    let redeemed = server.redeem(&business, &code).await?;
    assert_eq!(redeemed.status(), StatusCode::OK);
    let redeemed: Value = redeemed.json().await?;
    assert_eq!(text(&redeemed, &["claim", "status"])?, "redeemed");

    let twice = server.redeem(&business, &code).await?;
    assert_eq!(twice.status(), StatusCode::CONFLICT);

    let listed: Value = server
        .client
        .get(server.url("/api/v1/claims?status=redeemed"))
        .header("x-customer-id", &customer)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(field(&listed, &["pagination", "total"])?, &json!(1));

    let stats: Value = server
        .client
        .get(server.url("/api/v1/redeem/stats?days=7"))
        .header("x-business-id", &business)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(field(&stats, &["total_claims"])?, &json!(1));
    assert_eq!(field(&stats, &["redeemed"])?, &json!(1));
    Ok(())
}

#[tokio::test]
async fn foreign_business_cannot_redeem() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let owner = uuid::Uuid::new_v4().to_string();
    let offer = server.create_offer(&owner, None).await?;
    let offer_id = text(&offer, &["offer_id"])?;

    let claimed: Value = server
        .claim(&uuid::Uuid::new_v4().to_string(), &offer_id)
        .await?
        .json()
        .await?;
    let code = text(&claimed, &["claim", "redemption_code"])?;

    let intruder = uuid::Uuid::new_v4().to_string();
    let resp = server.redeem(&intruder, &code).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let verified: Value = server
        .client
        .post(server.url("/api/v1/redeem/verify"))
        .header("x-business-id", &intruder)
        .json(&json!({ "claim_identifier": code }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(text(&verified, &["error_code"])?, "UNAUTHORIZED_BUSINESS");
    Ok(())
}

#[tokio::test]
async fn missing_identity_is_rejected() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let resp = server
        .client
        .get(server.url("/api/v1/claims"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await?;
    assert_eq!(field(&body, &["error", "code"])?, &json!(1002));
    Ok(())
}

#[tokio::test]
async fn unknown_offer_is_not_found() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let resp = server
        .claim(
            &uuid::Uuid::new_v4().to_string(),
            &uuid::Uuid::new_v4().to_string(),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn health_reports_version() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let body: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(text(&body, &["status"])?, "healthy");
    assert_eq!(text(&body, &["version"])?, env!("CARGO_PKG_VERSION"));
    Ok(())
}
