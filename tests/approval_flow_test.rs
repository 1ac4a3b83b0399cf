//! Integration tests for ShopFlow orders and the ApproveFlow proof loop:
//! stage moves, the tracking card, tokenized public links, and the
//! first-decision-wins rule.

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wrapd::{
    ai::AiGateway,
    config::{HotConfig, WrapdConfig},
    events::EventBroadcaster,
    mail::Mailer,
    metrics::WrapdMetrics,
    storage::{Storage, TenantRow},
    tenants, AppContext,
};

const LINK_SECRET: &str = "itest-link-secret";

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_test_server() -> (TempDir, String, AppContext) {
    let dir = TempDir::new().unwrap();
    let port = find_free_port();

    let mut config = WrapdConfig::new(
        Some(port),
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        Some("127.0.0.1".to_string()),
    );
    config.ai.base_url = "http://127.0.0.1:9".to_string();
    config.ai.timeout_secs = 1;
    config.approvals.link_secret = LINK_SECRET.to_string();
    config.approvals.public_base_url = format!("http://127.0.0.1:{port}");

    let storage = Arc::new(Storage::new(&config.data_dir).await.unwrap());
    let hot_config = Arc::new(tokio::sync::RwLock::new(HotConfig {
        log_level: config.log.clone(),
        tracking_poll_secs: config.tracking.poll_interval_secs,
        publish_interval_secs: config.social.publish_interval_secs,
    }));
    let mailer = Arc::new(Mailer::new(&config.mail));
    let ai = Arc::new(AiGateway::new(&config.ai).unwrap());

    let ctx = AppContext {
        config: Arc::new(config),
        hot_config,
        storage,
        broadcaster: Arc::new(EventBroadcaster::new()),
        mailer,
        ai,
        metrics: Arc::new(WrapdMetrics::new()),
        started_at: std::time::Instant::now(),
    };

    let server_ctx = ctx.clone();
    tokio::spawn(async move {
        wrapd::rest::start_rest_server(server_ctx).await.ok();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (dir, format!("http://127.0.0.1:{port}"), ctx)
}

async fn seed_tenant(ctx: &AppContext, name: &str) -> (TenantRow, String) {
    tenants::provision(&ctx.storage, name, true).await.unwrap()
}

/// Create an order and move it into the design stage, where proofs live.
async fn order_in_design(base: &str, api_key: &str, title: &str) -> String {
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(api_key)
        .json(&json!({ "title": title }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let resp = client
        .patch(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(api_key)
        .json(&json!({ "stage": "design" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    order_id
}

/// Register a proof and return (proof_id, link_token) parsed from the
/// shareable link the staff response carries.
async fn create_proof(base: &str, api_key: &str, order_id: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/v1/orders/{order_id}/proofs"))
        .bearer_auth(api_key)
        .json(&json!({ "image_url": "https://cdn.example.com/proof-v1.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let proof_id = body["proof"]["id"].as_str().unwrap().to_string();
    let link = body["link"].as_str().unwrap().to_string();
    assert!(link.contains(&format!("/public/proofs/{proof_id}?token=")));
    let token = link.split("token=").nth(1).unwrap().to_string();
    (proof_id, token)
}

#[tokio::test]
async fn test_order_lifecycle_and_stage_validation() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(&api_key)
        .json(&json!({ "title": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(&api_key)
        .json(&json!({ "title": "Transit fleet wrap" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["order"]["stage"], "deposit");

    // Stage names are a fixed pipeline; anything else is rejected.
    let resp = client
        .patch(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "stage": "shipped" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .patch(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "stage": "design" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["order"]["stage"], "design");

    let body: Value = client
        .get(format!("{base}/api/v1/orders?stage=design"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tracking_number_and_card() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/api/v1/orders"))
        .bearer_auth(&api_key)
        .json(&json!({ "title": "Box truck print run" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/api/v1/orders/{order_id}/tracking"))
        .bearer_auth(&api_key)
        .json(&json!({ "tracking_number": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/v1/orders/{order_id}/tracking"))
        .bearer_auth(&api_key)
        .json(&json!({ "tracking_number": "1Z999AA10123456784" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["order"]["tracking_number"], "1Z999AA10123456784");

    // The card: headline fields plus the (still empty) event history.
    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}/tracking"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["order_id"], order_id);
    assert_eq!(body["tracking_number"], "1Z999AA10123456784");
    assert_eq!(body["events"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_public_proof_link_requires_valid_token() {
    let (_dir, base, ctx) = start_test_server().await;
    let (tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let order_id = order_in_design(&base, &api_key, "Sprinter partial").await;
    let (proof_id, token) = create_proof(&base, &api_key, &order_id).await;

    let resp = client
        .get(format!("{base}/public/proofs/{proof_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing token");

    let resp = client
        .get(format!(
            "{base}/public/proofs/{proof_id}?token=deadbeefdeadbeef"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid token");

    let resp = client
        .get(format!("{base}/public/proofs/{proof_id}?token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["shop_name"], tenant.name);
    assert_eq!(body["order_title"], "Sprinter partial");
    assert_eq!(body["proof"]["status"], "pending");
    assert_eq!(body["proof"]["version"], 1);
    // Nothing internal leaks on the public page.
    assert!(body["proof"].get("tenant_id").is_none());
    assert!(body.get("tenant_id").is_none());
}

#[tokio::test]
async fn test_approval_advances_design_to_print_once() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let order_id = order_in_design(&base, &api_key, "Transit full wrap").await;
    let (proof_id, token) = create_proof(&base, &api_key, &order_id).await;

    let resp = client
        .post(format!("{base}/public/proofs/{proof_id}/decision"))
        .json(&json!({ "token": token, "decision": "approved", "name": "Jo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "approved");

    // The approval moved the order along the pipeline.
    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["order"]["stage"], "print");

    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}/proofs"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let proof = &body["proofs"].as_array().unwrap()[0];
    assert_eq!(proof["status"], "approved");
    assert_eq!(proof["decided_by"], "Jo");

    // First decision wins; the link is spent.
    let resp = client
        .post(format!("{base}/public/proofs/{proof_id}/decision"))
        .json(&json!({ "token": token, "decision": "changes_requested" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Proof already decided");
}

#[tokio::test]
async fn test_changes_requested_keeps_order_in_design() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let order_id = order_in_design(&base, &api_key, "Tesla hood + roof").await;
    let (proof_id, token) = create_proof(&base, &api_key, &order_id).await;

    let resp = client
        .post(format!("{base}/public/proofs/{proof_id}/decision"))
        .json(&json!({
            "token": token,
            "decision": "changes_requested",
            "note": "logo larger please",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["order"]["stage"], "design");

    // No name supplied: the decision is recorded against "Customer".
    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}/proofs"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let proof = &body["proofs"].as_array().unwrap()[0];
    assert_eq!(proof["status"], "changes_requested");
    assert_eq!(proof["decided_by"], "Customer");
    assert_eq!(proof["decision_note"], "logo larger please");
}

#[tokio::test]
async fn test_decision_validation() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let order_id = order_in_design(&base, &api_key, "Camry chrome delete").await;
    let (proof_id, token) = create_proof(&base, &api_key, &order_id).await;

    let resp = client
        .post(format!("{base}/public/proofs/{proof_id}/decision"))
        .json(&json!({ "token": token, "decision": "meh" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("approved"));

    // A forged token is refused before the proof is touched.
    let resp = client
        .post(format!("{base}/public/proofs/{proof_id}/decision"))
        .json(&json!({ "token": "deadbeef", "decision": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Versions count up per order.
    let (_p2, _t2) = create_proof(&base, &api_key, &order_id).await;
    let body: Value = client
        .get(format!("{base}/api/v1/orders/{order_id}/proofs"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let versions: Vec<i64> = body["proofs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["version"].as_i64().unwrap())
        .collect();
    assert!(versions.contains(&1));
    assert!(versions.contains(&2));
}
