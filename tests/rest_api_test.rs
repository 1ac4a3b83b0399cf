//! End-to-end tests for the REST surface.
//! Spins up the real router on a random port and drives it with reqwest.

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
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

const ADMIN_TOKEN: &str = "itest-admin-token";
const VOICE_SECRET: &str = "itest-voice-secret";

/// Find a free local port by binding to port 0.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Build the full context on a temp dir and serve it on a random port.
/// The AI gateway points at an unroutable port so calls fail fast, and the
/// mail relay is unconfigured so sends are no-ops.
async fn start_test_server() -> (TempDir, String, AppContext) {
    let dir = TempDir::new().unwrap();
    let port = find_free_port();

    let mut config = WrapdConfig::new(
        Some(port),
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        Some("127.0.0.1".to_string()),
    );
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config.ai.base_url = "http://127.0.0.1:9".to_string();
    config.ai.timeout_secs = 1;
    config.voice.webhook_secret = VOICE_SECRET.to_string();
    config.approvals.link_secret = "itest-link-secret".to_string();
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
    // Give the server a moment to bind.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (dir, format!("http://127.0.0.1:{port}"), ctx)
}

async fn seed_tenant(ctx: &AppContext, name: &str, installs: bool) -> (TenantRow, String) {
    tenants::provision(&ctx.storage, name, installs).await.unwrap()
}

fn sign_voice(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(VOICE_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, base, _ctx) = start_test_server().await;
    let resp = reqwest::get(format!("{base}/api/v1/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);
    assert!(body["version"].is_string());
    assert!(body["uptime_secs"].is_number());
}

#[tokio::test]
async fn test_missing_or_wrong_api_key_is_401() {
    let (_dir, base, _ctx) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/contacts"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or missing API key");

    let resp = client
        .get(format!("{base}/api/v1/contacts"))
        .bearer_auth("wk_not_a_real_key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_admin_token_gates_tenant_provisioning() {
    let (_dir, base, _ctx) = start_test_server().await;
    let client = reqwest::Client::new();

    // No admin header: rejected before any work happens.
    let resp = client
        .post(format!("{base}/api/v1/tenants"))
        .json(&json!({ "name": "Wrap City ATX" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // With the admin token: 201 and the api key appears exactly once.
    let resp = client
        .post(format!("{base}/api/v1/tenants"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "name": "Wrap City ATX", "installs_enabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["slug"], "wrap-city-atx");
    assert_eq!(body["installs_enabled"], true);
    let api_key = body["api_key"].as_str().unwrap().to_string();
    assert!(api_key.starts_with("wk_"));

    // The new key authenticates, and the starter catalogue is in place.
    let resp = client
        .get(format!("{base}/api/v1/materials"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["materials"].as_array().unwrap().len(), 3);

    // Duplicate slug is a 400, not a crash.
    let resp = client
        .post(format!("{base}/api/v1/tenants"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "name": "wrap city atx" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_tenant_profile_hides_api_key() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "JD's Wraps", false).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/tenant"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["slug"], "jd-s-wraps");
    assert!(body.get("api_key").is_none(), "profile must not leak the key");

    // Settings update round-trips.
    let resp = client
        .patch(format!("{base}/api/v1/tenant"))
        .bearer_auth(&api_key)
        .json(&json!({ "labor_rate": 95.0, "default_margin_pct": 25.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["labor_rate"], 95.0);
    assert_eq!(body["default_margin_pct"], 25.0);

    // Out-of-range margin is rejected.
    let resp = client
        .patch(format!("{base}/api/v1/tenant"))
        .bearer_auth(&api_key)
        .json(&json!({ "default_margin_pct": 120.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_contact_upsert_and_stage_updates() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City", false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/contacts"))
        .bearer_auth(&api_key)
        .json(&json!({ "name": "Dana", "email": "dana@example.com", "vehicle": "2022 Ford Transit" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["created"], true);
    let contact_id = body["contact"]["id"].as_str().unwrap().to_string();

    // Same email merges instead of duplicating.
    let resp = client
        .post(format!("{base}/api/v1/contacts"))
        .bearer_auth(&api_key)
        .json(&json!({ "email": "Dana@Example.com", "phone": "555-123-9999" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["created"], false);
    assert_eq!(body["contact"]["id"], contact_id.as_str());

    // Stage moves through the pipeline; an unknown stage is a 400.
    let resp = client
        .patch(format!("{base}/api/v1/contacts/{contact_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "stage": "quoted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["contact"]["stage"], "quoted");

    let resp = client
        .patch(format!("{base}/api/v1/contacts/{contact_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "stage": "vanished" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{base}/api/v1/contacts?stage=quoted"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["contacts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_contacts_are_tenant_scoped() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_a, key_a) = seed_tenant(&ctx, "Shop A", false).await;
    let (_b, key_b) = seed_tenant(&ctx, "Shop B", false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/contacts"))
        .bearer_auth(&key_a)
        .json(&json!({ "name": "Only A", "email": "a@example.com" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let contact_id = body["contact"]["id"].as_str().unwrap().to_string();

    // Tenant B sees neither the list entry nor the row itself.
    let resp = client
        .get(format!("{base}/api/v1/contacts"))
        .bearer_auth(&key_b)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["contacts"].as_array().unwrap().is_empty());

    let resp = client
        .get(format!("{base}/api/v1/contacts/{contact_id}"))
        .bearer_auth(&key_b)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_task_lifecycle() {
    let (_dir, base, ctx) = start_test_server().await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City", false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/tasks"))
        .bearer_auth(&api_key)
        .json(&json!({ "title": "Order more SW900", "detail": "Black gloss running low" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let task_id = body["task"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["task"]["kind"], "manual");
    assert_eq!(body["task"]["status"], "open");

    let resp = client
        .get(format!("{base}/api/v1/tasks?status=open"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

    let resp = client
        .patch(format!("{base}/api/v1/tasks/{task_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "status": "done" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .patch(format!("{base}/api/v1/tasks/{task_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "status": "paused" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_voice_webhook_signature_flow() {
    let (_dir, base, ctx) = start_test_server().await;
    let (tenant, _api_key) = seed_tenant(&ctx, "Wrap City", false).await;
    let client = reqwest::Client::new();
    let slug = &tenant.slug;

    let event = json!({ "type": "call.started", "call_id": "call-9", "from": "555-777-1234" });
    let body = serde_json::to_vec(&event).unwrap();

    // Unsigned request never reaches the handler.
    let resp = client
        .post(format!("{base}/webhooks/voice/{slug}"))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Tampered signature is rejected too.
    let resp = client
        .post(format!("{base}/webhooks/voice/{slug}"))
        .header("x-voice-signature", sign_voice(b"other body"))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Valid signature: the call opens a phone conversation.
    let resp = client
        .post(format!("{base}/webhooks/voice/{slug}"))
        .header("x-voice-signature", sign_voice(&body))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let out: Value = resp.json().await.unwrap();
    assert_eq!(out["ok"], true);

    // Unknown slug is a 404 before signature verification matters.
    let resp = client
        .post(format!("{base}/webhooks/voice/no-such-shop"))
        .header("x-voice-signature", sign_voice(&body))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_metrics_endpoint_counts_requests() {
    let (_dir, base, _ctx) = start_test_server().await;

    reqwest::get(format!("{base}/api/v1/health")).await.unwrap();
    let resp = reqwest::get(format!("{base}/api/v1/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = resp.text().await.unwrap();
    assert!(text.contains("wrapd_uptime_seconds"));
    assert!(!text.contains("wrapd_http_requests_total 0"));
}
