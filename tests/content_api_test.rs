//! Integration tests for campaigns, the content calendar, and the chat
//! widget. The AI gateway base URL points at an unroutable port, so every
//! gateway call fails fast — which is exactly what the fallback and limit
//! paths under test need.

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

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_test_server(daily_limit: i64) -> (TempDir, String, AppContext) {
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
    config.ai.daily_limit = daily_limit;

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

#[tokio::test]
async fn test_campaign_crud_and_platform_validation() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/campaigns"))
        .bearer_auth(&api_key)
        .json(&json!({ "name": "Spring fleet push", "platforms": ["instagram", "tiktok"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("tiktok"));

    let resp = client
        .post(format!("{base}/api/v1/campaigns"))
        .bearer_auth(&api_key)
        .json(&json!({
            "name": "Spring fleet push",
            "brief": "Before/after shots of commercial vans",
            "platforms": ["instagram", "facebook"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let campaign_id = body["campaign"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["campaign"]["status"], "draft");

    let resp = client
        .patch(format!("{base}/api/v1/campaigns/{campaign_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "status": "active" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["campaign"]["status"], "active");

    let resp = client
        .patch(format!("{base}/api/v1/campaigns/{campaign_id}"))
        .bearer_auth(&api_key)
        .json(&json!({ "status": "paused" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_generate_maps_gateway_failure_to_502() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/api/v1/campaigns"))
        .bearer_auth(&api_key)
        .json(&json!({ "name": "Tint teaser", "platforms": ["facebook"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let campaign_id = body["campaign"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/api/v1/campaigns/{campaign_id}/generate"))
        .bearer_auth(&api_key)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("AI gateway error"));
}

#[tokio::test]
async fn test_post_scheduling_rules() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    // Instagram needs an image.
    let resp = client
        .post(format!("{base}/api/v1/posts"))
        .bearer_auth(&api_key)
        .json(&json!({
            "platform": "instagram",
            "caption": "Fresh gloss black on this F-150 #wrapped",
            "scheduled_at": "2030-01-01T12:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e.as_str().unwrap().contains("image")));

    // Caption over the Instagram limit.
    let resp = client
        .post(format!("{base}/api/v1/posts"))
        .bearer_auth(&api_key)
        .json(&json!({
            "platform": "instagram",
            "caption": "a".repeat(2300),
            "image_url": "https://cdn.example.com/van.jpg",
            "scheduled_at": "2030-01-01T12:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e.as_str().unwrap().contains("2200")));

    // The calendar only schedules forward.
    let resp = client
        .post(format!("{base}/api/v1/posts"))
        .bearer_auth(&api_key)
        .json(&json!({
            "platform": "facebook",
            "caption": "Throwback",
            "scheduled_at": "2020-01-01T12:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e.as_str().unwrap().contains("future")));

    // Facebook without an image is allowed but warned about.
    let resp = client
        .post(format!("{base}/api/v1/posts"))
        .bearer_auth(&api_key)
        .json(&json!({
            "platform": "facebook",
            "caption": "Open Saturday for walk-in quotes",
            "scheduled_at": "2030-01-01T12:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["post"]["status"], "scheduled");
    let warnings = body["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("reach")));

    let body: Value = client
        .get(format!("{base}/api/v1/posts?status=scheduled"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_chat_falls_back_and_captures_lead() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(&api_key)
        .json(&json!({
            "message": "How much to wrap a 2020 Transit?",
            "visitor_name": "Dana",
            "visitor_email": "dana@example.com",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    // Gateway is unreachable, so this is the canned fallback — still a reply.
    assert!(!body["reply"].as_str().unwrap().is_empty());
    assert_eq!(body["status"], "open");
    assert_eq!(body["escalated"], false);
    assert!(body["contact_id"].is_string());
    let conversation_id = body["conversation_id"].as_str().unwrap().to_string();

    // The turn is persisted: one customer message, one assistant reply.
    let body: Value = client
        .get(format!("{base}/api/v1/conversations/{conversation_id}"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["conversation"]["status"], "open");

    // The captured lead shows up in the CRM with the chat source.
    let body: Value = client
        .get(format!("{base}/api/v1/contacts"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let contacts = body["contacts"].as_array().unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0]["email"], "dana@example.com");
    assert_eq!(contacts[0]["source"], "chat");
}

#[tokio::test]
async fn test_chat_escalates_when_customer_asks_for_human() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(&api_key)
        .json(&json!({ "message": "Can I talk to a real person please?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["escalated"], true);
    assert_eq!(body["status"], "escalated");
    let conversation_id = body["conversation_id"].as_str().unwrap().to_string();

    // Escalation opens a follow-up task for staff.
    let body: Value = client
        .get(format!("{base}/api/v1/tasks?status=open"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

    // Further messages get the handoff acknowledgement, no new escalation.
    let body: Value = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(&api_key)
        .json(&json!({
            "conversation_id": conversation_id,
            "message": "ok, when will they reply?",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "escalated");
    assert_eq!(body["escalated"], false);
    assert!(!body["reply"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_daily_ai_limit() {
    let (_dir, base, ctx) = start_test_server(1).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    // The first turn consumes the whole budget (the attempt counts even
    // though the gateway call itself fails).
    let resp = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(&api_key)
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(&api_key)
        .json(&json!({ "message": "anyone there?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Daily AI limit reached");
    assert_eq!(body["limit"], 1);
}

#[tokio::test]
async fn test_social_connect_requires_configuration() {
    let (_dir, base, ctx) = start_test_server(200).await;
    let (_tenant, api_key) = seed_tenant(&ctx, "Wrap City").await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/social/connect"))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
