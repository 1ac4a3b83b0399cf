//! Meta Graph API integration: the OAuth connect flow and post publishing.
//!
//! One connected account per tenant per platform. OAuth state is a signed
//! `tenant:nonce:sig` triple so the callback can be matched to a tenant
//! without server-side session storage. Every Graph call after the code
//! exchange carries `appsecret_proof` (HMAC of the access token), which
//! Meta requires when "Require App Secret" is on.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::SocialConfig;
use crate::storage::SocialAccountRow;

const DIALOG_URL: &str = "https://www.facebook.com/v21.0/dialog/oauth";
const OAUTH_SCOPES: &str = "pages_manage_posts,instagram_content_publish,pages_read_engagement";

/// How much of a Graph error body makes it into our error chain.
const BODY_EXCERPT: usize = 200;

type HmacSha256 = Hmac<Sha256>;

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?)
}

fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signature_matches(secret: &str, payload: &str, sig_hex: &str) -> bool {
    let Ok(sig) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig).is_ok()
}

/// `appsecret_proof` parameter for Graph calls: HMAC-SHA256 of the access
/// token keyed with the app secret.
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> Result<String> {
    sign(app_secret, access_token)
}

// ─── OAuth connect flow ───────────────────────────────────────────────────────

/// Build the Meta login dialog URL for a tenant. Returns the URL and the
/// signed state embedded in it.
pub fn authorize_url(cfg: &SocialConfig, tenant_id: &str) -> Result<(String, String)> {
    if cfg.app_id.is_empty() || cfg.app_secret.is_empty() {
        bail!("social publishing is not configured (missing Meta app id/secret)");
    }
    let nonce = Uuid::new_v4().to_string().replace('-', "");
    let payload = format!("{tenant_id}:{nonce}");
    let state = format!("{payload}:{}", sign(&cfg.app_secret, &payload)?);
    let url = reqwest::Url::parse_with_params(
        DIALOG_URL,
        &[
            ("client_id", cfg.app_id.as_str()),
            ("redirect_uri", cfg.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", OAUTH_SCOPES),
            ("state", state.as_str()),
        ],
    )?;
    Ok((url.to_string(), state))
}

/// Check a callback `state` and recover the tenant id it was issued for.
pub fn verify_state(cfg: &SocialConfig, state: &str) -> Option<String> {
    let parts: Vec<&str> = state.split(':').collect();
    let [tenant_id, nonce, sig] = parts.as_slice() else {
        return None;
    };
    let payload = format!("{tenant_id}:{nonce}");
    if signature_matches(&cfg.app_secret, &payload, sig) {
        Some((*tenant_id).to_string())
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Swap the callback `code` for an access token.
pub async fn exchange_code(cfg: &SocialConfig, code: &str) -> Result<TokenGrant> {
    let client = http_client()?;
    let resp = client
        .get(format!("{}/oauth/access_token", cfg.graph_url))
        .query(&[
            ("client_id", cfg.app_id.as_str()),
            ("client_secret", cfg.app_secret.as_str()),
            ("redirect_uri", cfg.redirect_url.as_str()),
            ("code", code),
        ])
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!(
            "code exchange failed ({}): {}",
            status.as_u16(),
            excerpt(&body)
        );
    }
    Ok(serde_json::from_str(&body)?)
}

#[derive(Debug, Deserialize)]
pub struct GraphUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Resolve the account the token belongs to.
pub async fn fetch_user(cfg: &SocialConfig, access_token: &str) -> Result<GraphUser> {
    let client = http_client()?;
    let proof = appsecret_proof(&cfg.app_secret, access_token)?;
    let resp = client
        .get(format!("{}/me", cfg.graph_url))
        .query(&[
            ("fields", "id,name"),
            ("access_token", access_token),
            ("appsecret_proof", proof.as_str()),
        ])
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("user lookup failed ({}): {}", status.as_u16(), excerpt(&body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Token expiry in RFC 3339, from the grant's `expires_in` seconds.
pub fn expiry_from_grant(grant: &TokenGrant) -> Option<String> {
    grant
        .expires_in
        .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339())
}

// ─── Publishing ───────────────────────────────────────────────────────────────

/// Fail early when the stored token has lapsed, with a message that tells
/// the shop what to do about it.
pub fn check_token_fresh(account: &SocialAccountRow) -> Result<()> {
    let Some(ref at) = account.expires_at else {
        return Ok(());
    };
    let expires = DateTime::parse_from_rfc3339(at)
        .map_err(|e| anyhow!("bad expires_at on {} account: {e}", account.platform))?;
    if expires.with_timezone(&Utc) <= Utc::now() {
        bail!(
            "{} access token expired; reconnect the account",
            account.platform
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GraphId {
    id: String,
}

async fn graph_post(url: &str, payload: serde_json::Value) -> Result<GraphId> {
    let client = http_client()?;
    let resp = client.post(url).json(&payload).send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("graph call failed ({}): {}", status.as_u16(), excerpt(&body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Publish to a Facebook page. Returns the Graph object id.
pub async fn publish_facebook(
    cfg: &SocialConfig,
    account: &SocialAccountRow,
    caption: &str,
    image_url: Option<&str>,
) -> Result<String> {
    let proof = appsecret_proof(&cfg.app_secret, &account.access_token)?;
    let id = match image_url {
        Some(url) => {
            graph_post(
                &format!("{}/{}/photos", cfg.graph_url, account.external_user_id),
                json!({
                    "url": url,
                    "caption": caption,
                    "access_token": account.access_token,
                    "appsecret_proof": proof,
                }),
            )
            .await?
        }
        None => {
            graph_post(
                &format!("{}/{}/feed", cfg.graph_url, account.external_user_id),
                json!({
                    "message": caption,
                    "access_token": account.access_token,
                    "appsecret_proof": proof,
                }),
            )
            .await?
        }
    };
    Ok(id.id)
}

/// Publish to Instagram: create a media container, then publish it.
pub async fn publish_instagram(
    cfg: &SocialConfig,
    account: &SocialAccountRow,
    caption: &str,
    image_url: Option<&str>,
) -> Result<String> {
    let image_url = image_url.ok_or_else(|| anyhow!("Instagram posts require an image"))?;
    let proof = appsecret_proof(&cfg.app_secret, &account.access_token)?;

    let container = graph_post(
        &format!("{}/{}/media", cfg.graph_url, account.external_user_id),
        json!({
            "image_url": image_url,
            "caption": caption,
            "access_token": account.access_token,
            "appsecret_proof": proof,
        }),
    )
    .await?;

    let published = graph_post(
        &format!("{}/{}/media_publish", cfg.graph_url, account.external_user_id),
        json!({
            "creation_id": container.id,
            "access_token": account.access_token,
            "appsecret_proof": proof,
        }),
    )
    .await?;
    Ok(published.id)
}

fn excerpt(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(BODY_EXCERPT)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}
