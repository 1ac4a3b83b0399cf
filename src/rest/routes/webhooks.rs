// rest/routes/webhooks.rs — inbound hooks from the voice platform and the
// Meta OAuth redirect. Neither carries an api key; the voice hook signs
// its body, the OAuth callback carries our own signed state.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::phone::{self, VoiceEvent};
use crate::social;
use crate::AppContext;

pub const VOICE_SIGNATURE_HEADER: &str = "x-voice-signature";

/// POST /webhooks/voice/{slug}
pub async fn voice_webhook(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(tenant) = ctx
        .storage
        .get_tenant_by_slug(&slug)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Tenant"));
    };

    let signature = headers
        .get(VOICE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !phone::verify_signature(&ctx.config.voice.webhook_secret, &body, signature) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid signature" })),
        ));
    }

    let event: VoiceEvent = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("bad event payload: {e}")))?;
    let result = phone::handle_event(&ctx, &tenant, event)
        .await
        .map_err(internal_error)?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /webhooks/instagram/callback?code&state
///
/// One Meta grant covers both platforms, so the token lands on the
/// tenant's facebook and instagram rows at once.
pub async fn instagram_callback(
    State(ctx): State<AppContext>,
    Query(q): Query<OAuthCallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(error) = q.error {
        let detail = q.error_description.unwrap_or(error);
        return Err(bad_request(format!("OAuth denied: {detail}")));
    }
    let (Some(code), Some(state)) = (q.code, q.state) else {
        return Err(bad_request("code and state are required"));
    };

    let Some(tenant_id) = social::verify_state(&ctx.config.social, &state) else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid state" })),
        ));
    };
    let Some(tenant) = ctx
        .storage
        .get_tenant(&tenant_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Tenant"));
    };

    let grant = social::exchange_code(&ctx.config.social, &code)
        .await
        .map_err(upstream_error)?;
    let user = social::fetch_user(&ctx.config.social, &grant.access_token)
        .await
        .map_err(upstream_error)?;
    let expires_at = social::expiry_from_grant(&grant);

    for platform in ["facebook", "instagram"] {
        ctx.storage
            .upsert_social_account(
                &tenant.id,
                platform,
                &user.id,
                &grant.access_token,
                expires_at.as_deref(),
            )
            .await
            .map_err(internal_error)?;
    }

    ctx.broadcaster.broadcast(
        &tenant.id,
        "social.connected",
        json!({ "account": user.name, "platforms": ["facebook", "instagram"] }),
    );
    Ok(Json(json!({
        "connected": true,
        "account": user.name,
        "platforms": ["facebook", "instagram"],
    })))
}

fn upstream_error(e: anyhow::Error) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": e.to_string() })),
    )
}
