// rest/auth.rs — bearer api-key auth middleware.
//
// Every tenant gets one api key at provisioning (`wk_...`). The middleware
// resolves it to the tenant row and stashes the row in request extensions;
// handlers never see an unauthenticated request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::AppContext;

pub async fn require_tenant_auth(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Response {
    let key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(key) = key else {
        return unauthorized();
    };

    match ctx.storage.get_tenant_by_api_key(key).await {
        Ok(Some(tenant)) => {
            req.extensions_mut().insert(tenant);
            next.run(req).await
        }
        Ok(None) => unauthorized(),
        Err(e) => {
            error!("tenant lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage error" })),
            )
                .into_response()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Invalid or missing API key" })),
    )
        .into_response()
}

/// Admin-token check for tenant administration. No token configured means
/// the admin surface is disabled outright.
pub fn admin_authorized(ctx: &AppContext, headers: &HeaderMap) -> bool {
    let Some(ref expected) = ctx.config.admin_token else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t == expected.as_str())
        .unwrap_or(false)
}

/// Request counter feeding /api/v1/metrics.
pub async fn count_requests(State(ctx): State<AppContext>, req: Request, next: Next) -> Response {
    ctx.metrics.inc_http_requests();
    next.run(req).await
}
