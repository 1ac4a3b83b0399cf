// rest/routes/social.rs — the Meta OAuth connect entry point.

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use super::{bad_request, ApiError};
use crate::social;
use crate::storage::TenantRow;
use crate::AppContext;

/// GET /api/v1/social/connect — the login dialog URL the UI redirects to.
/// The callback lands on /webhooks/instagram/callback with our signed state.
pub async fn connect(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
) -> Result<Json<Value>, ApiError> {
    let (url, _state) = social::authorize_url(&ctx.config.social, &tenant.id)
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(json!({ "url": url })))
}
