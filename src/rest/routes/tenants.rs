// rest/routes/tenants.rs — tenant provisioning and the profile endpoint.
//
// POST /api/v1/tenants is the only admin-token route; everything else in
// this file speaks for the authenticated tenant. The api key appears in
// exactly one response: the provisioning reply.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, ApiError};
use crate::rest::auth::admin_authorized;
use crate::storage::TenantRow;
use crate::AppContext;

/// Tenant as the API shows it — never the api key.
fn profile(t: &TenantRow) -> Value {
    json!({
        "id": t.id,
        "name": t.name,
        "slug": t.slug,
        "installs_enabled": t.installs_enabled,
        "labor_rate": t.labor_rate,
        "default_margin_pct": t.default_margin_pct,
        "ai_daily_limit": t.ai_daily_limit,
        "reply_to_email": t.reply_to_email,
        "timezone": t.timezone,
        "created_at": t.created_at,
    })
}

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub installs_enabled: Option<bool>,
}

pub async fn create_tenant(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(body): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !admin_authorized(&ctx, &headers) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Admin token required" })),
        ));
    }
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }

    let (tenant, api_key) = crate::tenants::provision(
        &ctx.storage,
        body.name.trim(),
        body.installs_enabled.unwrap_or(false),
    )
    .await
    .map_err(|e| bad_request(e.to_string()))?;

    let mut out = profile(&tenant);
    // Shown once, at provisioning.
    out["api_key"] = json!(api_key);
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn get_tenant(Extension(tenant): Extension<TenantRow>) -> Json<Value> {
    Json(profile(&tenant))
}

#[derive(Deserialize)]
pub struct UpdateTenantRequest {
    pub installs_enabled: Option<bool>,
    pub labor_rate: Option<f64>,
    pub default_margin_pct: Option<f64>,
    pub ai_daily_limit: Option<i64>,
    pub reply_to_email: Option<String>,
    pub timezone: Option<String>,
}

pub async fn update_tenant(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<UpdateTenantRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(rate) = body.labor_rate {
        if rate < 0.0 {
            return Err(bad_request("labor_rate must be >= 0"));
        }
    }
    if let Some(pct) = body.default_margin_pct {
        if !(0.0..=95.0).contains(&pct) {
            return Err(bad_request("default_margin_pct must be between 0 and 95"));
        }
    }

    ctx.storage
        .update_tenant(
            &tenant.id,
            body.installs_enabled,
            body.labor_rate,
            body.default_margin_pct,
            body.ai_daily_limit,
            body.reply_to_email.as_deref(),
            body.timezone.as_deref(),
        )
        .await
        .map_err(internal_error)?;

    let updated = ctx
        .storage
        .get_tenant(&tenant.id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| super::not_found("Tenant"))?;
    Ok(Json(profile(&updated)))
}
