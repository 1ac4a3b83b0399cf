// rest/routes/campaigns.rs — campaigns, creatives, and the content calendar.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::ai::GatewayError;
use crate::content::{self, PostDraft};
use crate::storage::TenantRow;
use crate::AppContext;

pub const CAMPAIGN_STATUSES: &[&str] = &["draft", "active", "archived"];
pub const CREATIVE_STATUSES: &[&str] = &["draft", "approved", "discarded"];

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub brief: Option<String>,
    pub platforms: Option<Vec<String>>,
}

pub async fn create_campaign(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    let platforms = body.platforms.unwrap_or_default();
    for p in &platforms {
        if !content::is_valid_platform(p) {
            return Err(bad_request(format!("unknown platform '{p}'")));
        }
    }
    let platforms_json = serde_json::to_string(&platforms)
        .map_err(|e| internal_error(anyhow::anyhow!("platform serialization: {e}")))?;

    let campaign = ctx
        .storage
        .create_campaign(
            &tenant.id,
            body.name.trim(),
            body.brief.as_deref().unwrap_or("").trim(),
            &platforms_json,
        )
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(json!({ "campaign": campaign }))))
}

pub async fn list_campaigns(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
) -> Result<Json<Value>, ApiError> {
    let campaigns = ctx
        .storage
        .list_campaigns(&tenant.id, 100)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "campaigns": campaigns })))
}

pub async fn get_campaign(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx
        .storage
        .get_campaign(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    {
        Some(campaign) => Ok(Json(json!({ "campaign": campaign }))),
        None => Err(not_found("Campaign")),
    }
}

#[derive(Deserialize)]
pub struct UpdateCampaignRequest {
    pub status: String,
}

pub async fn update_campaign(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<Value>, ApiError> {
    if !CAMPAIGN_STATUSES.contains(&body.status.as_str()) {
        return Err(bad_request(format!("unknown status '{}'", body.status)));
    }
    let updated = ctx
        .storage
        .set_campaign_status(&tenant.id, &id, &body.status)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Campaign"));
    }
    let campaign = ctx
        .storage
        .get_campaign(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Campaign"))?;
    Ok(Json(json!({ "campaign": campaign })))
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub include_image: bool,
}

/// POST /api/v1/campaigns/{id}/generate — draft captions (and optionally a
/// hero image) from the brief.
pub async fn generate(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    super::chat::check_daily_limit(&ctx, &tenant).await?;

    let Some(campaign) = ctx
        .storage
        .get_campaign(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Campaign"));
    };

    let creatives = content::generate_creatives(&ctx, &tenant, &campaign, body.include_image)
        .await
        .map_err(|e| match e.downcast_ref::<GatewayError>() {
            Some(_) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("AI gateway error: {e}") })),
            ),
            None => internal_error(e),
        })?;
    Ok(Json(json!({ "creatives": creatives })))
}

pub async fn list_creatives(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if ctx
        .storage
        .get_campaign(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .is_none()
    {
        return Err(not_found("Campaign"));
    }
    let creatives = ctx
        .storage
        .list_creatives(&tenant.id, &id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "creatives": creatives })))
}

#[derive(Deserialize)]
pub struct UpdateCreativeRequest {
    pub status: String,
}

pub async fn update_creative(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCreativeRequest>,
) -> Result<Json<Value>, ApiError> {
    if !CREATIVE_STATUSES.contains(&body.status.as_str()) {
        return Err(bad_request(format!("unknown status '{}'", body.status)));
    }
    let updated = ctx
        .storage
        .set_creative_status(&tenant.id, &id, &body.status)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Creative"));
    }
    Ok(Json(json!({ "status": body.status })))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub campaign_id: Option<String>,
    pub platform: String,
    pub caption: String,
    pub image_url: Option<String>,
    pub scheduled_at: String,
}

/// POST /api/v1/posts — schedule a post. Validation errors block with 400;
/// warnings ride along in the success response.
pub async fn create_post(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(ref campaign_id) = body.campaign_id {
        if ctx
            .storage
            .get_campaign(&tenant.id, campaign_id)
            .await
            .map_err(internal_error)?
            .is_none()
        {
            return Err(bad_request("unknown campaign_id"));
        }
    }

    let draft = PostDraft {
        platform: &body.platform,
        caption: &body.caption,
        image_url: body.image_url.as_deref(),
        scheduled_at: Some(&body.scheduled_at),
    };
    let validation = content::validate_post(&draft, Utc::now());
    if !validation.is_schedulable() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "post failed validation",
                "errors": validation.errors,
                "warnings": validation.warnings,
            })),
        ));
    }

    let post = ctx
        .storage
        .create_post(
            &tenant.id,
            body.campaign_id.as_deref(),
            &body.platform,
            body.caption.trim(),
            body.image_url.as_deref(),
            &body.scheduled_at,
            "scheduled",
        )
        .await
        .map_err(internal_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "post": post, "warnings": validation.warnings })),
    ))
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
}

/// GET /api/v1/posts?from&to&status — the calendar query.
pub async fn list_posts(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListPostsQuery>,
) -> Result<Json<Value>, ApiError> {
    let posts = ctx
        .storage
        .list_posts(
            &tenant.id,
            q.from.as_deref(),
            q.to.as_deref(),
            q.status.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "posts": posts })))
}

pub async fn get_post(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx
        .storage
        .get_post(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    {
        Some(post) => Ok(Json(json!({ "post": post }))),
        None => Err(not_found("Post")),
    }
}
