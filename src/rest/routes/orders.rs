// rest/routes/orders.rs — ShopFlow order endpoints and the tracking card.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::shopflow;
use crate::storage::TenantRow;
use crate::AppContext;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub title: String,
    pub quote_id: Option<String>,
    pub contact_id: Option<String>,
}

pub async fn create_order(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(bad_request("title is required"));
    }
    if let Some(ref quote_id) = body.quote_id {
        if ctx
            .storage
            .get_quote(&tenant.id, quote_id)
            .await
            .map_err(internal_error)?
            .is_none()
        {
            return Err(bad_request("unknown quote_id"));
        }
    }
    if let Some(ref contact_id) = body.contact_id {
        if ctx
            .storage
            .get_contact(&tenant.id, contact_id)
            .await
            .map_err(internal_error)?
            .is_none()
        {
            return Err(bad_request("unknown contact_id"));
        }
    }

    let order = ctx
        .storage
        .create_order(
            &tenant.id,
            body.title.trim(),
            body.quote_id.as_deref(),
            body.contact_id.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    ctx.broadcaster.broadcast(
        &tenant.id,
        "order.created",
        json!({ "order_id": order.id }),
    );
    Ok((StatusCode::CREATED, Json(json!({ "order": order }))))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub stage: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_orders(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListOrdersQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref stage) = q.stage {
        if !shopflow::is_valid_stage(stage) {
            return Err(bad_request(format!("unknown stage '{stage}'")));
        }
    }
    let orders = ctx
        .storage
        .list_orders(
            &tenant.id,
            q.stage.as_deref(),
            q.limit.unwrap_or(50).clamp(1, 200),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "orders": orders })))
}

pub async fn get_order(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx
        .storage
        .get_order(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    {
        Some(order) => Ok(Json(json!({ "order": order }))),
        None => Err(not_found("Order")),
    }
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub stage: String,
}

/// PATCH /api/v1/orders/{id} — stage moves. Staff can move in either
/// direction; only the stage name is validated.
pub async fn update_order(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateOrderRequest>,
) -> Result<Json<Value>, ApiError> {
    if !shopflow::is_valid_stage(&body.stage) {
        return Err(bad_request(format!("unknown stage '{}'", body.stage)));
    }
    let updated = ctx
        .storage
        .set_order_stage(&tenant.id, &id, &body.stage)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Order"));
    }
    let order = ctx
        .storage
        .get_order(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order"))?;
    ctx.broadcaster.broadcast(
        &tenant.id,
        "order.updated",
        json!({ "order_id": order.id, "stage": order.stage }),
    );
    Ok(Json(json!({ "order": order })))
}

#[derive(Deserialize)]
pub struct AttachTrackingRequest {
    pub tracking_number: String,
}

/// POST /api/v1/orders/{id}/tracking — attach a carrier number; the poller
/// takes it from there.
pub async fn attach_tracking(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<AttachTrackingRequest>,
) -> Result<Json<Value>, ApiError> {
    let number = body.tracking_number.trim();
    if number.is_empty() {
        return Err(bad_request("tracking_number is required"));
    }
    let updated = ctx
        .storage
        .set_order_tracking_number(&tenant.id, &id, number)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Order"));
    }
    let order = ctx
        .storage
        .get_order(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order"))?;
    Ok(Json(json!({ "order": order })))
}

/// GET /api/v1/orders/{id}/tracking — the tracking card: headline status
/// plus the event history, newest first.
pub async fn tracking_card(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(order) = ctx
        .storage
        .get_order(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Order"));
    };
    let events = ctx
        .storage
        .list_tracking_events(&order.id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({
        "order_id": order.id,
        "tracking_number": order.tracking_number,
        "status": order.tracking_status,
        "eta": order.tracking_eta,
        "events": events,
    })))
}
