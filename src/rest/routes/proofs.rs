// rest/routes/proofs.rs — ApproveFlow endpoints.
//
// Staff registers proofs behind tenant auth; the customer-facing pages
// authenticate with the proof's link token and live outside the api-key
// middleware. The token is checked in constant time before anything about
// the proof is revealed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::approveflow;
use crate::storage::{ProofRow, TenantRow};
use crate::AppContext;

#[derive(Deserialize)]
pub struct CreateProofRequest {
    pub image_url: String,
    pub note: Option<String>,
}

/// POST /api/v1/orders/{id}/proofs
pub async fn create_proof(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(order_id): Path<String>,
    Json(body): Json<CreateProofRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.image_url.trim().is_empty() {
        return Err(bad_request("image_url is required"));
    }
    let Some(order) = ctx
        .storage
        .get_order(&tenant.id, &order_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Order"));
    };

    let proof = approveflow::register_proof(
        &ctx,
        &tenant,
        &order,
        body.image_url.trim(),
        body.note.as_deref(),
    )
    .await
    .map_err(internal_error)?;

    // The staff response carries the shareable link too.
    let link = approveflow::proof_link(&ctx.config.approvals, &proof.id).ok();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "proof": proof, "link": link })),
    ))
}

pub async fn list_proofs(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if ctx
        .storage
        .get_order(&tenant.id, &order_id)
        .await
        .map_err(internal_error)?
        .is_none()
    {
        return Err(not_found("Order"));
    }
    let proofs = ctx
        .storage
        .list_proofs(&tenant.id, &order_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "proofs": proofs })))
}

/// What the public page sees. No tenant ids, no internal refs.
fn public_payload(proof: &ProofRow, order_title: &str, shop_name: &str) -> Value {
    json!({
        "proof": {
            "id": proof.id,
            "version": proof.version,
            "image_url": proof.image_url,
            "note": proof.note,
            "status": proof.status,
            "decided_by": proof.decided_by,
            "decision_note": proof.decision_note,
            "sent_at": proof.sent_at,
            "decided_at": proof.decided_at,
        },
        "order_title": order_title,
        "shop_name": shop_name,
    })
}

#[derive(Deserialize)]
pub struct PublicProofQuery {
    pub token: Option<String>,
}

async fn load_verified_proof(
    ctx: &AppContext,
    proof_id: &str,
    token: Option<&str>,
) -> Result<(ProofRow, TenantRow), ApiError> {
    let Some(token) = token else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Missing token" })),
        ));
    };
    if !approveflow::verify_token(&ctx.config.approvals.link_secret, proof_id, token) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid token" })),
        ));
    }
    let Some(proof) = ctx.storage.get_proof(proof_id).await.map_err(internal_error)? else {
        return Err(not_found("Proof"));
    };
    let Some(tenant) = ctx
        .storage
        .get_tenant(&proof.tenant_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Proof"));
    };
    Ok((proof, tenant))
}

/// GET /public/proofs/{id}?token=
pub async fn public_proof(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(q): Query<PublicProofQuery>,
) -> Result<Json<Value>, ApiError> {
    let (proof, tenant) = load_verified_proof(&ctx, &id, q.token.as_deref()).await?;
    let order = ctx
        .storage
        .get_order(&tenant.id, &proof.order_id)
        .await
        .map_err(internal_error)?;
    let order_title = order.as_ref().map(|o| o.title.as_str()).unwrap_or("order");
    Ok(Json(public_payload(&proof, order_title, &tenant.name)))
}

#[derive(Deserialize)]
pub struct PublicDecisionRequest {
    pub token: String,
    pub decision: String,
    pub name: Option<String>,
    pub note: Option<String>,
}

/// POST /public/proofs/{id}/decision — the single decision a customer gets.
pub async fn public_decision(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(body): Json<PublicDecisionRequest>,
) -> Result<Json<Value>, ApiError> {
    if !approveflow::is_valid_decision(&body.decision) {
        return Err(bad_request(format!(
            "decision must be one of {:?}",
            approveflow::DECISIONS
        )));
    }
    let (proof, tenant) = load_verified_proof(&ctx, &id, Some(&body.token)).await?;

    let decided_by = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Customer");
    let recorded = approveflow::decide(
        &ctx,
        &tenant,
        &proof,
        &body.decision,
        decided_by,
        body.note.as_deref(),
    )
    .await
    .map_err(internal_error)?;
    if !recorded {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "Proof already decided" })),
        ));
    }
    Ok(Json(json!({ "status": body.decision })))
}
