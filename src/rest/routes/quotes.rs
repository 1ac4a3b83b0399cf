// rest/routes/quotes.rs — vehicle matching, materials, and the quote flow.
//
// POST /api/v1/quotes is the derivation endpoint: the server matches the
// vehicle, resolves panel areas, and prices with the tenant's own flags —
// the client never supplies money figures.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::pricing::quote::{derive_quote, PanelKind, PanelSelection, QuoteInput};
use crate::pricing::vehicles::match_vehicle as match_dims;
use crate::storage::{NewQuote, TenantRow};
use crate::AppContext;

pub const QUOTE_STATUSES: &[&str] = &["draft", "sent", "accepted", "declined"];

#[derive(Deserialize)]
pub struct MatchQuery {
    pub year: String,
    pub make: String,
    pub model: String,
}

/// GET /api/v1/vehicles/match?year&make&model
pub async fn match_vehicle(Query(q): Query<MatchQuery>) -> Result<Json<Value>, ApiError> {
    match match_dims(&q.year, &q.make, &q.model) {
        Some(m) => Ok(Json(json!({ "match": m }))),
        None => Err(not_found("Vehicle dimension match")),
    }
}

pub async fn list_materials(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
) -> Result<Json<Value>, ApiError> {
    let materials = ctx
        .storage
        .list_materials(&tenant.id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "materials": materials })))
}

#[derive(Deserialize)]
pub struct CreateMaterialRequest {
    pub name: String,
    pub price_per_sqft: f64,
}

pub async fn create_material(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateMaterialRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    if body.price_per_sqft <= 0.0 {
        return Err(bad_request("price_per_sqft must be > 0"));
    }
    let material = ctx
        .storage
        .create_material(&tenant.id, body.name.trim(), body.price_per_sqft)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(json!({ "material": material }))))
}

#[derive(Deserialize)]
pub struct VehicleRef {
    pub year: String,
    pub make: String,
    pub model: String,
}

#[derive(Deserialize)]
pub struct CreateQuoteRequest {
    pub contact_id: Option<String>,
    pub vehicle: VehicleRef,
    /// Panel kinds, resolved against the matched vehicle's figures.
    pub panels: Option<Vec<PanelKind>>,
    /// Explicit areas, for vehicles the reference table doesn't know.
    pub panel_sqft: Option<Vec<PanelSelection>>,
    pub material_id: String,
    pub quantity: Option<u32>,
    /// Margin override; defaults to the tenant's `default_margin_pct`.
    pub margin_pct: Option<f64>,
}

/// POST /api/v1/quotes
pub async fn create_quote(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Some(material) = ctx
        .storage
        .get_material(&tenant.id, &body.material_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(bad_request("unknown material_id"));
    };

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

    let margin_pct = body.margin_pct.unwrap_or(tenant.default_margin_pct);
    if !(0.0..=95.0).contains(&margin_pct) {
        return Err(bad_request("margin_pct must be between 0 and 95"));
    }

    let matched = match_dims(&body.vehicle.year, &body.vehicle.make, &body.vehicle.model);

    // Explicit areas win; otherwise panel kinds need a matched vehicle.
    let selections: Vec<PanelSelection> = match (&body.panel_sqft, &body.panels) {
        (Some(explicit), _) if !explicit.is_empty() => explicit.clone(),
        (_, Some(kinds)) if !kinds.is_empty() => {
            let Some(ref m) = matched else {
                return Err(bad_request(
                    "no dimension match for this vehicle; supply panel_sqft",
                ));
            };
            kinds
                .iter()
                .map(|&kind| PanelSelection {
                    kind,
                    sqft: kind.sqft_from(&m.sqft),
                })
                .collect()
        }
        _ => return Err(bad_request("panels or panel_sqft is required")),
    };

    let breakdown = derive_quote(&QuoteInput {
        panels: selections.clone(),
        price_per_sqft: material.price_per_sqft,
        quantity: body.quantity.unwrap_or(1),
        labor_rate: tenant.labor_rate,
        margin_pct,
        installs_enabled: tenant.installs_enabled,
    });

    let panels_json = serde_json::to_string(&selections)
        .map_err(|e| internal_error(anyhow::anyhow!("panel serialization: {e}")))?;
    let quote = ctx
        .storage
        .create_quote(&NewQuote {
            tenant_id: &tenant.id,
            contact_id: body.contact_id.as_deref(),
            vehicle_year: &body.vehicle.year,
            vehicle_make: &body.vehicle.make,
            vehicle_model: &body.vehicle.model,
            matched_row: matched.as_ref().map(|m| m.label.as_str()),
            panels_json: &panels_json,
            material_id: Some(&material.id),
            material_name: &material.name,
            price_per_sqft: material.price_per_sqft,
            quantity: body.quantity.unwrap_or(1) as i64,
            sqft_total: breakdown.sqft_total,
            material_cost: breakdown.material_cost,
            labor_hours: breakdown.labor_hours,
            labor_cost: breakdown.labor_cost,
            margin_pct: if tenant.installs_enabled { margin_pct } else { 0.0 },
            margin_amount: breakdown.margin_amount,
            total: breakdown.total,
        })
        .await
        .map_err(internal_error)?;

    ctx.metrics.inc_quotes_created();
    ctx.broadcaster.broadcast(
        &tenant.id,
        "quote.created",
        json!({ "quote_id": quote.id, "total": quote.total }),
    );
    Ok((StatusCode::CREATED, Json(json!({ "quote": quote }))))
}

#[derive(Deserialize)]
pub struct ListQuotesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_quotes(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListQuotesQuery>,
) -> Result<Json<Value>, ApiError> {
    let quotes = ctx
        .storage
        .list_quotes(
            &tenant.id,
            q.status.as_deref(),
            q.limit.unwrap_or(50).clamp(1, 200),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "quotes": quotes })))
}

pub async fn get_quote(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx
        .storage
        .get_quote(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    {
        Some(quote) => Ok(Json(json!({ "quote": quote }))),
        None => Err(not_found("Quote")),
    }
}

#[derive(Deserialize)]
pub struct UpdateQuoteRequest {
    pub status: String,
}

pub async fn update_quote(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateQuoteRequest>,
) -> Result<Json<Value>, ApiError> {
    if !QUOTE_STATUSES.contains(&body.status.as_str()) {
        return Err(bad_request(format!("unknown status '{}'", body.status)));
    }
    let updated = ctx
        .storage
        .set_quote_status(&tenant.id, &id, &body.status)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Quote"));
    }
    let quote = ctx
        .storage
        .get_quote(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Quote"))?;
    Ok(Json(json!({ "quote": quote })))
}

/// POST /api/v1/quotes/{id}/send — email the quote to its contact and mark
/// it sent. Unlike background notifications, a failed delivery here is the
/// whole point of the call, so it surfaces as 502 and the status stays.
pub async fn send_quote(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(quote) = ctx
        .storage
        .get_quote(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Quote"));
    };

    let email = match quote.contact_id {
        Some(ref contact_id) => ctx
            .storage
            .get_contact(&tenant.id, contact_id)
            .await
            .map_err(internal_error)?
            .and_then(|c| c.email),
        None => None,
    };
    let Some(email) = email else {
        return Err(bad_request("quote has no contact with an email address"));
    };

    let (subject, text) = crate::mail::quote_email(&tenant.name, &quote);
    if let Err(e) = ctx
        .mailer
        .send(&email, tenant.reply_to_email.as_deref(), &subject, &text)
        .await
    {
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("email delivery failed: {e}") })),
        ));
    }
    ctx.metrics.inc_emails_sent();

    ctx.storage
        .set_quote_status(&tenant.id, &quote.id, "sent")
        .await
        .map_err(internal_error)?;
    let quote = ctx
        .storage
        .get_quote(&tenant.id, &quote.id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Quote"))?;
    Ok(Json(json!({ "quote": quote })))
}
