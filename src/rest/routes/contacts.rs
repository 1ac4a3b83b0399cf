// rest/routes/contacts.rs — CRM contact endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::crm::{self, ContactUpsert};
use crate::storage::TenantRow;
use crate::AppContext;

#[derive(Deserialize)]
pub struct CreateContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vehicle: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
}

/// POST /api/v1/contacts — upsert, not blind insert: an existing contact
/// with the same email or phone is filled in rather than duplicated.
pub async fn create_contact(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateContactRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = body.source.as_deref().unwrap_or("manual");
    if !crm::is_valid_source(source) {
        return Err(bad_request(format!("unknown source '{source}'")));
    }
    let has_identity = body.name.is_some() || body.email.is_some() || body.phone.is_some();
    if !has_identity {
        return Err(bad_request("at least one of name, email, phone is required"));
    }

    let fields = ContactUpsert {
        name: body.name.as_deref(),
        email: body.email.as_deref(),
        phone: body.phone.as_deref(),
        vehicle: body.vehicle.as_deref(),
        notes: body.notes.as_deref(),
    };
    let (contact, created) = crm::upsert_contact(&ctx.storage, &tenant.id, source, fields)
        .await
        .map_err(internal_error)?;
    if created {
        ctx.broadcaster.broadcast(
            &tenant.id,
            "contact.created",
            json!({ "contact_id": contact.id }),
        );
    }
    Ok(Json(json!({ "contact": contact, "created": created })))
}

#[derive(Deserialize)]
pub struct ListContactsQuery {
    pub stage: Option<String>,
    pub source: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_contacts(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListContactsQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref stage) = q.stage {
        if !crm::is_valid_stage(stage) {
            return Err(bad_request(format!("unknown stage '{stage}'")));
        }
    }
    let contacts = ctx
        .storage
        .list_contacts(
            &tenant.id,
            q.stage.as_deref(),
            q.source.as_deref(),
            q.limit.unwrap_or(100).clamp(1, 500),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "contacts": contacts })))
}

pub async fn get_contact(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx
        .storage
        .get_contact(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    {
        Some(contact) => Ok(Json(json!({ "contact": contact }))),
        None => Err(not_found("Contact")),
    }
}

#[derive(Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vehicle: Option<String>,
    pub stage: Option<String>,
    pub notes: Option<String>,
}

pub async fn update_contact(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateContactRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref stage) = body.stage {
        if !crm::is_valid_stage(stage) {
            return Err(bad_request(format!("unknown stage '{stage}'")));
        }
    }

    let updated = ctx
        .storage
        .update_contact(
            &tenant.id,
            &id,
            body.name.as_deref(),
            body.email.as_deref(),
            body.phone.as_deref(),
            body.vehicle.as_deref(),
            body.stage.as_deref(),
            body.notes.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Contact"));
    }

    let contact = ctx
        .storage
        .get_contact(&tenant.id, &id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Contact"))?;
    ctx.broadcaster.broadcast(
        &tenant.id,
        "contact.updated",
        json!({ "contact_id": contact.id, "stage": contact.stage }),
    );
    Ok(Json(json!({ "contact": contact })))
}
