pub mod campaigns;
pub mod chat;
pub mod contacts;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod proofs;
pub mod quotes;
pub mod social;
pub mod tasks;
pub mod tenants;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn internal_error(e: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

pub(crate) fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
}

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": msg.into() })),
    )
}
