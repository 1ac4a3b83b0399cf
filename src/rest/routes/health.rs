use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppContext;

pub async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    let db_ok = ctx.storage.ping().await;
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
        "db_ok": db_ok,
    }))
}
