// rest/routes/metrics.rs — GET /api/v1/metrics (Prometheus text format).

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::AppContext;

pub async fn get_metrics(State(ctx): State<AppContext>) -> impl IntoResponse {
    let body = ctx.metrics.render_prometheus();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
