// rest/mod.rs — HTTP API server.
//
// One axum router for the whole product. Tenant endpoints live under
// /api/v1 behind bearer api-key auth; webhooks and the public proof pages
// authenticate themselves (HMAC signature / link token) and stay outside
// the middleware.
//
// Endpoints:
//   GET   /api/v1/health
//   GET   /api/v1/metrics                      (Prometheus text)
//   POST  /api/v1/tenants                      (admin token)
//   GET   /api/v1/tenant
//   PATCH /api/v1/tenant
//   POST  /api/v1/contacts          GET /api/v1/contacts
//   GET   /api/v1/contacts/{id}     PATCH /api/v1/contacts/{id}
//   POST  /api/v1/chat
//   GET   /api/v1/conversations     GET /api/v1/conversations/{id}
//   POST  /api/v1/conversations/{id}/close
//   POST  /api/v1/conversations/{id}/reply
//   GET   /api/v1/events                       (SSE)
//   GET   /api/v1/vehicles/match
//   GET   /api/v1/materials         POST /api/v1/materials
//   POST  /api/v1/quotes            GET /api/v1/quotes
//   GET   /api/v1/quotes/{id}       PATCH /api/v1/quotes/{id}
//   POST  /api/v1/quotes/{id}/send
//   POST  /api/v1/orders            GET /api/v1/orders
//   GET   /api/v1/orders/{id}       PATCH /api/v1/orders/{id}
//   POST  /api/v1/orders/{id}/tracking
//   GET   /api/v1/orders/{id}/tracking         (tracking card)
//   POST  /api/v1/orders/{id}/proofs
//   GET   /api/v1/orders/{id}/proofs
//   POST  /api/v1/campaigns         GET /api/v1/campaigns
//   GET   /api/v1/campaigns/{id}    PATCH /api/v1/campaigns/{id}
//   POST  /api/v1/campaigns/{id}/generate
//   GET   /api/v1/campaigns/{id}/creatives
//   PATCH /api/v1/creatives/{id}
//   POST  /api/v1/posts             GET /api/v1/posts
//   GET   /api/v1/posts/{id}
//   GET   /api/v1/social/connect
//   POST  /api/v1/tasks             GET /api/v1/tasks
//   PATCH /api/v1/tasks/{id}
//   GET   /public/proofs/{id}                  (link token)
//   POST  /public/proofs/{id}/decision         (link token)
//   POST  /webhooks/voice/{slug}               (HMAC signature)
//   GET   /webhooks/instagram/callback         (signed state)

pub mod auth;
pub mod routes;
pub mod sse;

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: AppContext) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: AppContext) -> Router {
    // Tenant API: every handler here sees a TenantRow extension.
    let api = Router::new()
        .route(
            "/api/v1/tenant",
            get(routes::tenants::get_tenant).patch(routes::tenants::update_tenant),
        )
        // Contacts
        .route(
            "/api/v1/contacts",
            get(routes::contacts::list_contacts).post(routes::contacts::create_contact),
        )
        .route(
            "/api/v1/contacts/{id}",
            get(routes::contacts::get_contact).patch(routes::contacts::update_contact),
        )
        // Chat
        .route("/api/v1/chat", post(routes::chat::chat))
        .route(
            "/api/v1/conversations",
            get(routes::chat::list_conversations),
        )
        .route(
            "/api/v1/conversations/{id}",
            get(routes::chat::get_conversation),
        )
        .route(
            "/api/v1/conversations/{id}/close",
            post(routes::chat::close_conversation),
        )
        .route(
            "/api/v1/conversations/{id}/reply",
            post(routes::chat::staff_reply),
        )
        // Events (SSE)
        .route("/api/v1/events", get(sse::tenant_events_sse))
        // Quoting
        .route("/api/v1/vehicles/match", get(routes::quotes::match_vehicle))
        .route(
            "/api/v1/materials",
            get(routes::quotes::list_materials).post(routes::quotes::create_material),
        )
        .route(
            "/api/v1/quotes",
            get(routes::quotes::list_quotes).post(routes::quotes::create_quote),
        )
        .route(
            "/api/v1/quotes/{id}",
            get(routes::quotes::get_quote).patch(routes::quotes::update_quote),
        )
        .route("/api/v1/quotes/{id}/send", post(routes::quotes::send_quote))
        // Orders (ShopFlow)
        .route(
            "/api/v1/orders",
            get(routes::orders::list_orders).post(routes::orders::create_order),
        )
        .route(
            "/api/v1/orders/{id}",
            get(routes::orders::get_order).patch(routes::orders::update_order),
        )
        .route(
            "/api/v1/orders/{id}/tracking",
            get(routes::orders::tracking_card).post(routes::orders::attach_tracking),
        )
        // Proofs (ApproveFlow, staff side)
        .route(
            "/api/v1/orders/{id}/proofs",
            get(routes::proofs::list_proofs).post(routes::proofs::create_proof),
        )
        // Campaigns & the calendar
        .route(
            "/api/v1/campaigns",
            get(routes::campaigns::list_campaigns).post(routes::campaigns::create_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}",
            get(routes::campaigns::get_campaign).patch(routes::campaigns::update_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}/generate",
            post(routes::campaigns::generate),
        )
        .route(
            "/api/v1/campaigns/{id}/creatives",
            get(routes::campaigns::list_creatives),
        )
        .route(
            "/api/v1/creatives/{id}",
            patch(routes::campaigns::update_creative),
        )
        .route(
            "/api/v1/posts",
            get(routes::campaigns::list_posts).post(routes::campaigns::create_post),
        )
        .route("/api/v1/posts/{id}", get(routes::campaigns::get_post))
        // Social connect
        .route("/api/v1/social/connect", get(routes::social::connect))
        // Tasks
        .route(
            "/api/v1/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route("/api/v1/tasks/{id}", patch(routes::tasks::update_task))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_tenant_auth,
        ));

    // Self-authenticating surface: health, metrics, admin tenant creation,
    // public proof pages, webhooks.
    let open = Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/metrics", get(routes::metrics::get_metrics))
        .route("/api/v1/tenants", post(routes::tenants::create_tenant))
        .route("/public/proofs/{id}", get(routes::proofs::public_proof))
        .route(
            "/public/proofs/{id}/decision",
            post(routes::proofs::public_decision),
        )
        .route(
            "/webhooks/voice/{slug}",
            post(routes::webhooks::voice_webhook),
        )
        .route(
            "/webhooks/instagram/callback",
            get(routes::webhooks::instagram_callback),
        );

    Router::new()
        .merge(api)
        .merge(open)
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::count_requests,
        ))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
