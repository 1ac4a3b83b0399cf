//! Shipment tracking: a typed client for the carrier aggregator plus the
//! poller that replaces per-browser refresh loops. One poll per active
//! tracking number; new events are inserted idempotently and a change in
//! headline status or ETA goes out over SSE.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::TrackingConfig;
use crate::AppContext;

/// How much of a carrier error body makes it into our error chain.
const BODY_EXCERPT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct TrackingInfo {
    pub status: String,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub events: Vec<TrackingApiEvent>,
}

#[derive(Debug, Deserialize)]
pub struct TrackingApiEvent {
    pub time: String,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// `GET {base_url}/track/{number}` with a bearer key.
pub async fn fetch_tracking(cfg: &TrackingConfig, number: &str) -> Result<TrackingInfo> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?;
    let resp = client
        .get(format!("{}/track/{number}", cfg.base_url))
        .bearer_auth(&cfg.api_key)
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        let end = body
            .char_indices()
            .nth(BODY_EXCERPT)
            .map(|(i, _)| i)
            .unwrap_or(body.len());
        bail!(
            "tracking lookup failed ({}): {}",
            status.as_u16(),
            &body[..end]
        );
    }
    Ok(serde_json::from_str(&body)?)
}

/// Poller: refreshes every active tracking number on an interval
/// (hot-reloadable). Does nothing until a tracking API key is configured.
pub async fn run_tracking_poller(ctx: AppContext) {
    loop {
        let secs = ctx.hot_config.read().await.tracking_poll_secs.max(10);
        tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;

        if ctx.config.tracking.api_key.is_empty() {
            continue;
        }
        match poll_tracked_orders(&ctx).await {
            Ok(n) if n > 0 => info!("Tracking updated for {n} orders"),
            Ok(_) => {}
            Err(e) => warn!("Tracking poller error: {e}"),
        }
    }
}

/// One poller pass over every order with a live shipment. A carrier error
/// on one order doesn't stop the rest.
pub async fn poll_tracked_orders(ctx: &AppContext) -> Result<u64> {
    let orders = ctx.storage.list_orders_with_tracking().await?;
    let mut updated = 0;
    for order in orders {
        let Some(ref number) = order.tracking_number else {
            continue;
        };
        if order.tracking_status.as_deref() == Some("delivered") {
            continue;
        }
        ctx.metrics.inc_tracking_polls();
        let info = match fetch_tracking(&ctx.config.tracking, number).await {
            Ok(info) => info,
            Err(e) => {
                warn!(order_id = %order.id, "tracking fetch failed: {e:#}");
                continue;
            }
        };

        let mut new_events = 0;
        for ev in &info.events {
            let description = ev.description.as_deref().unwrap_or(&ev.status);
            let inserted = ctx
                .storage
                .insert_tracking_event(
                    &order.id,
                    &ev.status,
                    description,
                    ev.location.as_deref(),
                    &ev.time,
                )
                .await?;
            if inserted {
                new_events += 1;
            }
        }

        let status_changed = order.tracking_status.as_deref() != Some(info.status.as_str());
        let eta_changed = order.tracking_eta != info.eta;
        if status_changed || eta_changed {
            ctx.storage
                .update_order_tracking_state(&order.id, &info.status, info.eta.as_deref())
                .await?;
        }
        if status_changed || eta_changed || new_events > 0 {
            ctx.broadcaster.broadcast(
                &order.tenant_id,
                "tracking.updated",
                json!({
                    "order_id": order.id,
                    "status": info.status,
                    "eta": info.eta,
                    "new_events": new_events,
                }),
            );
            updated += 1;
        }
    }
    Ok(updated)
}
