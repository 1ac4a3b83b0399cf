// rest/sse.rs — tenant event stream.
//
// GET /api/v1/events
//
// Replaces the UI's refresh polling: domain events (conversations, posts,
// tracking, proofs) stream out as Server-Sent Events. The handler
// subscribes to the process-wide broadcast channel and forwards only this
// tenant's events.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension,
};
use futures_util::stream;
use serde_json::json;
use std::time::Duration;

use crate::storage::TenantRow;
use crate::AppContext;

pub async fn tenant_events_sse(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
) -> impl IntoResponse {
    let rx = ctx.broadcaster.subscribe();

    let s = stream::unfold((rx, tenant.id.clone()), move |(mut rx, tid)| async move {
        loop {
            match rx.recv().await {
                Ok(raw) => {
                    // Parse the envelope emitted by EventBroadcaster
                    let envelope: serde_json::Value = match serde_json::from_str(&raw) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    let event_tenant = envelope
                        .get("tenant_id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    if event_tenant != tid {
                        // Not our tenant — keep draining
                        continue;
                    }

                    let name = envelope
                        .get("event")
                        .and_then(|v| v.as_str())
                        .unwrap_or("event")
                        .to_string();
                    let data = json!({
                        "event": envelope.get("event"),
                        "payload": envelope.get("payload"),
                    });
                    let sse_event = Event::default().data(data.to_string()).event(name);
                    return Some((Ok::<Event, std::convert::Infallible>(sse_event), (rx, tid)));
                }
                Err(_) => return None,
            }
        }
    });

    Sse::new(s).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
