use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcasts tenant-scoped domain events to all SSE subscribers.
///
/// Events are serialized once as `{ "event", "tenant_id", "payload" }` strings;
/// each subscriber filters on `tenant_id` before forwarding.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event for one tenant.
    pub fn broadcast(&self, tenant_id: &str, event: &str, payload: Value) {
        let envelope = serde_json::json!({
            "event": event,
            "tenant_id": tenant_id,
            "payload": payload,
        });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&envelope).unwrap_or_default());
    }

    /// Subscribe to the raw event stream (all tenants; filter on receipt).
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscriber() {
        let b = EventBroadcaster::new();
        let mut rx = b.subscribe();
        b.broadcast("t1", "order.updated", serde_json::json!({ "order_id": "o1" }));

        let raw = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["event"], "order.updated");
        assert_eq!(v["tenant_id"], "t1");
        assert_eq!(v["payload"]["order_id"], "o1");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_silent() {
        let b = EventBroadcaster::new();
        b.broadcast("t1", "noop", Value::Null);
    }
}
