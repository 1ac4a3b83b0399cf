//! Shop to-do list plus the janitor worker.
//!
//! Tasks are opened by the system (escalations, missed calls, stale
//! proofs) or by staff, and deduped by `(kind, ref_id)` so a noisy source
//! never floods the list.

use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::AppContext;

pub const TASK_KINDS: &[&str] = &["manual", "follow_up", "escalation", "proof"];
pub const TASK_STATUSES: &[&str] = &["open", "done", "dismissed"];

/// Hourly housekeeping pass.
const JANITOR_INTERVAL_SECS: u64 = 3600;

pub fn is_valid_kind(kind: &str) -> bool {
    TASK_KINDS.contains(&kind)
}

pub fn is_valid_status(status: &str) -> bool {
    TASK_STATUSES.contains(&status)
}

/// Janitor: closes idle conversations and nudges stale proofs, once an
/// hour. Each chore fails independently.
pub async fn run_janitor(ctx: AppContext) {
    let mut ticker = interval(Duration::from_secs(JANITOR_INTERVAL_SECS));
    loop {
        ticker.tick().await;

        let idle_days = ctx.config.janitor.conversation_idle_days;
        match ctx.storage.close_idle_conversations(idle_days).await {
            Ok(n) if n > 0 => info!("Closed {n} idle conversations"),
            Ok(_) => {}
            Err(e) => warn!("Janitor error closing idle conversations: {e}"),
        }

        match crate::approveflow::send_proof_reminders(&ctx).await {
            Ok(n) if n > 0 => info!("Sent {n} proof reminders"),
            Ok(_) => {}
            Err(e) => warn!("Janitor error sending proof reminders: {e}"),
        }
    }
}
