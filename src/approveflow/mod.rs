//! ApproveFlow: design proofs and the public approval link.
//!
//! A proof is sent to the customer as a tokenized link — no login, just an
//! HMAC of the proof id under `[approvals].link_secret`. The customer
//! approves or requests changes exactly once; an approval advances the
//! order from design to print.

use anyhow::{bail, Result};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::ApprovalsConfig;
use crate::mail;
use crate::storage::{OrderRow, ProofRow, TenantRow};
use crate::AppContext;

pub const DECISIONS: &[&str] = &["approved", "changes_requested"];

type HmacSha256 = Hmac<Sha256>;

pub fn is_valid_decision(decision: &str) -> bool {
    DECISIONS.contains(&decision)
}

/// Token for a proof's public link: HMAC-SHA256 of the proof id.
pub fn link_token(secret: &str, proof_id: &str) -> Result<String> {
    if secret.is_empty() {
        bail!("approvals link_secret is not configured");
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(proof_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a presented link token. An empty secret rejects
/// everything.
pub fn verify_token(secret: &str, proof_id: &str, token: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(sig) = hex::decode(token.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(proof_id.as_bytes());
    mac.verify_slice(&sig).is_ok()
}

/// The full customer-facing URL for a proof.
pub fn proof_link(cfg: &ApprovalsConfig, proof_id: &str) -> Result<String> {
    let token = link_token(&cfg.link_secret, proof_id)?;
    Ok(format!(
        "{}/public/proofs/{proof_id}?token={token}",
        cfg.public_base_url.trim_end_matches('/')
    ))
}

/// Register a new proof version on an order and email the customer their
/// review link. The email is best-effort; the proof exists either way.
pub async fn register_proof(
    ctx: &AppContext,
    tenant: &TenantRow,
    order: &OrderRow,
    image_url: &str,
    note: Option<&str>,
) -> Result<ProofRow> {
    let proof = ctx
        .storage
        .create_proof(&tenant.id, &order.id, image_url, note)
        .await?;

    if let Some(email) = customer_email(ctx, tenant, order).await? {
        match proof_link(&ctx.config.approvals, &proof.id) {
            Ok(link) => {
                let (subject, body) =
                    mail::proof_request_email(&tenant.name, &order.title, proof.version, &link);
                match ctx
                    .mailer
                    .send(&email, tenant.reply_to_email.as_deref(), &subject, &body)
                    .await
                {
                    Ok(()) => ctx.metrics.inc_emails_sent(),
                    Err(e) => warn!(proof_id = %proof.id, "proof email failed: {e:#}"),
                }
            }
            Err(e) => warn!(proof_id = %proof.id, "no proof link: {e}"),
        }
    }

    ctx.broadcaster.broadcast(
        &tenant.id,
        "proof.created",
        json!({
            "proof_id": proof.id,
            "order_id": order.id,
            "version": proof.version,
        }),
    );
    info!(proof_id = %proof.id, order_id = %order.id, version = proof.version, "proof registered");
    Ok(proof)
}

/// Record a customer decision. Returns false when the proof was already
/// decided (the first decision wins). An approval advances the order from
/// design to print; the shop is notified either way.
pub async fn decide(
    ctx: &AppContext,
    tenant: &TenantRow,
    proof: &ProofRow,
    decision: &str,
    decided_by: &str,
    note: Option<&str>,
) -> Result<bool> {
    if !is_valid_decision(decision) {
        bail!("unknown decision '{decision}'");
    }
    let claimed = ctx
        .storage
        .decide_proof(&proof.id, decision, decided_by, note)
        .await?;
    if !claimed {
        return Ok(false);
    }

    let order = ctx.storage.get_order(&tenant.id, &proof.order_id).await?;
    let order_title = order.as_ref().map(|o| o.title.as_str()).unwrap_or("order");

    if let Some(ref shop_email) = tenant.reply_to_email {
        let (subject, body) = mail::proof_decision_email(order_title, proof.version, decision, note);
        match ctx.mailer.send(shop_email, None, &subject, &body).await {
            Ok(()) => ctx.metrics.inc_emails_sent(),
            Err(e) => warn!(proof_id = %proof.id, "decision email failed: {e:#}"),
        }
    }

    if decision == "approved" {
        let advanced = ctx
            .storage
            .advance_order_stage(&proof.order_id, "design", "print")
            .await?;
        if advanced {
            ctx.broadcaster.broadcast(
                &tenant.id,
                "order.updated",
                json!({ "order_id": proof.order_id, "stage": "print" }),
            );
        }
    }

    ctx.broadcaster.broadcast(
        &tenant.id,
        "proof.decided",
        json!({
            "proof_id": proof.id,
            "order_id": proof.order_id,
            "decision": decision,
        }),
    );
    info!(proof_id = %proof.id, decision, "proof decided");
    Ok(true)
}

/// Janitor hook: for every pending proof past the reminder window, open a
/// follow-up task for the shop and nudge the customer once.
pub async fn send_proof_reminders(ctx: &AppContext) -> Result<u64> {
    let stale = ctx
        .storage
        .list_stale_pending_proofs(ctx.config.approvals.reminder_days)
        .await?;
    let mut reminded = 0;
    for proof in stale {
        let Some(tenant) = ctx.storage.get_tenant(&proof.tenant_id).await? else {
            continue;
        };
        let order = ctx.storage.get_order(&tenant.id, &proof.order_id).await?;
        let order_title = order.as_ref().map(|o| o.title.as_str()).unwrap_or("order");

        if !ctx
            .storage
            .has_open_task_for_ref(&tenant.id, "proof", &proof.id)
            .await?
        {
            ctx.storage
                .create_task(
                    &tenant.id,
                    &format!("Nudge customer on proof v{} for {order_title}", proof.version),
                    None,
                    "proof",
                    Some(&proof.id),
                    None,
                )
                .await?;
        }

        if let Some(order) = order.as_ref() {
            if let Some(email) = customer_email(ctx, &tenant, order).await? {
                if let Ok(link) = proof_link(&ctx.config.approvals, &proof.id) {
                    let (subject, body) = mail::proof_reminder_email(
                        &tenant.name,
                        order_title,
                        proof.version,
                        &link,
                    );
                    match ctx
                        .mailer
                        .send(&email, tenant.reply_to_email.as_deref(), &subject, &body)
                        .await
                    {
                        Ok(()) => ctx.metrics.inc_emails_sent(),
                        Err(e) => warn!(proof_id = %proof.id, "reminder email failed: {e:#}"),
                    }
                }
            }
        }

        ctx.storage.mark_proof_reminded(&proof.id).await?;
        reminded += 1;
    }
    Ok(reminded)
}

async fn customer_email(
    ctx: &AppContext,
    tenant: &TenantRow,
    order: &OrderRow,
) -> Result<Option<String>> {
    let Some(ref contact_id) = order.contact_id else {
        return Ok(None);
    };
    let contact = ctx.storage.get_contact(&tenant.id, contact_id).await?;
    Ok(contact.and_then(|c| c.email))
}
