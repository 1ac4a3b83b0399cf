//! AI-assisted website chat.
//!
//! One inbound customer message drives the whole turn: store it, pull contact
//! details into the CRM, ask the gateway for a reply (falling back to canned
//! copy when it fails), then re-evaluate whether a human should take over.
//! Escalation opens a shop task, emails the shop, and fires an SSE event so
//! the inbox lights up.

pub mod escalation;
pub mod prompts;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::ai::ChatMessage;
use crate::crm::{self, ContactUpsert};
use crate::mail;
use crate::storage::{ConversationRow, TenantRow};
use crate::AppContext;

/// Most recent messages fed back to the gateway as context.
const HISTORY_WINDOW: usize = 20;

/// One inbound chat turn.
#[derive(Debug, Default)]
pub struct IncomingMessage<'a> {
    pub conversation_id: Option<&'a str>,
    pub message: &'a str,
    pub visitor_name: Option<&'a str>,
    pub visitor_email: Option<&'a str>,
    pub visitor_phone: Option<&'a str>,
}

/// What the widget gets back.
#[derive(Debug)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub reply: String,
    pub status: String,
    pub escalated_now: bool,
    pub contact_id: Option<String>,
}

/// The tenant's effective daily AI budget: per-tenant override, else the
/// configured default.
pub fn daily_limit_for(tenant: &TenantRow, default_limit: i64) -> i64 {
    if tenant.ai_daily_limit > 0 {
        tenant.ai_daily_limit
    } else {
        default_limit
    }
}

/// Today's bucket key for `ai_usage`.
pub fn usage_day() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Handle one customer message end to end.
///
/// Returns `Ok(None)` when `conversation_id` does not resolve for this
/// tenant. Closed conversations reopen on a new customer message.
pub async fn handle_message(
    ctx: &AppContext,
    tenant: &TenantRow,
    incoming: IncomingMessage<'_>,
) -> Result<Option<ChatOutcome>> {
    let conversation = match incoming.conversation_id {
        Some(id) => match ctx.storage.get_conversation(&tenant.id, id).await? {
            Some(row) => row,
            None => return Ok(None),
        },
        None => ctx.storage.create_conversation(&tenant.id, "chat").await?,
    };

    if conversation.status == "closed" {
        ctx.storage
            .set_conversation_status(&conversation.id, "open", None)
            .await?;
    }

    // How long did the previous customer message sit unanswered? Only
    // meaningful when the last stored message was theirs.
    let history = ctx
        .storage
        .list_messages(&conversation.id, HISTORY_WINDOW as i64)
        .await?;
    let minutes_unanswered = history
        .last()
        .filter(|m| m.role == "customer")
        .and_then(|m| chrono::DateTime::parse_from_rfc3339(&m.created_at).ok())
        .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_minutes());

    ctx.storage
        .append_message(&conversation.id, "customer", incoming.message)
        .await?;
    ctx.metrics.inc_chat_messages();

    let contact_id = capture_contact(ctx, tenant, &conversation, &incoming).await?;

    // Already with staff: acknowledge without burning a gateway call.
    if conversation.status == "escalated" {
        let reply = prompts::handoff_reply(tenant);
        ctx.storage
            .append_message(&conversation.id, "assistant", &reply)
            .await?;
        ctx.broadcaster.broadcast(
            &tenant.id,
            "conversation.updated",
            serde_json::json!({ "conversation_id": conversation.id }),
        );
        return Ok(Some(ChatOutcome {
            conversation_id: conversation.id.clone(),
            reply,
            status: "escalated".to_string(),
            escalated_now: false,
            contact_id,
        }));
    }

    let reply = generate_reply(ctx, tenant, &conversation, &history, incoming.message).await?;
    ctx.storage
        .append_message(&conversation.id, "assistant", &reply)
        .await?;

    // Re-read for the post-turn counters the escalation rules need.
    let snapshot = ctx
        .storage
        .get_conversation(&tenant.id, &conversation.id)
        .await?
        .unwrap_or(conversation);

    let input = escalation::EscalationInput {
        message: incoming.message,
        ai_failures: snapshot.ai_failures,
        message_count: snapshot.message_count,
        has_contact: contact_id.is_some(),
        minutes_unanswered,
    };
    let mut escalated_now = false;
    let mut status = snapshot.status.clone();
    if let Some(reason) = escalation::evaluate(&input) {
        escalate(ctx, tenant, &snapshot.id, "chat", reason).await?;
        escalated_now = true;
        status = "escalated".to_string();
    }

    ctx.broadcaster.broadcast(
        &tenant.id,
        "conversation.updated",
        serde_json::json!({ "conversation_id": snapshot.id }),
    );

    Ok(Some(ChatOutcome {
        conversation_id: snapshot.id,
        reply,
        status,
        escalated_now,
        contact_id,
    }))
}

/// Pull contact details from the message text and any explicit visitor
/// fields, upsert the CRM row, and link it to the conversation.
async fn capture_contact(
    ctx: &AppContext,
    tenant: &TenantRow,
    conversation: &ConversationRow,
    incoming: &IncomingMessage<'_>,
) -> Result<Option<String>> {
    let extracted = crm::extract_details(incoming.message);
    let email = incoming.visitor_email.or(extracted.email.as_deref());
    let phone = incoming.visitor_phone.or(extracted.phone.as_deref());
    if email.is_none() && phone.is_none() {
        return Ok(conversation.contact_id.clone());
    }

    let (contact, created) = crm::upsert_contact(
        &ctx.storage,
        &tenant.id,
        "chat",
        ContactUpsert {
            name: incoming.visitor_name,
            email,
            phone,
            ..Default::default()
        },
    )
    .await?;
    if created {
        info!(contact_id = %contact.id, "captured lead from chat");
        ctx.broadcaster.broadcast(
            &tenant.id,
            "contact.created",
            serde_json::json!({ "contact_id": contact.id, "source": "chat" }),
        );
    }
    if conversation.contact_id.is_none() {
        ctx.storage
            .set_conversation_contact(&conversation.id, &contact.id)
            .await?;
    }
    Ok(Some(contact.id))
}

/// Ask the gateway for the assistant turn; on failure, count it and fall
/// back to canned copy (errors here never fail the request).
async fn generate_reply(
    ctx: &AppContext,
    tenant: &TenantRow,
    conversation: &ConversationRow,
    history: &[crate::storage::MessageRow],
    message: &str,
) -> Result<String> {
    let materials = ctx.storage.list_materials(&tenant.id).await?;
    let mut msgs = vec![ChatMessage::system(prompts::chat_system_prompt(
        tenant, &materials,
    ))];
    for m in history {
        match m.role.as_str() {
            "customer" => msgs.push(ChatMessage::user(&m.content)),
            "assistant" | "staff" => msgs.push(ChatMessage::assistant(&m.content)),
            _ => {}
        }
    }
    msgs.push(ChatMessage::user(message));

    ctx.storage
        .increment_ai_usage(&tenant.id, &usage_day())
        .await?;
    ctx.metrics.inc_ai_calls();

    match ctx.ai.complete(&msgs, 0.7).await {
        Ok(reply) => {
            ctx.storage.reset_ai_failures(&conversation.id).await?;
            debug!(conversation_id = %conversation.id, "assistant replied");
            Ok(reply)
        }
        Err(e) => {
            warn!(conversation_id = %conversation.id, "gateway call failed: {e}");
            ctx.storage.increment_ai_failures(&conversation.id).await?;
            ctx.metrics.inc_ai_failures();
            Ok(prompts::fallback_reply(tenant))
        }
    }
}

/// Hand a conversation to staff: mark it, open a shop task (once), alert the
/// shop by email, and notify SSE subscribers.
pub async fn escalate(
    ctx: &AppContext,
    tenant: &TenantRow,
    conversation_id: &str,
    channel: &str,
    reason: &str,
) -> Result<()> {
    ctx.storage
        .set_conversation_status(conversation_id, "escalated", Some(reason))
        .await?;
    ctx.metrics.inc_escalations();
    info!(conversation_id, reason, "conversation escalated");

    if !ctx
        .storage
        .has_open_task_for_ref(&tenant.id, "escalation", conversation_id)
        .await?
    {
        ctx.storage
            .create_task(
                &tenant.id,
                &format!("Take over {channel} conversation"),
                Some(reason),
                "escalation",
                Some(conversation_id),
                None,
            )
            .await?;
    }

    if let Some(to) = tenant.reply_to_email.as_deref() {
        let (subject, body) = mail::escalation_email(reason, channel, conversation_id);
        if let Err(e) = ctx.mailer.send(to, None, &subject, &body).await {
            warn!("failed to send escalation email: {e:#}");
        } else {
            ctx.metrics.inc_emails_sent();
        }
    }

    ctx.broadcaster.broadcast(
        &tenant.id,
        "conversation.escalated",
        serde_json::json!({ "conversation_id": conversation_id, "reason": reason }),
    );
    Ok(())
}
