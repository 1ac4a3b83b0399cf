//! Voice/IVR webhook intake.
//!
//! The voice platform POSTs JSON events to `/webhooks/voice`, signed with
//! HMAC-SHA256 over the raw body. Caller turns land in a `channel = phone`
//! conversation; the gateway drafts what the IVR speaks back; hanging up
//! closes the conversation and leaves a callback task when we captured a
//! number.

use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::ai::ChatMessage;
use crate::chat::{self, prompts};
use crate::crm::{self, ContactUpsert};
use crate::storage::TenantRow;
use crate::AppContext;

type HmacSha256 = Hmac<Sha256>;

/// Verify the hex HMAC-SHA256 signature the voice platform puts in
/// `X-Voice-Signature`. An empty shared secret rejects everything; unsigned
/// voice intake is not a supported mode.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&signature).is_ok()
}

/// Events the voice platform sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum VoiceEvent {
    #[serde(rename = "call.started")]
    Started {
        call_id: String,
        /// Caller id, when not withheld.
        from: Option<String>,
    },
    #[serde(rename = "call.transcript")]
    Transcript {
        call_id: String,
        text: String,
        /// "caller" (default) or "ivr".
        speaker: Option<String>,
    },
    #[serde(rename = "call.completed")]
    Completed {
        call_id: String,
        duration_secs: Option<i64>,
    },
}

/// Handle one verified voice event. The returned JSON goes back to the
/// platform; for transcripts it carries the line the IVR should speak.
pub async fn handle_event(
    ctx: &AppContext,
    tenant: &TenantRow,
    event: VoiceEvent,
) -> Result<Value> {
    match event {
        VoiceEvent::Started { call_id, from } => {
            let conversation = ctx.storage.conversation_for_call(&tenant.id, &call_id).await?;
            let caller = from.as_deref().unwrap_or("unknown number");
            ctx.storage
                .append_message(
                    &conversation.id,
                    "system",
                    &format!("Inbound call from {caller}"),
                )
                .await?;
            // Caller id is already a callback number; capture it now.
            if let Some(number) = from.as_deref() {
                let (contact, created) = crm::upsert_contact(
                    &ctx.storage,
                    &tenant.id,
                    "phone",
                    ContactUpsert {
                        phone: Some(number),
                        ..Default::default()
                    },
                )
                .await?;
                if created {
                    info!(contact_id = %contact.id, "captured lead from caller id");
                }
                if conversation.contact_id.is_none() {
                    ctx.storage
                        .set_conversation_contact(&conversation.id, &contact.id)
                        .await?;
                }
            }
            ctx.broadcaster.broadcast(
                &tenant.id,
                "call.started",
                json!({ "conversation_id": conversation.id }),
            );
            Ok(json!({ "ok": true }))
        }

        VoiceEvent::Transcript {
            call_id,
            text,
            speaker,
        } => {
            let conversation = ctx.storage.conversation_for_call(&tenant.id, &call_id).await?;
            if speaker.as_deref() == Some("ivr") {
                ctx.storage
                    .append_message(&conversation.id, "assistant", &text)
                    .await?;
                return Ok(json!({ "ok": true }));
            }
            ctx.storage
                .append_message(&conversation.id, "customer", &text)
                .await?;
            ctx.metrics.inc_chat_messages();
            let reply = draft_ivr_reply(ctx, tenant, &conversation.id, &text).await?;
            ctx.storage
                .append_message(&conversation.id, "assistant", &reply)
                .await?;
            Ok(json!({ "reply": reply }))
        }

        VoiceEvent::Completed {
            call_id,
            duration_secs,
        } => {
            let conversation = ctx.storage.conversation_for_call(&tenant.id, &call_id).await?;
            let contact_id = wrap_up_lead(ctx, tenant, &conversation.id).await?;

            if let Some(ref contact_id) = contact_id {
                if !ctx
                    .storage
                    .has_open_task_for_ref(&tenant.id, "follow_up", contact_id)
                    .await?
                {
                    let contact = ctx.storage.get_contact(&tenant.id, contact_id).await?;
                    let who = contact
                        .as_ref()
                        .map(|c| {
                            c.phone
                                .as_deref()
                                .map(|p| format!("{} ({p})", c.name))
                                .unwrap_or_else(|| c.name.clone())
                        })
                        .unwrap_or_else(|| "caller".to_string());
                    ctx.storage
                        .create_task(
                            &tenant.id,
                            &format!("Call back {who}"),
                            Some("Captured from a completed phone call"),
                            "follow_up",
                            Some(contact_id),
                            None,
                        )
                        .await?;
                }
            }

            ctx.storage
                .set_conversation_status(&conversation.id, "closed", None)
                .await?;
            info!(
                conversation_id = %conversation.id,
                duration_secs = duration_secs.unwrap_or(0),
                "call completed"
            );
            ctx.broadcaster.broadcast(
                &tenant.id,
                "call.completed",
                json!({ "conversation_id": conversation.id, "contact_id": contact_id }),
            );
            Ok(json!({ "ok": true }))
        }
    }
}

/// Draft the IVR's spoken reply. Over-budget or failing gateways fall back
/// to a canned line; a webhook must never 5xx for that.
async fn draft_ivr_reply(
    ctx: &AppContext,
    tenant: &TenantRow,
    conversation_id: &str,
    text: &str,
) -> Result<String> {
    let day = chat::usage_day();
    let used = ctx.storage.ai_calls_today(&tenant.id, &day).await?;
    let limit = chat::daily_limit_for(tenant, ctx.config.ai.daily_limit);
    if used >= limit {
        warn!(tenant_id = %tenant.id, "AI daily limit reached, using canned IVR reply");
        return Ok(canned_ivr_reply(tenant));
    }

    let history = ctx.storage.list_messages(conversation_id, 12).await?;
    let mut msgs = vec![ChatMessage::system(prompts::voice_system_prompt(tenant))];
    for m in &history {
        match m.role.as_str() {
            "customer" => msgs.push(ChatMessage::user(&m.content)),
            "assistant" => msgs.push(ChatMessage::assistant(&m.content)),
            _ => {}
        }
    }
    msgs.push(ChatMessage::user(text));

    ctx.storage.increment_ai_usage(&tenant.id, &day).await?;
    ctx.metrics.inc_ai_calls();
    match ctx.ai.complete(&msgs, 0.5).await {
        Ok(reply) => Ok(reply),
        Err(e) => {
            warn!(conversation_id, "IVR gateway call failed: {e}");
            ctx.storage.increment_ai_failures(conversation_id).await?;
            ctx.metrics.inc_ai_failures();
            Ok(canned_ivr_reply(tenant))
        }
    }
}

fn canned_ivr_reply(tenant: &TenantRow) -> String {
    format!(
        "Thanks for calling {}. Please leave your name and number and the team will call you right back.",
        tenant.name
    )
}

/// Scan the whole call transcript for contact details and merge them into
/// the CRM. Returns the linked contact id, if any.
async fn wrap_up_lead(
    ctx: &AppContext,
    tenant: &TenantRow,
    conversation_id: &str,
) -> Result<Option<String>> {
    let messages = ctx.storage.list_messages(conversation_id, 200).await?;
    let transcript: String = messages
        .iter()
        .filter(|m| m.role == "customer")
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let details = crm::extract_details(&transcript);

    let conversation = ctx
        .storage
        .get_conversation(&tenant.id, conversation_id)
        .await?;
    let existing = conversation.as_ref().and_then(|c| c.contact_id.clone());

    if details.is_empty() {
        return Ok(existing);
    }
    let (contact, _) = crm::upsert_contact(
        &ctx.storage,
        &tenant.id,
        "phone",
        ContactUpsert {
            email: details.email.as_deref(),
            phone: details.phone.as_deref(),
            ..Default::default()
        },
    )
    .await?;
    if existing.is_none() {
        ctx.storage
            .set_conversation_contact(conversation_id, &contact.id)
            .await?;
    }
    Ok(Some(contact.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"type":"call.started","call_id":"c1"}"#;
        let sig = sign("shh", body);
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let sig = sign("shh", b"original");
        assert!(!verify_signature("shh", b"tampered", &sig));
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let sig = sign("", b"body");
        assert!(!verify_signature("", b"body", &sig));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(!verify_signature("shh", b"body", "not-hex"));
    }

    #[test]
    fn events_deserialize_by_type_tag() {
        let event: VoiceEvent =
            serde_json::from_str(r#"{"type":"call.transcript","call_id":"c1","text":"hi"}"#)
                .unwrap();
        assert!(matches!(event, VoiceEvent::Transcript { .. }));
    }

    async fn seeded_tenant(ctx: &AppContext) -> TenantRow {
        ctx.storage
            .create_tenant("Wrap City", "wrap-city", "wk_test", true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn call_started_captures_caller_id_as_contact() {
        let (_dir, ctx) = test_ctx().await;
        let tenant = seeded_tenant(&ctx).await;
        handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Started {
                call_id: "c1".into(),
                from: Some("+1 (555) 123-4567".into()),
            },
        )
        .await
        .unwrap();

        let conversation = ctx.storage.conversation_for_call(&tenant.id, "c1").await.unwrap();
        assert_eq!(conversation.channel, "phone");
        let contact_id = conversation.contact_id.expect("contact linked");
        let contact = ctx
            .storage
            .get_contact(&tenant.id, &contact_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.phone.as_deref(), Some("15551234567"));
        assert_eq!(contact.source, "phone");
    }

    #[tokio::test]
    async fn transcript_turn_gets_spoken_reply() {
        // Gateway is unroutable in tests; the canned line comes back.
        let (_dir, ctx) = test_ctx().await;
        let tenant = seeded_tenant(&ctx).await;
        let response = handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Transcript {
                call_id: "c2".into(),
                text: "do you wrap box trucks?".into(),
                speaker: None,
            },
        )
        .await
        .unwrap();
        let reply = response["reply"].as_str().unwrap();
        assert!(reply.contains("Wrap City"));

        let conversation = ctx.storage.conversation_for_call(&tenant.id, "c2").await.unwrap();
        let msgs = ctx.storage.list_messages(&conversation.id, 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "customer");
        assert_eq!(msgs[1].role, "assistant");
    }

    #[tokio::test]
    async fn completed_call_opens_callback_task_and_closes() {
        let (_dir, ctx) = test_ctx().await;
        let tenant = seeded_tenant(&ctx).await;
        handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Started {
                call_id: "c3".into(),
                from: Some("5551234567".into()),
            },
        )
        .await
        .unwrap();
        handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Completed {
                call_id: "c3".into(),
                duration_secs: Some(95),
            },
        )
        .await
        .unwrap();

        let conversation = ctx.storage.conversation_for_call(&tenant.id, "c3").await.unwrap();
        assert_eq!(conversation.status, "closed");

        let tasks = ctx.storage.list_tasks(&tenant.id, Some("open"), 10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, "follow_up");
        assert!(tasks[0].title.contains("5551234567"));
    }

    #[tokio::test]
    async fn completed_call_extracts_number_from_transcript() {
        let (_dir, ctx) = test_ctx().await;
        let tenant = seeded_tenant(&ctx).await;
        handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Transcript {
                call_id: "c4".into(),
                text: "call me back at 555-987-6543, name's Jake".into(),
                speaker: None,
            },
        )
        .await
        .unwrap();
        handle_event(
            &ctx,
            &tenant,
            VoiceEvent::Completed {
                call_id: "c4".into(),
                duration_secs: None,
            },
        )
        .await
        .unwrap();

        let conversation = ctx.storage.conversation_for_call(&tenant.id, "c4").await.unwrap();
        let contact_id = conversation.contact_id.expect("contact from transcript");
        let contact = ctx
            .storage
            .get_contact(&tenant.id, &contact_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.phone.as_deref(), Some("5559876543"));
    }
}
