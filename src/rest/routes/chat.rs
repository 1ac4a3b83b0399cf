// rest/routes/chat.rs — the chat widget endpoint and the staff inbox.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::chat::{self, IncomingMessage};
use crate::storage::TenantRow;
use crate::AppContext;

/// 429 guard shared by every endpoint that can reach the gateway.
pub(crate) async fn check_daily_limit(ctx: &AppContext, tenant: &TenantRow) -> Result<(), ApiError> {
    let limit = chat::daily_limit_for(tenant, ctx.config.ai.daily_limit);
    let used = ctx
        .storage
        .ai_calls_today(&tenant.id, &chat::usage_day())
        .await
        .map_err(internal_error)?;
    if used >= limit {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Daily AI limit reached", "limit": limit })),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub conversation_id: Option<String>,
    pub message: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
    pub visitor_phone: Option<String>,
}

/// POST /api/v1/chat — one visitor message in, one reply out.
pub async fn chat(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message is required"));
    }
    check_daily_limit(&ctx, &tenant).await?;

    let incoming = IncomingMessage {
        conversation_id: body.conversation_id.as_deref(),
        message: body.message.trim(),
        visitor_name: body.visitor_name.as_deref(),
        visitor_email: body.visitor_email.as_deref(),
        visitor_phone: body.visitor_phone.as_deref(),
    };
    match chat::handle_message(&ctx, &tenant, incoming)
        .await
        .map_err(internal_error)?
    {
        Some(outcome) => Ok(Json(json!({
            "conversation_id": outcome.conversation_id,
            "reply": outcome.reply,
            "status": outcome.status,
            "escalated": outcome.escalated_now,
            "contact_id": outcome.contact_id,
        }))),
        None => Err(not_found("Conversation")),
    }
}

#[derive(Deserialize)]
pub struct ListConversationsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_conversations(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListConversationsQuery>,
) -> Result<Json<Value>, ApiError> {
    let conversations = ctx
        .storage
        .list_conversations(
            &tenant.id,
            q.status.as_deref(),
            q.limit.unwrap_or(50).clamp(1, 200),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn get_conversation(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(conversation) = ctx
        .storage
        .get_conversation(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Conversation"));
    };
    let messages = ctx
        .storage
        .list_messages(&conversation.id, 200)
        .await
        .map_err(internal_error)?;
    Ok(Json(
        json!({ "conversation": conversation, "messages": messages }),
    ))
}

pub async fn close_conversation(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(conversation) = ctx
        .storage
        .get_conversation(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Conversation"));
    };
    ctx.storage
        .set_conversation_status(&conversation.id, "closed", None)
        .await
        .map_err(internal_error)?;
    ctx.broadcaster.broadcast(
        &tenant.id,
        "conversation.updated",
        json!({ "conversation_id": conversation.id, "status": "closed" }),
    );
    Ok(Json(json!({ "status": "closed" })))
}

#[derive(Deserialize)]
pub struct StaffReplyRequest {
    pub message: String,
}

/// POST /api/v1/conversations/{id}/reply — a human takes the keyboard.
pub async fn staff_reply(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<StaffReplyRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message is required"));
    }
    let Some(conversation) = ctx
        .storage
        .get_conversation(&tenant.id, &id)
        .await
        .map_err(internal_error)?
    else {
        return Err(not_found("Conversation"));
    };

    let message = ctx
        .storage
        .append_message(&conversation.id, "staff", body.message.trim())
        .await
        .map_err(internal_error)?;
    ctx.broadcaster.broadcast(
        &tenant.id,
        "conversation.updated",
        json!({ "conversation_id": conversation.id, "message_id": message.id }),
    );
    Ok(Json(json!({ "message": message })))
}
