// Message log and conversation threads. `sessionId` query parameters carry
// the caller-facing session handle; handlers resolve it to the owning row
// before touching the store, so message rows always reference row ids.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Conversation, Message, MessageDirection, MessageType, Session};
use crate::engine::lifecycle::phone_from_jid;
use crate::engine::store::NewMessage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_messages))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:phone_number", get(conversation_messages))
        .route("/conversations/:phone_number/read", post(mark_read))
        .route("/send", post(send_message))
}

// ── Queries and bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    pub session_id: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<Vec<Message>>> {
    let row_id = resolve_session(&state, &user.id, filter.session_id.as_deref())?;
    let messages =
        state
            .store
            .list_messages(&user.id, row_id.as_deref(), filter.phone_number.as_deref())?;
    Ok(Json(messages))
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<SessionFilter>,
) -> Result<Json<Vec<Conversation>>> {
    let row_id = resolve_session(&state, &user.id, filter.session_id.as_deref())?;
    Ok(Json(state.store.list_conversations(&user.id, row_id.as_deref())?))
}

async fn conversation_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(phone_number): Path<String>,
    Query(filter): Query<SessionFilter>,
) -> Result<Json<Vec<Message>>> {
    let session = require_session(&state, &user.id, filter.session_id.as_deref())?;
    Ok(Json(state.store.list_messages(&user.id, Some(&session.id), Some(&phone_number))?))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(phone_number): Path<String>,
    Query(filter): Query<SessionFilter>,
) -> Result<Json<Value>> {
    let session = require_session(&state, &user.id, filter.session_id.as_deref())?;
    state.store.mark_conversation_read(&user.id, &session.id, &phone_number)?;
    Ok(Json(json!({ "message": "Conversation marked as read" })))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<SessionFilter>,
    Json(body): Json<SendMessageBody>,
) -> Result<(StatusCode, Json<Message>)> {
    let session = require_session(&state, &user.id, filter.session_id.as_deref())?;

    match body.kind {
        MessageType::Text => {
            let text = body.text.as_deref().unwrap_or_default();
            state
                .lifecycle
                .send_text(&user.id, &session.session_id, &body.to, text)
                .await?;
        }
        MessageType::Image => {
            let url = body
                .media_url
                .as_deref()
                .ok_or_else(|| Error::validation("mediaUrl is required for image messages"))?;
            state
                .lifecycle
                .send_image(&user.id, &session.session_id, &body.to, url, body.caption.as_deref())
                .await?;
        }
        MessageType::Document => {
            let url = body
                .media_url
                .as_deref()
                .ok_or_else(|| Error::validation("mediaUrl is required for document messages"))?;
            let name = body.file_name.as_deref().unwrap_or("document");
            state
                .lifecycle
                .send_file(&user.id, &session.session_id, &body.to, url, name)
                .await?;
        }
        _ => return Err(Error::validation("Unsupported message type for sending")),
    }

    let contact = state.store.find_contact_by_phone(&user.id, &phone_from_jid(&body.to))?;
    let message = state.store.insert_message(&NewMessage {
        message_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
        kind: body.kind,
        direction: MessageDirection::Outgoing,
        text: body.text.clone(),
        media_url: body.media_url.clone(),
        file_name: body.file_name.clone(),
        mime_type: None,
        metadata: None,
        from: String::new(),
        to: body.to.clone(),
        quoted_message_id: None,
        session_id: session.id.clone(),
        contact_id: contact.map(|c| c.id),
        user_id: user.id.clone(),
    })?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ── Session handle resolution ──────────────────────────────────────────

/// Map an optional session handle to its row id, verifying ownership.
fn resolve_session(state: &AppState, owner: &str, handle: Option<&str>) -> Result<Option<String>> {
    match handle {
        Some(handle) => Ok(Some(state.lifecycle.get_session(owner, handle)?.id)),
        None => Ok(None),
    }
}

fn require_session(state: &AppState, owner: &str, handle: Option<&str>) -> Result<Session> {
    let handle =
        handle.ok_or_else(|| Error::validation("sessionId query parameter is required"))?;
    state.lifecycle.get_session(owner, handle)
}
