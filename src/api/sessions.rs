// Session lifecycle routes plus the chat/contact proxy surface. Sessions are
// always addressed by their caller-facing handle, scoped to the bearer user;
// row ids never appear in URLs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Conversation, Session};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:session_id/chats/sync", get(sync_chats))
        .route("/sessions/:session_id/chats/count", get(chats_count))
        .route("/sessions/:session_id/status", get(session_status))
        .route("/sessions/:session_id/qr", get(qr_code))
        .route("/sessions/:session_id/me", get(me))
        .route("/sessions/:session_id/stop", post(stop_session))
        .route("/sessions/:session_id/send-text", post(send_text))
        .route("/sessions/:session_id/send-image", post(send_image))
        .route("/sessions/:session_id/send-file", post(send_file))
        .route("/sessions/:session_id/chats", get(chats))
        .route("/sessions/:session_id/chats/:chat_id/picture", get(chat_picture))
        .route("/sessions/:session_id/chats/:chat_id/archive", post(archive_chat))
        .route("/sessions/:session_id/chats/:chat_id/unarchive", post(unarchive_chat))
        .route("/sessions/:session_id/chats/:chat_id/messages", get(chat_messages))
        .route("/sessions/:session_id/chats/:chat_id/messages/read", post(mark_chat_read))
        .route("/sessions/:session_id/chats/:chat_id", delete(delete_chat))
        .route("/sessions/:session_id/contacts", get(remote_contacts))
        .route("/sessions/:session_id/contacts/:contact_id", get(remote_contact))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
}

// ── Request bodies ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub name: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextBody {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendImageBody {
    pub to: String,
    pub image_url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFileBody {
    pub to: String,
    pub file_url: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

// ── Lifecycle ──────────────────────────────────────────────────────────

async fn create_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<Session>)> {
    if body.name.trim().len() < 3 {
        return Err(Error::validation("Name must be at least 3 characters"));
    }
    let session = state
        .lifecycle
        .create_session(&user.id, body.name.trim(), body.session_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Session>>> {
    Ok(Json(state.lifecycle.list_sessions(&user.id).await?))
}

async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Session>> {
    Ok(Json(state.lifecycle.get_session(&user.id, &session_id)?))
}

async fn session_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Session>> {
    Ok(Json(state.lifecycle.refresh_status(&user.id, &session_id).await?))
}

async fn qr_code(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    let code = state.lifecycle.qr_code(&user.id, &session_id).await?;
    let qr = if code.is_empty() { Value::Null } else { Value::String(code) };
    Ok(Json(json!({ "qrCode": qr })))
}

async fn stop_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    state.lifecycle.stop_session(&user.id, &session_id).await?;
    Ok(Json(json!({ "message": "Session stopped successfully" })))
}

async fn delete_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    state.lifecycle.delete_session(&user.id, &session_id).await?;
    Ok(Json(json!({ "message": "Session deleted successfully" })))
}

async fn me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.lifecycle.me(&user.id, &session_id).await?))
}

// ── Sending ────────────────────────────────────────────────────────────

async fn send_text(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<SendTextBody>,
) -> Result<Json<Value>> {
    state
        .lifecycle
        .send_text(&user.id, &session_id, &body.to, &body.text)
        .await?;
    Ok(Json(json!({ "message": "Text sent successfully" })))
}

async fn send_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<SendImageBody>,
) -> Result<Json<Value>> {
    state
        .lifecycle
        .send_image(&user.id, &session_id, &body.to, &body.image_url, body.caption.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Image sent successfully" })))
}

async fn send_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<SendFileBody>,
) -> Result<Json<Value>> {
    state
        .lifecycle
        .send_file(&user.id, &session_id, &body.to, &body.file_url, &body.filename)
        .await?;
    Ok(Json(json!({ "message": "File sent successfully" })))
}

// ── Chats ──────────────────────────────────────────────────────────────

async fn chats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(state.lifecycle.chats(&user.id, &session_id).await?))
}

async fn chats_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    let count = state.lifecycle.chats_count(&user.id, &session_id).await?;
    Ok(Json(json!({ "count": count })))
}

async fn sync_chats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Conversation>>> {
    Ok(Json(state.lifecycle.sync_chats(&user.id, &session_id).await?))
}

async fn chat_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Value>>> {
    let messages = state
        .lifecycle
        .chat_messages(&user.id, &session_id, &chat_id, query.limit, query.page)
        .await?;
    Ok(Json(messages))
}

async fn chat_picture(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
) -> Result<String> {
    state.lifecycle.chat_picture(&user.id, &session_id, &chat_id).await
}

async fn archive_chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.lifecycle.archive_chat(&user.id, &session_id, &chat_id).await?;
    Ok(Json(json!({ "message": "Chat archived successfully" })))
}

async fn unarchive_chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.lifecycle.unarchive_chat(&user.id, &session_id, &chat_id).await?;
    Ok(Json(json!({ "message": "Chat unarchived successfully" })))
}

async fn delete_chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.lifecycle.delete_chat(&user.id, &session_id, &chat_id).await?;
    Ok(Json(json!({ "message": "Chat deleted successfully" })))
}

async fn mark_chat_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, chat_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.lifecycle.mark_chat_read(&user.id, &session_id, &chat_id).await?;
    Ok(Json(json!({ "message": "Messages marked as read successfully" })))
}

// ── Remote contacts ────────────────────────────────────────────────────

async fn remote_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(state.lifecycle.remote_contacts(&user.id, &session_id).await?))
}

async fn remote_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((session_id, contact_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    Ok(Json(
        state.lifecycle.remote_contact(&user.id, &session_id, &contact_id).await?,
    ))
}
