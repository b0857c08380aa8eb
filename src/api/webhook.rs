// Inbound gateway events. The gateway cannot authenticate as a user, so the
// owner is resolved from the session row named in the `x-session-id` header.
// Bad events are acknowledged with `success: false` instead of an error
// status, so the remote never retries a poison message.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use log::{info, warn};
use serde_json::{json, Value};

use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Message, MessageDirection, MessageType};
use crate::engine::lifecycle::phone_from_jid;
use crate::engine::store::NewMessage;

pub fn routes() -> Router<AppState> {
    Router::new().route("/waha/message", post(receive_message))
}

async fn receive_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let handle = headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    info!("[webhook] Message event for session '{}'", handle);

    match ingest(&state, handle, &payload).await {
        Ok(_) => Json(json!({ "success": true })),
        Err(e) => {
            warn!("[webhook] Dropped message event: {}", e);
            Json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}

async fn ingest(state: &AppState, handle: &str, payload: &Value) -> Result<Message> {
    if handle.is_empty() {
        return Err(Error::validation("Missing x-session-id header"));
    }
    let session = state
        .store
        .find_session(handle)?
        .ok_or_else(|| Error::not_found("Session not found"))?;

    let message_id = string_at(payload, &["id", "messageId"])
        .ok_or_else(|| Error::validation("Message id is required"))?;
    let from = string_at(payload, &["from", "fromNumber"])
        .ok_or_else(|| Error::validation("Sender is required"))?;
    let to = string_at(payload, &["to", "toNumber"]).unwrap_or_default();
    let text = string_at(payload, &["text", "body"]);
    let kind = MessageType::parse_lossy(payload["type"].as_str().unwrap_or("text"));
    let media_url = string_at(payload, &["mediaUrl"])
        .or_else(|| payload["media"]["url"].as_str().map(str::to_string));
    let file_name = payload["media"]["filename"].as_str().map(str::to_string);
    let mime_type = payload["media"]["mimetype"].as_str().map(str::to_string);
    let quoted = string_at(payload, &["quotedMessageId", "quotedMsgId"]);

    let contact = state
        .store
        .find_contact_by_phone(&session.user_id, &phone_from_jid(&from))?;

    let message = state.store.insert_message(&NewMessage {
        message_id,
        kind,
        direction: MessageDirection::Incoming,
        text: text.clone(),
        media_url,
        file_name,
        mime_type,
        metadata: Some(build_metadata(payload)),
        from: from.clone(),
        to,
        quoted_message_id: quoted,
        session_id: session.id.clone(),
        contact_id: contact.map(|c| c.id),
        user_id: session.user_id.clone(),
    })?;

    // Keyword rules may answer the message; the reply never blocks the ack.
    if kind == MessageType::Text {
        if let Some(text) = text.as_deref() {
            if let Err(e) = state.lifecycle.auto_reply_text(&session, &from, text).await {
                warn!("[webhook] Auto-reply failed: {}", e);
            }
        }
    }

    Ok(message)
}

/// First present string among the candidate keys. Gateways differ on field
/// naming, so each datum has a preference list.
fn string_at(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| payload[*key].as_str()).map(str::to_string)
}

/// The whole payload is archived in the message metadata; only the `isGroup`
/// marker is defaulted when the gateway omits it.
fn build_metadata(payload: &Value) -> Value {
    let mut metadata = payload.clone();
    if let Some(map) = metadata.as_object_mut() {
        map.entry("isGroup").or_insert(Value::Bool(false));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, GatewayConfig, LifecycleConfig};
    use crate::engine::gateway::{Gateway, HttpGateway};
    use crate::engine::lifecycle::Lifecycle;
    use crate::engine::store::Store;
    use std::sync::Arc;

    /// State over an in-memory store. The gateway client is real but is
    /// never reached by these paths (no working session, no matching rule).
    fn state() -> AppState {
        let store = Arc::new(Store::in_memory().unwrap());
        let gateway: Arc<dyn Gateway> =
            Arc::new(HttpGateway::new(&GatewayConfig::default()).unwrap());
        let lifecycle = Arc::new(Lifecycle::new(
            store.clone(),
            gateway,
            LifecycleConfig::default(),
        ));
        AppState { store, lifecycle, auth: AuthConfig::default() }
    }

    #[tokio::test]
    async fn test_ingest_requires_session_header_and_known_session() {
        let state = state();
        let payload = json!({ "id": "m1", "from": "5511999@c.us" });

        let err = ingest(&state, "", &payload).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing x-session-id header");

        let err = ingest(&state, "ghost", &payload).await.unwrap_err();
        assert_eq!(err.to_string(), "Session not found");
    }

    #[tokio::test]
    async fn test_ingest_stores_incoming_message_with_contact_link() {
        let state = state();
        let user = state.store.insert_user("a@b.c", "h", "Ana").unwrap();
        state.store.insert_session("Shop", "shop-main", &user.id).unwrap();
        let contact = state
            .store
            .insert_contact(&user.id, "Alice", "5511999", None, None, None, None)
            .unwrap();

        let payload = json!({
            "messageId": "wamid-1",
            "fromNumber": "5511999@c.us",
            "to": "5511000@c.us",
            "body": "bom dia",
            "type": "text",
            "quotedMsgId": "wamid-0"
        });
        let message = ingest(&state, "shop-main", &payload).await.unwrap();

        assert_eq!(message.message_id, "wamid-1");
        assert_eq!(message.direction, MessageDirection::Incoming);
        assert_eq!(message.kind, MessageType::Text);
        assert_eq!(message.text.as_deref(), Some("bom dia"));
        assert_eq!(message.from, "5511999@c.us");
        assert_eq!(message.quoted_message_id.as_deref(), Some("wamid-0"));
        assert_eq!(message.contact_id.as_deref(), Some(contact.id.as_str()));
        let metadata = message.metadata.unwrap();
        assert_eq!(metadata["isGroup"], json!(false));
        assert_eq!(metadata["body"], json!("bom dia"));

        // The conversation thread was opened with one unread message.
        let threads = state.store.list_conversations(&user.id, None).unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_ingest_media_event_without_text() {
        let state = state();
        let user = state.store.insert_user("a@b.c", "h", "Ana").unwrap();
        state.store.insert_session("Shop", "shop-main", &user.id).unwrap();

        let payload = json!({
            "id": "wamid-2",
            "from": "5511999@c.us",
            "type": "image",
            "media": { "url": "https://cdn.test/p.jpg", "mimetype": "image/jpeg" }
        });
        let message = ingest(&state, "shop-main", &payload).await.unwrap();
        assert_eq!(message.kind, MessageType::Image);
        assert_eq!(message.media_url.as_deref(), Some("https://cdn.test/p.jpg"));
        assert_eq!(message.mime_type.as_deref(), Some("image/jpeg"));
        assert!(message.text.is_none());
        // An unknown sender stores fine, just unlinked.
        assert!(message.contact_id.is_none());
    }

    #[tokio::test]
    async fn test_ingest_rejects_events_missing_identity() {
        let state = state();
        let user = state.store.insert_user("a@b.c", "h", "Ana").unwrap();
        state.store.insert_session("Shop", "shop-main", &user.id).unwrap();

        let err = ingest(&state, "shop-main", &json!({ "from": "x@c.us" })).await.unwrap_err();
        assert_eq!(err.to_string(), "Message id is required");

        let err = ingest(&state, "shop-main", &json!({ "id": "m1" })).await.unwrap_err();
        assert_eq!(err.to_string(), "Sender is required");
    }

    #[test]
    fn test_string_at_prefers_earlier_keys() {
        let payload = json!({ "id": "abc", "messageId": "def" });
        assert_eq!(string_at(&payload, &["id", "messageId"]), Some("abc".into()));
        assert_eq!(string_at(&payload, &["missing", "messageId"]), Some("def".into()));
        assert_eq!(string_at(&payload, &["nope"]), None);
        // Non-string values are not coerced.
        let numeric = json!({ "id": 42 });
        assert_eq!(string_at(&numeric, &["id"]), None);
    }

    #[test]
    fn test_metadata_defaults_is_group() {
        let plain = json!({ "from": "123@c.us" });
        assert_eq!(build_metadata(&plain)["isGroup"], json!(false));

        let group = json!({ "from": "123@g.us", "isGroup": true });
        assert_eq!(build_metadata(&group)["isGroup"], json!(true));
    }
}
