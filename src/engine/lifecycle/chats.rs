// Chat, contact, and profile proxies, plus the chat→conversation sync that
// mirrors the remote chat list into local contacts and conversation
// previews. Proxies are straight pass-throughs; the sync is the only part
// with local side effects.

use log::{debug, info};
use serde_json::Value;

use crate::atoms::error::Result;
use crate::atoms::types::Conversation;
use crate::engine::store::ContactPatch;

use super::manager::Lifecycle;
use super::sender::require_working;

impl Lifecycle {
    /// Raw remote chat list. Not gated on working: a half-paired session
    /// legitimately answers with an empty list or a gateway error.
    pub async fn chats(&self, owner: &str, session_id: &str) -> Result<Vec<Value>> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.chats(&slot).await?)
    }

    pub async fn chats_count(&self, owner: &str, session_id: &str) -> Result<usize> {
        let row = self.find_owned(owner, session_id)?;
        require_working(&row)?;
        let slot = self.slot_for(&row)?;

        let chats = self.gateway.chats(&slot).await?;
        debug!("[lifecycle] Found {} chats for session '{}'", chats.len(), session_id);
        Ok(chats.len())
    }

    /// Pull the remote chat list and mirror it into contacts and
    /// conversation previews. Unread counts are seeded from the remote
    /// only when a conversation is first seen; after that the webhook
    /// feed owns them. Returns the conversations for the session, newest
    /// activity first.
    pub async fn sync_chats(&self, owner: &str, session_id: &str) -> Result<Vec<Conversation>> {
        let row = self.find_owned(owner, session_id)?;
        require_working(&row)?;
        let slot = self.slot_for(&row)?;

        let chats = self.gateway.chats(&slot).await?;
        info!("[lifecycle] Syncing {} chats for session '{}'", chats.len(), session_id);

        for chat in &chats {
            let Some(chat_id) = chat_handle(chat) else {
                debug!("[lifecycle] Skipping chat with no id");
                continue;
            };
            let phone = phone_from_chat_id(&chat_id);
            let name = chat_name(chat, &phone);

            let contact = match self.store.find_contact_by_phone(owner, &phone)? {
                Some(existing) => {
                    // Group subjects and pushnames change; follow them,
                    // but never downgrade a real name to the bare number.
                    if existing.name != name && name != phone {
                        let patch =
                            ContactPatch { name: Some(name.clone()), ..Default::default() };
                        self.store.update_contact(&existing.id, owner, &patch)?.unwrap_or(existing)
                    } else {
                        existing
                    }
                }
                None => {
                    self.store.insert_contact(owner, &name, &phone, None, None, None, None)?
                }
            };

            let last = chat.get("lastMessage");
            let preview = chat_preview(last);
            let kind = last.and_then(|m| m.get("type")).and_then(|t| t.as_str()).unwrap_or("text");
            let seed_unread = chat.get("unreadCount").and_then(|v| v.as_i64()).unwrap_or(0);

            self.store.upsert_conversation_preview(
                owner,
                &row.id,
                &phone,
                Some(&contact.id),
                &preview,
                kind,
                seed_unread,
            )?;
        }

        self.store.list_conversations(owner, Some(&row.id))
    }

    pub async fn chat_messages(
        &self,
        owner: &str,
        session_id: &str,
        chat_id: &str,
        limit: Option<u32>,
        page: Option<u32>,
    ) -> Result<Vec<Value>> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.chat_messages(&slot, chat_id, limit, page).await?)
    }

    pub async fn chat_picture(&self, owner: &str, session_id: &str, chat_id: &str) -> Result<String> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.chat_picture(&slot, chat_id).await?)
    }

    /// Archive on the gateway, then mirror the flag onto the local
    /// conversation when one exists for the chat.
    pub async fn archive_chat(&self, owner: &str, session_id: &str, chat_id: &str) -> Result<()> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        self.gateway.archive_chat(&slot, chat_id).await?;
        self.store.set_conversation_archived(owner, &row.id, &phone_from_chat_id(chat_id), true)?;
        Ok(())
    }

    pub async fn unarchive_chat(&self, owner: &str, session_id: &str, chat_id: &str) -> Result<()> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        self.gateway.unarchive_chat(&slot, chat_id).await?;
        self.store.set_conversation_archived(owner, &row.id, &phone_from_chat_id(chat_id), false)?;
        Ok(())
    }

    pub async fn delete_chat(&self, owner: &str, session_id: &str, chat_id: &str) -> Result<()> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.delete_chat(&slot, chat_id).await?)
    }

    /// Mark read on the gateway and zero the local unread counter.
    pub async fn mark_chat_read(&self, owner: &str, session_id: &str, chat_id: &str) -> Result<()> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        self.gateway.mark_read(&slot, chat_id).await?;
        self.store.mark_conversation_read(owner, &row.id, &phone_from_chat_id(chat_id))?;
        Ok(())
    }

    pub async fn remote_contacts(&self, owner: &str, session_id: &str) -> Result<Vec<Value>> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.contacts(&slot).await?)
    }

    pub async fn remote_contact(
        &self,
        owner: &str,
        session_id: &str,
        contact_id: &str,
    ) -> Result<Value> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.contact(&slot, contact_id).await?)
    }

    /// Paired account profile, straight from the gateway.
    pub async fn me(&self, owner: &str, session_id: &str) -> Result<Value> {
        let row = self.find_owned(owner, session_id)?;
        let slot = self.slot_for(&row)?;
        Ok(self.gateway.me(&slot).await?)
    }
}

// ── Chat payload picking ───────────────────────────────────────────────────
// Gateway engines disagree about chat shapes; these pick the usable parts
// and fall back instead of failing the whole sync on one odd chat.

/// Chat id, accepting the string, `{_serialized}` object, and `chatId`
/// variants the gateway engines produce.
fn chat_handle(chat: &Value) -> Option<String> {
    if let Some(s) = chat.get("id").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    if let Some(s) = chat.pointer("/id/_serialized").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    chat.get("chatId").and_then(|v| v.as_str()).map(str::to_string)
}

/// Chat ids are JIDs; the part before the suffix is the phone number
/// (or group id).
fn phone_from_chat_id(chat_id: &str) -> String {
    chat_id.trim_end_matches("@c.us").trim_end_matches("@g.us").to_string()
}

/// Display name cascade: `name` (string or group object), then
/// `pushname` / `contactName` / `subject`, then the bare number.
fn chat_name(chat: &Value, phone: &str) -> String {
    if let Some(name) = chat.get("name") {
        if let Some(s) = name.as_str() {
            if !s.is_empty() {
                return s.to_string();
            }
        } else if name.is_object() {
            for key in ["name", "subject", "formattedName"] {
                if let Some(s) = name.get(key).and_then(|v| v.as_str()) {
                    if !s.is_empty() {
                        return s.to_string();
                    }
                }
            }
        }
    }

    for key in ["pushname", "contactName", "subject"] {
        if let Some(s) = chat.get(key).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }

    phone.to_string()
}

/// Readable one-line preview of the chat's last message: its text if it
/// has any, a media label otherwise.
fn chat_preview(last: Option<&Value>) -> String {
    let Some(msg) = last else {
        return String::new();
    };

    if let Some(s) = msg.as_str() {
        return truncate_preview(s);
    }

    for key in ["body", "text", "message", "content", "caption"] {
        if let Some(s) = msg.get(key).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return truncate_preview(s);
            }
        }
    }

    let kind = msg
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let label = match kind.as_str() {
        "image" | "photo" => "📷 Image",
        "video" => "🎥 Video",
        "audio" | "ptt" => "🎵 Audio",
        "document" | "file" => "📄 Document",
        "location" => "📍 Location",
        "contact" | "vcard" => "👤 Contact",
        "sticker" => "😀 Sticker",
        _ => "[Message]",
    };
    label.to_string()
}

fn truncate_preview(s: &str) -> String {
    if s.chars().count() <= 200 {
        s.to_string()
    } else {
        s.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_handle_variants() {
        assert_eq!(
            chat_handle(&json!({"id": "5511999@c.us"})).as_deref(),
            Some("5511999@c.us")
        );
        assert_eq!(
            chat_handle(&json!({"id": {"_serialized": "5511999@c.us"}})).as_deref(),
            Some("5511999@c.us")
        );
        assert_eq!(chat_handle(&json!({"chatId": "g1@g.us"})).as_deref(), Some("g1@g.us"));
        assert!(chat_handle(&json!({"name": "no id"})).is_none());
    }

    #[test]
    fn test_phone_from_chat_id_strips_jid_suffixes() {
        assert_eq!(phone_from_chat_id("5511999@c.us"), "5511999");
        assert_eq!(phone_from_chat_id("1234-5678@g.us"), "1234-5678");
        assert_eq!(phone_from_chat_id("5511999"), "5511999");
    }

    #[test]
    fn test_chat_name_cascade() {
        assert_eq!(chat_name(&json!({"name": "Alice"}), "5511"), "Alice");
        assert_eq!(chat_name(&json!({"name": {"subject": "Team"}}), "5511"), "Team");
        assert_eq!(chat_name(&json!({"pushname": "Bob"}), "5511"), "Bob");
        assert_eq!(chat_name(&json!({"subject": "Group"}), "5511"), "Group");
        assert_eq!(chat_name(&json!({}), "5511"), "5511");
        // Empty strings fall through instead of winning the cascade.
        assert_eq!(chat_name(&json!({"name": "", "pushname": "Bob"}), "5511"), "Bob");
    }

    #[test]
    fn test_chat_preview_text_and_labels() {
        assert_eq!(chat_preview(Some(&json!("hi there"))), "hi there");
        assert_eq!(chat_preview(Some(&json!({"body": "hello"}))), "hello");
        assert_eq!(chat_preview(Some(&json!({"caption": "pic!"}))), "pic!");
        assert_eq!(chat_preview(Some(&json!({"type": "image"}))), "📷 Image");
        assert_eq!(chat_preview(Some(&json!({"type": "ptt"}))), "🎵 Audio");
        assert_eq!(chat_preview(Some(&json!({"type": "warble"}))), "[Message]");
        assert_eq!(chat_preview(None), "");
    }

    #[test]
    fn test_preview_truncation_is_char_safe() {
        let long = "á".repeat(300);
        let preview = chat_preview(Some(&serde_json::Value::String(long)));
        assert_eq!(preview.chars().count(), 200);
    }
}
