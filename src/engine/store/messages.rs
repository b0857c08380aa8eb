// Message log and conversation threads. Every stored message upserts its
// conversation row (preview + unread counter) inside the same lock, so the
// thread list can never miss a message that was recorded.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::{Conversation, Message, MessageDirection, MessageStatus, MessageType};
use rusqlite::{params, Connection};

const MESSAGE_COLUMNS: &str = "id, message_id, type, direction, status, text, media_url, \
                               file_name, mime_type, metadata, from_number, to_number, \
                               quoted_message_id, session_id, contact_id, user_id, \
                               created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, phone_number, last_message, last_message_type, \
                                    unread_count, is_archived, session_id, contact_id, \
                                    user_id, created_at, updated_at";

/// Everything needed to record one message. `session_id` is the session
/// row id; `contact_id` links the CRM contact when one matched.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub kind: MessageType,
    pub direction: MessageDirection,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub from: String,
    pub to: String,
    pub quoted_message_id: Option<String>,
    pub session_id: String,
    pub contact_id: Option<String>,
    pub user_id: String,
}

impl Message {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;
        let direction: String = row.get(3)?;
        let status: String = row.get(4)?;
        let metadata: Option<String> = row.get(9)?;
        Ok(Message {
            id: row.get(0)?,
            message_id: row.get(1)?,
            kind: MessageType::parse_lossy(&kind),
            direction: MessageDirection::parse(&direction).unwrap_or(MessageDirection::Incoming),
            status: MessageStatus::parse(&status).unwrap_or(MessageStatus::Pending),
            text: row.get(5)?,
            media_url: row.get(6)?,
            file_name: row.get(7)?,
            mime_type: row.get(8)?,
            metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
            from: row.get(10)?,
            to: row.get(11)?,
            quoted_message_id: row.get(12)?,
            session_id: row.get(13)?,
            contact_id: row.get(14)?,
            user_id: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

impl Conversation {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Conversation {
            id: row.get(0)?,
            phone_number: row.get(1)?,
            last_message: row.get(2)?,
            last_message_type: row.get(3)?,
            unread_count: row.get(4)?,
            is_archived: row.get(5)?,
            session_id: row.get(6)?,
            contact_id: row.get(7)?,
            user_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Upsert the thread row for one peer. Inbound traffic bumps the unread
/// counter; chat sync passes the remote's counter as `seed_unread`, which
/// only applies when the thread is first created.
#[allow(clippy::too_many_arguments)]
fn upsert_conversation(
    conn: &Connection,
    user_id: &str,
    session_id: &str,
    phone_number: &str,
    contact_id: Option<&str>,
    preview: &str,
    kind: &str,
    bump_unread: bool,
    seed_unread: i64,
) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let bump: i64 = if bump_unread { 1 } else { 0 };

    let updated = conn.execute(
        "UPDATE conversations SET
             last_message = ?1,
             last_message_type = ?2,
             contact_id = COALESCE(?3, contact_id),
             unread_count = unread_count + ?4,
             updated_at = ?5
         WHERE user_id = ?6 AND session_id = ?7 AND phone_number = ?8",
        params![preview, kind, contact_id, bump, now, user_id, session_id, phone_number],
    )?;

    if updated == 0 {
        conn.execute(
            "INSERT INTO conversations
                 (id, phone_number, last_message, last_message_type, unread_count,
                  is_archived, session_id, contact_id, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?9)",
            params![
                uuid::Uuid::new_v4().to_string(),
                phone_number,
                preview,
                kind,
                bump + seed_unread,
                session_id,
                contact_id,
                user_id,
                now
            ],
        )?;
    }
    Ok(())
}

impl Store {
    // ── Messages ───────────────────────────────────────────────────────

    /// Record a message and refresh its conversation thread. Inbound
    /// messages start delivered, outbound ones pending until the gateway
    /// confirms them.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<Message> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let status = match msg.direction {
            MessageDirection::Incoming => MessageStatus::Delivered,
            MessageDirection::Outgoing => MessageStatus::Pending,
        };
        let metadata = msg.metadata.as_ref().map(|v| v.to_string());

        conn.execute(
            "INSERT INTO messages
                 (id, message_id, type, direction, status, text, media_url, file_name,
                  mime_type, metadata, from_number, to_number, quoted_message_id,
                  session_id, contact_id, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
            params![
                id,
                msg.message_id,
                msg.kind.as_str(),
                msg.direction.as_str(),
                status.as_str(),
                msg.text,
                msg.media_url,
                msg.file_name,
                msg.mime_type,
                metadata,
                msg.from,
                msg.to,
                msg.quoted_message_id,
                msg.session_id,
                msg.contact_id,
                msg.user_id,
                now
            ],
        )?;

        let peer = match msg.direction {
            MessageDirection::Incoming => &msg.from,
            MessageDirection::Outgoing => &msg.to,
        };
        let preview = msg
            .text
            .as_deref()
            .or(msg.media_url.as_deref())
            .unwrap_or_default();
        upsert_conversation(
            &conn,
            &msg.user_id,
            &msg.session_id,
            peer,
            msg.contact_id.as_deref(),
            preview,
            msg.kind.as_str(),
            msg.direction == MessageDirection::Incoming,
            0,
        )?;

        Ok(Message {
            id,
            message_id: msg.message_id.clone(),
            kind: msg.kind,
            direction: msg.direction,
            status,
            text: msg.text.clone(),
            media_url: msg.media_url.clone(),
            file_name: msg.file_name.clone(),
            mime_type: msg.mime_type.clone(),
            metadata: msg.metadata.clone(),
            from: msg.from.clone(),
            to: msg.to.clone(),
            quoted_message_id: msg.quoted_message_id.clone(),
            session_id: msg.session_id.clone(),
            contact_id: msg.contact_id.clone(),
            user_id: msg.user_id.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Chronological message listing with optional session and peer filters.
    pub fn list_messages(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock();

        let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE user_id = ?1");
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(user_id.to_string())];

        if let Some(sid) = session_id {
            params_vec.push(Box::new(sid.to_string()));
            sql.push_str(&format!(" AND session_id = ?{}", params_vec.len()));
        }
        if let Some(phone) = phone_number {
            params_vec.push(Box::new(phone.to_string()));
            let n = params_vec.len();
            sql.push_str(&format!(" AND (from_number = ?{n} OR to_number = ?{n})"));
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let messages = stmt
            .query_map(param_refs.as_slice(), Message::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }

    pub fn find_message(&self, id: &str, user_id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            Message::from_row,
        );

        match result {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Status update addressed by the gateway-side message id, as webhook
    /// ack events carry that id rather than ours.
    pub fn update_message_status(&self, message_id: &str, status: MessageStatus) -> Result<Option<Message>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE messages SET status = ?1, updated_at = ?2 WHERE message_id = ?3",
            params![status.as_str(), chrono::Utc::now().to_rfc3339(), message_id],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let message = conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"),
            params![message_id],
            Message::from_row,
        )?;
        Ok(Some(message))
    }

    // ── Conversations ──────────────────────────────────────────────────

    /// Active (non-archived) threads, most recently touched first.
    pub fn list_conversations(&self, user_id: &str, session_id: Option<&str>) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();

        let mut sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE user_id = ?1 AND is_archived = 0"
        );
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(user_id.to_string())];

        if let Some(sid) = session_id {
            params_vec.push(Box::new(sid.to_string()));
            sql.push_str(&format!(" AND session_id = ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY updated_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let conversations = stmt
            .query_map(param_refs.as_slice(), Conversation::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(conversations)
    }

    pub fn mark_conversation_read(&self, user_id: &str, session_id: &str, phone_number: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE conversations SET unread_count = 0, updated_at = ?1
             WHERE user_id = ?2 AND session_id = ?3 AND phone_number = ?4",
            params![chrono::Utc::now().to_rfc3339(), user_id, session_id, phone_number],
        )?;
        Ok(n > 0)
    }

    pub fn set_conversation_archived(
        &self,
        user_id: &str,
        session_id: &str,
        phone_number: &str,
        archived: bool,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE conversations SET is_archived = ?1, updated_at = ?2
             WHERE user_id = ?3 AND session_id = ?4 AND phone_number = ?5",
            params![archived, chrono::Utc::now().to_rfc3339(), user_id, session_id, phone_number],
        )?;
        Ok(n > 0)
    }

    /// Preview-only upsert used by chat sync. Existing threads keep their
    /// unread counts; new ones start from the remote's reported counter.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_conversation_preview(
        &self,
        user_id: &str,
        session_id: &str,
        phone_number: &str,
        contact_id: Option<&str>,
        preview: &str,
        kind: &str,
        seed_unread: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        upsert_conversation(
            &conn, user_id, session_id, phone_number, contact_id, preview, kind, false, seed_unread,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(user: &str, session: &str, from: &str, text: &str) -> NewMessage {
        NewMessage {
            message_id: format!("wamid-{}", uuid::Uuid::new_v4()),
            kind: MessageType::Text,
            direction: MessageDirection::Incoming,
            text: Some(text.to_string()),
            media_url: None,
            file_name: None,
            mime_type: None,
            metadata: None,
            from: from.to_string(),
            to: "5511000".to_string(),
            quoted_message_id: None,
            session_id: session.to_string(),
            contact_id: None,
            user_id: user.to_string(),
        }
    }

    #[test]
    fn test_inbound_bumps_unread_outbound_does_not() {
        let store = Store::in_memory().unwrap();
        store.insert_message(&inbound("u1", "s-row", "5511999", "oi")).unwrap();
        store.insert_message(&inbound("u1", "s-row", "5511999", "tudo bem?")).unwrap();

        let mut reply = inbound("u1", "s-row", "5511999", "olá!");
        reply.direction = MessageDirection::Outgoing;
        reply.from = "5511000".to_string();
        reply.to = "5511999".to_string();
        store.insert_message(&reply).unwrap();

        let convs = store.list_conversations("u1", None).unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].phone_number, "5511999");
        assert_eq!(convs[0].unread_count, 2);
        assert_eq!(convs[0].last_message.as_deref(), Some("olá!"));
    }

    #[test]
    fn test_mark_read_resets_counter() {
        let store = Store::in_memory().unwrap();
        store.insert_message(&inbound("u1", "s-row", "5511999", "oi")).unwrap();

        assert!(store.mark_conversation_read("u1", "s-row", "5511999").unwrap());
        let convs = store.list_conversations("u1", None).unwrap();
        assert_eq!(convs[0].unread_count, 0);
        assert!(!store.mark_conversation_read("u1", "s-row", "404").unwrap());
    }

    #[test]
    fn test_inbound_message_starts_delivered() {
        let store = Store::in_memory().unwrap();
        let m = store.insert_message(&inbound("u1", "s-row", "5511999", "oi")).unwrap();
        assert_eq!(m.status, MessageStatus::Delivered);

        let mut out = inbound("u1", "s-row", "5511999", "resp");
        out.direction = MessageDirection::Outgoing;
        let m = store.insert_message(&out).unwrap();
        assert_eq!(m.status, MessageStatus::Pending);
    }

    #[test]
    fn test_status_update_by_gateway_id() {
        let store = Store::in_memory().unwrap();
        let mut out = inbound("u1", "s-row", "5511999", "resp");
        out.direction = MessageDirection::Outgoing;
        out.message_id = "wamid-42".to_string();
        store.insert_message(&out).unwrap();

        let updated = store
            .update_message_status("wamid-42", MessageStatus::Sent)
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, MessageStatus::Sent);
        assert!(store.update_message_status("wamid-nope", MessageStatus::Sent).unwrap().is_none());
    }

    #[test]
    fn test_thread_filter_matches_both_directions() {
        let store = Store::in_memory().unwrap();
        store.insert_message(&inbound("u1", "s-row", "5511999", "oi")).unwrap();
        let mut out = inbound("u1", "s-row", "x", "resposta");
        out.direction = MessageDirection::Outgoing;
        out.from = "5511000".to_string();
        out.to = "5511999".to_string();
        store.insert_message(&out).unwrap();
        store.insert_message(&inbound("u1", "s-row", "5522888", "other peer")).unwrap();

        let thread = store.list_messages("u1", Some("s-row"), Some("5511999")).unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_preview_upsert_seeds_unread_only_on_insert() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_conversation_preview("u1", "s-row", "5511999", None, "last msg", "text", 7)
            .unwrap();
        let convs = store.list_conversations("u1", None).unwrap();
        assert_eq!(convs[0].unread_count, 7);

        // A later sync refreshes the preview but leaves the counter alone.
        store
            .upsert_conversation_preview("u1", "s-row", "5511999", None, "newer", "text", 3)
            .unwrap();
        let convs = store.list_conversations("u1", None).unwrap();
        assert_eq!(convs[0].unread_count, 7);
        assert_eq!(convs[0].last_message.as_deref(), Some("newer"));
    }

    #[test]
    fn test_archived_threads_hidden_from_list() {
        let store = Store::in_memory().unwrap();
        store.insert_message(&inbound("u1", "s-row", "5511999", "oi")).unwrap();
        store
            .set_conversation_archived("u1", "s-row", "5511999", true)
            .unwrap();
        assert!(store.list_conversations("u1", None).unwrap().is_empty());
    }
}
