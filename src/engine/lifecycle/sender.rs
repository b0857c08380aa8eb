// Send gate and outbound sends. The gate is a pure precondition on the
// cached row: it refuses before any gateway call and never retries. A stop
// racing a send that already passed the gate is settled by the gateway,
// not here.

use log::{debug, info};
use serde_json::json;

use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Message, MessageDirection, MessageType, Session, SessionStatus};
use crate::engine::gateway::SendReceipt;
use crate::engine::keywords;
use crate::engine::store::NewMessage;

use super::manager::Lifecycle;

/// Refuse unless the cached row says the session is paired and running.
pub(crate) fn require_working(session: &Session) -> Result<()> {
    if session.status != SessionStatus::Working {
        return Err(Error::NotReadyForSend("Session is not working".into()));
    }
    Ok(())
}

impl Lifecycle {
    pub async fn send_text(
        &self,
        owner: &str,
        session_id: &str,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        let row = self.find_owned(owner, session_id)?;
        require_working(&row)?;
        let slot = self.slot_for(&row)?;

        let receipt = self.gateway.send_text(&slot, to, text).await?;
        info!("[lifecycle] Text sent via '{}' to {}", session_id, to);
        Ok(receipt)
    }

    pub async fn send_image(
        &self,
        owner: &str,
        session_id: &str,
        to: &str,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt> {
        let row = self.find_owned(owner, session_id)?;
        require_working(&row)?;
        let slot = self.slot_for(&row)?;

        let receipt = self.gateway.send_image(&slot, to, image_url, caption).await?;
        info!("[lifecycle] Image sent via '{}' to {}", session_id, to);
        Ok(receipt)
    }

    pub async fn send_file(
        &self,
        owner: &str,
        session_id: &str,
        to: &str,
        file_url: &str,
        filename: &str,
    ) -> Result<SendReceipt> {
        let row = self.find_owned(owner, session_id)?;
        require_working(&row)?;
        let slot = self.slot_for(&row)?;

        let receipt = self.gateway.send_file(&slot, to, file_url, filename).await?;
        info!("[lifecycle] File '{}' sent via '{}' to {}", filename, session_id, to);
        Ok(receipt)
    }

    /// Answer an inbound text with the first matching keyword rule, if any.
    /// The send gate decides whether the reply may go out; a refused or
    /// failed send yields `None`, so ingestion never blocks on replies.
    /// The recorded message carries an `auto_` id and an `autoReply` marker.
    pub async fn auto_reply_text(
        &self,
        session: &Session,
        peer: &str,
        text: &str,
    ) -> Result<Option<Message>> {
        let Some(rule) = keywords::find_matching(&self.store, &session.user_id, text)? else {
            return Ok(None);
        };

        info!(
            "[lifecycle] Keyword '{}' matched, replying via '{}'",
            rule.keyword, session.session_id
        );
        match self
            .send_text(&session.user_id, &session.session_id, peer, &rule.response)
            .await
        {
            Ok(_) => {
                let reply = self.store.insert_message(&NewMessage {
                    message_id: format!("auto_{}", uuid::Uuid::new_v4().simple()),
                    kind: MessageType::Text,
                    direction: MessageDirection::Outgoing,
                    text: Some(rule.response.clone()),
                    media_url: None,
                    file_name: None,
                    mime_type: None,
                    metadata: Some(json!({ "autoReply": true, "keywordId": rule.id })),
                    from: String::new(),
                    to: peer.to_string(),
                    quoted_message_id: None,
                    session_id: session.id.clone(),
                    contact_id: None,
                    user_id: session.user_id.clone(),
                })?;
                Ok(Some(reply))
            }
            Err(e) => {
                debug!("[lifecycle] Auto-reply skipped for '{}': {}", session.session_id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::Store;

    #[test]
    fn test_gate_requires_working() {
        let store = Store::in_memory().unwrap();
        let row = store.insert_session("Shop", "s1", "u1").unwrap();

        let starting = store.session_by_row_id(&row.id).unwrap().unwrap();
        assert!(matches!(require_working(&starting), Err(Error::NotReadyForSend(_))));

        store.set_session_working(&row.id, None, None).unwrap();
        let working = store.session_by_row_id(&row.id).unwrap().unwrap();
        assert!(require_working(&working).is_ok());

        store.set_session_status(&row.id, SessionStatus::Stopped).unwrap();
        let stopped = store.session_by_row_id(&row.id).unwrap().unwrap();
        assert!(matches!(require_working(&stopped), Err(Error::NotReadyForSend(_))));
    }
}
