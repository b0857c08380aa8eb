// Bulk-send campaigns. Status transition rules are enforced by the API
// layer; the store persists rows and keeps total_recipients in step with
// the recipients list.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::{Campaign, CampaignStatus};
use rusqlite::params;
use serde::Deserialize;

const COLUMNS: &str = "id, name, description, message, recipients, status, \
                       scheduled_at, total_recipients, sent_count, delivered_count, \
                       read_count, failed_count, session_id, user_id, created_at, \
                       updated_at";

/// Partial update; None leaves the column untouched. A new recipients list
/// also rewrites total_recipients.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub scheduled_at: Option<String>,
    pub session_id: Option<String>,
}

impl Campaign {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let recipients: String = row.get(4)?;
        let status: String = row.get(5)?;
        Ok(Campaign {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            message: row.get(3)?,
            recipients: serde_json::from_str(&recipients).unwrap_or_default(),
            status: CampaignStatus::parse(&status).unwrap_or(CampaignStatus::Draft),
            scheduled_at: row.get(6)?,
            total_recipients: row.get(7)?,
            sent_count: row.get(8)?,
            delivered_count: row.get(9)?,
            read_count: row.get(10)?,
            failed_count: row.get(11)?,
            session_id: row.get(12)?,
            user_id: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl Store {
    // ── Campaign CRUD ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_campaign(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
        message: &str,
        recipients: &[String],
        scheduled_at: Option<&str>,
        session_id: &str,
    ) -> Result<Campaign> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let status = if scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };
        let recipients_json = serde_json::to_string(recipients)?;

        conn.execute(
            "INSERT INTO campaigns
                 (id, name, description, message, recipients, status, scheduled_at,
                  total_recipients, session_id, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                name,
                description,
                message,
                recipients_json,
                status.as_str(),
                scheduled_at,
                recipients.len() as i64,
                session_id,
                user_id,
                now
            ],
        )?;

        Ok(Campaign {
            id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            message: message.to_string(),
            recipients: recipients.to_vec(),
            status,
            scheduled_at: scheduled_at.map(|s| s.to_string()),
            total_recipients: recipients.len() as i64,
            sent_count: 0,
            delivered_count: 0,
            read_count: 0,
            failed_count: 0,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn list_campaigns(&self, user_id: &str) -> Result<Vec<Campaign>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM campaigns
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))?;

        let campaigns = stmt
            .query_map(params![user_id], Campaign::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(campaigns)
    }

    pub fn find_campaign(&self, id: &str, user_id: &str) -> Result<Option<Campaign>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM campaigns
                 WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
            ),
            params![id, user_id],
            Campaign::from_row,
        );

        match result {
            Ok(campaign) => Ok(Some(campaign)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_campaign(&self, id: &str, user_id: &str, patch: &CampaignPatch) -> Result<Option<Campaign>> {
        let conn = self.conn.lock();
        let recipients_json = match &patch.recipients {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };
        let total = patch.recipients.as_ref().map(|r| r.len() as i64);

        let n = conn.execute(
            "UPDATE campaigns SET
                 name = COALESCE(?1, name),
                 description = COALESCE(?2, description),
                 message = COALESCE(?3, message),
                 recipients = COALESCE(?4, recipients),
                 total_recipients = COALESCE(?5, total_recipients),
                 scheduled_at = COALESCE(?6, scheduled_at),
                 session_id = COALESCE(?7, session_id),
                 updated_at = ?8
             WHERE id = ?9 AND user_id = ?10 AND deleted_at IS NULL",
            params![
                patch.name,
                patch.description,
                patch.message,
                recipients_json,
                total,
                patch.scheduled_at,
                patch.session_id,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let campaign = conn.query_row(
            &format!("SELECT {COLUMNS} FROM campaigns WHERE id = ?1"),
            params![id],
            Campaign::from_row,
        )?;
        Ok(Some(campaign))
    }

    pub fn set_campaign_status(&self, id: &str, user_id: &str, status: CampaignStatus) -> Result<Option<Campaign>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE campaigns SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
            params![status.as_str(), chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let campaign = conn.query_row(
            &format!("SELECT {COLUMNS} FROM campaigns WHERE id = ?1"),
            params![id],
            Campaign::from_row,
        )?;
        Ok(Some(campaign))
    }

    pub fn soft_delete_campaign(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE campaigns SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(n > 0)
    }
}
