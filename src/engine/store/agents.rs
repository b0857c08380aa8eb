// Human support agents. Like users, password hashes only; email unique
// per workspace owner among non-deleted rows.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::{Agent, AgentStatus};
use rusqlite::params;

const COLUMNS: &str = "id, name, email, password_hash, status, active_conversations, \
                       total_conversations, is_active, user_id, created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

impl Agent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        Ok(Agent {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            status: AgentStatus::parse(&status).unwrap_or(AgentStatus::Offline),
            active_conversations: row.get(5)?,
            total_conversations: row.get(6)?,
            is_active: row.get(7)?,
            user_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl Store {
    // ── Agent CRUD ─────────────────────────────────────────────────────

    pub fn insert_agent(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Agent> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO agents
                 (id, name, email, password_hash, status, is_active, user_id,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'offline', 1, ?5, ?6, ?6)",
            params![id, name, email, password_hash, user_id, now],
        )?;

        Ok(Agent {
            id,
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            status: AgentStatus::Offline,
            active_conversations: 0,
            total_conversations: 0,
            is_active: true,
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM agents
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))?;

        let agents = stmt
            .query_map(params![user_id], Agent::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(agents)
    }

    pub fn find_agent(&self, id: &str, user_id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM agents
                 WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
            ),
            params![id, user_id],
            Agent::from_row,
        );

        match result {
            Ok(agent) => Ok(Some(agent)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_agent_by_email(&self, user_id: &str, email: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM agents
                 WHERE user_id = ?1 AND email = ?2 AND deleted_at IS NULL"
            ),
            params![user_id, email],
            Agent::from_row,
        );

        match result {
            Ok(agent) => Ok(Some(agent)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_agent(&self, id: &str, user_id: &str, patch: &AgentPatch) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE agents SET
                 name = COALESCE(?1, name),
                 email = COALESCE(?2, email),
                 password_hash = COALESCE(?3, password_hash),
                 is_active = COALESCE(?4, is_active),
                 updated_at = ?5
             WHERE id = ?6 AND user_id = ?7 AND deleted_at IS NULL",
            params![
                patch.name,
                patch.email,
                patch.password_hash,
                patch.is_active,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let agent = conn.query_row(
            &format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            Agent::from_row,
        )?;
        Ok(Some(agent))
    }

    pub fn set_agent_status(&self, id: &str, user_id: &str, status: AgentStatus) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE agents SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
            params![status.as_str(), chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let agent = conn.query_row(
            &format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            Agent::from_row,
        )?;
        Ok(Some(agent))
    }

    pub fn soft_delete_agent(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE agents SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(n > 0)
    }
}
