// WhatsApp session rows. The row is a cache of the last-observed gateway
// state: status writes always derive is_active from the status so the
// invariant (inactive exactly in failed/stopped) cannot drift.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::{Session, SessionStatus};
use rusqlite::params;

const COLUMNS: &str = "id, name, session_id, status, qr_code, phone_number, \
                       profile_name, profile_picture, is_active, user_id, \
                       created_at, updated_at";

impl Session {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(3)?;
        Ok(Session {
            id: row.get(0)?,
            name: row.get(1)?,
            session_id: row.get(2)?,
            status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Starting),
            qr_code: row.get(4)?,
            phone_number: row.get(5)?,
            profile_name: row.get(6)?,
            profile_picture: row.get(7)?,
            is_active: row.get(8)?,
            user_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl Store {
    // ── Session rows ───────────────────────────────────────────────────

    /// Insert a fresh row in `starting`. The partial unique index on
    /// session_id turns a concurrent duplicate into Error::Conflict.
    pub fn insert_session(&self, name: &str, session_id: &str, user_id: &str) -> Result<Session> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO whatsapp_sessions
                 (id, name, session_id, status, is_active, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'starting', 1, ?4, ?5, ?5)",
            params![id, name, session_id, user_id, now],
        )?;

        Ok(Session {
            id,
            name: name.to_string(),
            session_id: session_id.to_string(),
            status: SessionStatus::Starting,
            qr_code: None,
            phone_number: None,
            profile_name: None,
            profile_picture: None,
            is_active: true,
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look up a non-deleted row by its user-facing handle.
    pub fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM whatsapp_sessions
                 WHERE session_id = ?1 AND deleted_at IS NULL"
            ),
            params![session_id],
            Session::from_row,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a non-deleted row by its primary key.
    pub fn session_by_row_id(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM whatsapp_sessions
                 WHERE id = ?1 AND deleted_at IS NULL"
            ),
            params![id],
            Session::from_row,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All non-deleted rows for one user, newest first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM whatsapp_sessions
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))?;

        let sessions = stmt
            .query_map(params![user_id], Session::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(sessions)
    }

    // ── Status writes ──────────────────────────────────────────────────

    pub fn set_session_status(&self, id: &str, status: SessionStatus) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE whatsapp_sessions SET status = ?1, is_active = ?2, updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL",
            params![
                status.as_str(),
                status.implies_active(),
                chrono::Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    /// Mark a row working and capture the account identity when the gateway
    /// reported one. Absent identity fields leave the stored values alone.
    pub fn set_session_working(
        &self,
        id: &str,
        phone_number: Option<&str>,
        profile_name: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE whatsapp_sessions SET
                 status = 'working',
                 is_active = 1,
                 phone_number = COALESCE(?1, phone_number),
                 profile_name = COALESCE(?2, profile_name),
                 updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL",
            params![phone_number, profile_name, chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Cache a pairing code without touching the status. Used while the
    /// create poll is still converging.
    pub fn cache_qr(&self, id: &str, qr_code: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE whatsapp_sessions SET qr_code = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![qr_code, chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Persist a freshly fetched pairing code and move the row to qrcode.
    pub fn store_fresh_qr(&self, id: &str, qr_code: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE whatsapp_sessions SET qr_code = ?1, status = 'qrcode', is_active = 1,
                 updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![qr_code, chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Reuse a resting row for a fresh connection attempt: back to
    /// `starting` with the pairing code and cached account identity wiped.
    /// The next attempt may link a different account, so nothing from the
    /// previous pairing is allowed to leak through.
    pub fn reset_session_for_restart(&self, id: &str, name: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE whatsapp_sessions SET
                 name = ?1, status = 'starting', is_active = 1, qr_code = NULL,
                 phone_number = NULL, profile_name = NULL, profile_picture = NULL,
                 updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![name, chrono::Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let session = conn.query_row(
            &format!("SELECT {COLUMNS} FROM whatsapp_sessions WHERE id = ?1"),
            params![id],
            Session::from_row,
        )?;
        Ok(Some(session))
    }

    /// Soft delete. The handle becomes free for reuse immediately because
    /// the uniqueness index only covers non-deleted rows.
    pub fn soft_delete_session(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE whatsapp_sessions SET deleted_at = ?1, is_active = 0, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    // ── Gateway slot assignments ───────────────────────────────────────
    // Maps a logical handle to the physical gateway session name. Survives
    // row resets; keyed by handle so a recreated session keeps its slot.

    pub fn slot_for_session(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT slot FROM gateway_slots WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        );

        match result {
            Ok(slot) => Ok(Some(slot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn assign_slot(&self, session_id: &str, slot: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO gateway_slots (session_id, slot, created_at)
             VALUES (?1, ?2, ?3)",
            params![session_id, slot, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find_by_handle() {
        let store = Store::in_memory().unwrap();
        let created = store.insert_session("Shop", "shop-main", "u1").unwrap();
        assert_eq!(created.status, SessionStatus::Starting);
        assert!(created.is_active);

        let found = store.find_session("shop-main").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.user_id, "u1");
        assert!(store.find_session("nope").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_live_handle_is_conflict() {
        let store = Store::in_memory().unwrap();
        store.insert_session("A", "dup", "u1").unwrap();
        let err = store.insert_session("B", "dup", "u2").unwrap_err();
        assert!(matches!(err, crate::atoms::error::Error::Conflict(_)));
    }

    #[test]
    fn test_deleted_handle_can_be_recreated() {
        let store = Store::in_memory().unwrap();
        let first = store.insert_session("A", "reborn", "u1").unwrap();
        store.soft_delete_session(&first.id).unwrap();
        assert!(store.find_session("reborn").unwrap().is_none());

        let second = store.insert_session("B", "reborn", "u1").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_status_write_derives_is_active() {
        let store = Store::in_memory().unwrap();
        let s = store.insert_session("A", "s1", "u1").unwrap();

        store.set_session_status(&s.id, SessionStatus::Failed).unwrap();
        let row = store.session_by_row_id(&s.id).unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Failed);
        assert!(!row.is_active);

        store.set_session_working(&s.id, Some("5511999"), Some("Shop")).unwrap();
        let row = store.session_by_row_id(&s.id).unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Working);
        assert!(row.is_active);
        assert_eq!(row.phone_number.as_deref(), Some("5511999"));
    }

    #[test]
    fn test_restart_reset_wipes_qr_and_identity() {
        let store = Store::in_memory().unwrap();
        let s = store.insert_session("A", "s1", "u1").unwrap();
        store.set_session_working(&s.id, Some("5511999"), Some("Shop")).unwrap();
        store.cache_qr(&s.id, "data:image/png;base64,abc").unwrap();
        store.set_session_status(&s.id, SessionStatus::Stopped).unwrap();

        let row = store.reset_session_for_restart(&s.id, "A2").unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Starting);
        assert!(row.is_active);
        assert_eq!(row.name, "A2");
        assert!(row.qr_code.is_none());
        assert!(row.phone_number.is_none());
        assert!(row.profile_name.is_none());
    }

    #[test]
    fn test_slot_assignment_survives_reuse() {
        let store = Store::in_memory().unwrap();
        assert!(store.slot_for_session("s1").unwrap().is_none());
        store.assign_slot("s1", "default").unwrap();
        store.assign_slot("s1", "default").unwrap();
        assert_eq!(store.slot_for_session("s1").unwrap().as_deref(), Some("default"));
    }
}
