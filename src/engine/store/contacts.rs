// CRM contacts. Phone numbers are unique per user among non-deleted rows;
// custom_fields is an opaque JSON blob owned by the frontend.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::Contact;
use rusqlite::params;
use serde::Deserialize;

const COLUMNS: &str = "id, name, phone_number, email, avatar, custom_fields, \
                       notes, user_id, created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl Contact {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let custom: Option<String> = row.get(5)?;
        Ok(Contact {
            id: row.get(0)?,
            name: row.get(1)?,
            phone_number: row.get(2)?,
            email: row.get(3)?,
            avatar: row.get(4)?,
            custom_fields: custom.and_then(|s| serde_json::from_str(&s).ok()),
            notes: row.get(6)?,
            user_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl Store {
    // ── Contact CRUD ───────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_contact(
        &self,
        user_id: &str,
        name: &str,
        phone_number: &str,
        email: Option<&str>,
        avatar: Option<&str>,
        custom_fields: Option<&serde_json::Value>,
        notes: Option<&str>,
    ) -> Result<Contact> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let custom = custom_fields.map(|v| v.to_string());

        conn.execute(
            "INSERT INTO contacts
                 (id, name, phone_number, email, avatar, custom_fields, notes, user_id,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![id, name, phone_number, email, avatar, custom, notes, user_id, now],
        )?;

        Ok(Contact {
            id,
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            email: email.map(|s| s.to_string()),
            avatar: avatar.map(|s| s.to_string()),
            custom_fields: custom_fields.cloned(),
            notes: notes.map(|s| s.to_string()),
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn list_contacts(&self, user_id: &str) -> Result<Vec<Contact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM contacts
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))?;

        let contacts = stmt
            .query_map(params![user_id], Contact::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(contacts)
    }

    pub fn find_contact(&self, id: &str, user_id: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM contacts
                 WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
            ),
            params![id, user_id],
            Contact::from_row,
        );

        match result {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_contact_by_phone(&self, user_id: &str, phone_number: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM contacts
                 WHERE user_id = ?1 AND phone_number = ?2 AND deleted_at IS NULL"
            ),
            params![user_id, phone_number],
            Contact::from_row,
        );

        match result {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_contact(&self, id: &str, user_id: &str, patch: &ContactPatch) -> Result<Option<Contact>> {
        let conn = self.conn.lock();
        let custom = patch.custom_fields.as_ref().map(|v| v.to_string());
        let n = conn.execute(
            "UPDATE contacts SET
                 name = COALESCE(?1, name),
                 phone_number = COALESCE(?2, phone_number),
                 email = COALESCE(?3, email),
                 avatar = COALESCE(?4, avatar),
                 custom_fields = COALESCE(?5, custom_fields),
                 notes = COALESCE(?6, notes),
                 updated_at = ?7
             WHERE id = ?8 AND user_id = ?9 AND deleted_at IS NULL",
            params![
                patch.name,
                patch.phone_number,
                patch.email,
                patch.avatar,
                custom,
                patch.notes,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let contact = conn.query_row(
            &format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1"),
            params![id],
            Contact::from_row,
        )?;
        Ok(Some(contact))
    }

    pub fn soft_delete_contact(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE contacts SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phone_unique_per_user() {
        let store = Store::in_memory().unwrap();
        store
            .insert_contact("u1", "Ana", "5511999", None, None, None, None)
            .unwrap();
        assert!(store
            .insert_contact("u1", "Ana 2", "5511999", None, None, None, None)
            .is_err());
        // Same phone under a different user is fine.
        assert!(store
            .insert_contact("u2", "Ana", "5511999", None, None, None, None)
            .is_ok());
    }

    #[test]
    fn test_custom_fields_round_trip() {
        let store = Store::in_memory().unwrap();
        let fields = json!({"tier": "gold", "tags": ["vip"]});
        let c = store
            .insert_contact("u1", "Ana", "5511999", Some("a@b.c"), None, Some(&fields), None)
            .unwrap();

        let found = store.find_contact(&c.id, "u1").unwrap().unwrap();
        assert_eq!(found.custom_fields, Some(fields));
        assert_eq!(found.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_lookup_by_phone_scoped_to_user() {
        let store = Store::in_memory().unwrap();
        store
            .insert_contact("u1", "Ana", "5511999", None, None, None, None)
            .unwrap();
        assert!(store.find_contact_by_phone("u1", "5511999").unwrap().is_some());
        assert!(store.find_contact_by_phone("u2", "5511999").unwrap().is_none());
    }
}
