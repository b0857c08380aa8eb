// User accounts. Passwords arrive here already hashed; the store never
// sees plaintext credentials.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::User;
use rusqlite::params;

const COLUMNS: &str = "id, email, password_hash, name, avatar, is_active, \
                       created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

impl User {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            avatar: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl Store {
    // ── User CRUD ──────────────────────────────────────────────────────

    pub fn insert_user(&self, email: &str, password_hash: &str, name: &str) -> Result<User> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![id, email, password_hash, name, now],
        )?;

        Ok(User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            avatar: None,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn find_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            User::from_row,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC"
        ))?;
        let users = stmt
            .query_map([], User::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE email = ?1 AND deleted_at IS NULL"),
            params![email],
            User::from_row,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE users SET
                 email = COALESCE(?1, email),
                 name = COALESCE(?2, name),
                 avatar = COALESCE(?3, avatar),
                 password_hash = COALESCE(?4, password_hash),
                 is_active = COALESCE(?5, is_active),
                 updated_at = ?6
             WHERE id = ?7 AND deleted_at IS NULL",
            params![
                patch.email,
                patch.name,
                patch.avatar,
                patch.password_hash,
                patch.is_active,
                chrono::Utc::now().to_rfc3339(),
                id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let user = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            User::from_row,
        )?;
        Ok(Some(user))
    }

    pub fn soft_delete_user(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE users SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_unique_among_live_rows() {
        let store = Store::in_memory().unwrap();
        let u = store.insert_user("a@b.c", "h1", "Ana").unwrap();
        assert!(store.insert_user("a@b.c", "h2", "Bea").is_err());

        store.soft_delete_user(&u.id).unwrap();
        assert!(store.insert_user("a@b.c", "h2", "Bea").is_ok());
    }

    #[test]
    fn test_patch_updates_only_given_fields() {
        let store = Store::in_memory().unwrap();
        let u = store.insert_user("a@b.c", "h1", "Ana").unwrap();

        let patch = UserPatch {
            name: Some("Ana Maria".into()),
            ..Default::default()
        };
        let updated = store.update_user(&u.id, &patch).unwrap().unwrap();
        assert_eq!(updated.name, "Ana Maria");
        assert_eq!(updated.email, "a@b.c");
        assert_eq!(updated.password_hash, "h1");
    }
}
