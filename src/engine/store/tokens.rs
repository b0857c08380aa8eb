// Bearer tokens. Only the SHA-256 digest of a token is stored; possession
// of the database does not yield usable credentials.

use super::Store;
use crate::atoms::error::Result;
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct AuthToken {
    pub user_id: String,
    /// "access" or "refresh".
    pub kind: String,
    pub expires_at: String,
}

impl Store {
    // ── Token CRUD ─────────────────────────────────────────────────────

    pub fn insert_token(
        &self,
        token_hash: &str,
        user_id: &str,
        kind: &str,
        expires_at: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO auth_tokens (token_hash, user_id, kind, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![token_hash, user_id, kind, expires_at, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn find_token(&self, token_hash: &str) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT user_id, kind, expires_at FROM auth_tokens WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok(AuthToken {
                    user_id: row.get(0)?,
                    kind: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        );

        match result {
            Ok(token) => Ok(Some(token)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_token(&self, token_hash: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM auth_tokens WHERE token_hash = ?1", params![token_hash])?;
        Ok(())
    }

    /// Drop every token that expired before `now`. Called opportunistically
    /// when new tokens are issued; there is no background sweeper.
    pub fn prune_expired_tokens(&self, now: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM auth_tokens WHERE expires_at < ?1", params![now])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifecycle() {
        let store = Store::in_memory().unwrap();
        store
            .insert_token("digest-1", "u1", "access", "2099-01-01T00:00:00Z")
            .unwrap();

        let t = store.find_token("digest-1").unwrap().unwrap();
        assert_eq!(t.user_id, "u1");
        assert_eq!(t.kind, "access");

        store.delete_token("digest-1").unwrap();
        assert!(store.find_token("digest-1").unwrap().is_none());
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let store = Store::in_memory().unwrap();
        store
            .insert_token("old", "u1", "access", "2000-01-01T00:00:00Z")
            .unwrap();
        store
            .insert_token("new", "u1", "access", "2099-01-01T00:00:00Z")
            .unwrap();

        let n = store.prune_expired_tokens("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(n, 1);
        assert!(store.find_token("old").unwrap().is_none());
        assert!(store.find_token("new").unwrap().is_some());
    }
}
