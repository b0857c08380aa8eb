// Auto-reply keyword rules. Matching itself lives in engine::keywords;
// this file only persists the rules.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::{Keyword, MatchType};
use rusqlite::params;
use serde::Deserialize;

const COLUMNS: &str = "id, keyword, match_type, response, priority, is_active, \
                       user_id, created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordPatch {
    pub keyword: Option<String>,
    pub match_type: Option<MatchType>,
    pub response: Option<String>,
    pub priority: Option<i64>,
    pub is_active: Option<bool>,
}

impl Keyword {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let match_type: String = row.get(2)?;
        Ok(Keyword {
            id: row.get(0)?,
            keyword: row.get(1)?,
            match_type: MatchType::parse(&match_type).unwrap_or(MatchType::Contains),
            response: row.get(3)?,
            priority: row.get(4)?,
            is_active: row.get(5)?,
            user_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl Store {
    // ── Keyword CRUD ───────────────────────────────────────────────────

    pub fn insert_keyword(
        &self,
        user_id: &str,
        keyword: &str,
        match_type: MatchType,
        response: &str,
        priority: i64,
    ) -> Result<Keyword> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO keywords
                 (id, keyword, match_type, response, priority, is_active, user_id,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7)",
            params![id, keyword, match_type.as_str(), response, priority, user_id, now],
        )?;

        Ok(Keyword {
            id,
            keyword: keyword.to_string(),
            match_type,
            response: response.to_string(),
            priority,
            is_active: true,
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// All rules for a user, highest priority first.
    pub fn list_keywords(&self, user_id: &str) -> Result<Vec<Keyword>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM keywords
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY priority DESC, created_at ASC"
        ))?;

        let keywords = stmt
            .query_map(params![user_id], Keyword::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(keywords)
    }

    /// Active rules only, in matching order.
    pub fn list_active_keywords(&self, user_id: &str) -> Result<Vec<Keyword>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM keywords
             WHERE user_id = ?1 AND is_active = 1 AND deleted_at IS NULL
             ORDER BY priority DESC, created_at ASC"
        ))?;

        let keywords = stmt
            .query_map(params![user_id], Keyword::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(keywords)
    }

    pub fn find_keyword(&self, id: &str, user_id: &str) -> Result<Option<Keyword>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM keywords
                 WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
            ),
            params![id, user_id],
            Keyword::from_row,
        );

        match result {
            Ok(keyword) => Ok(Some(keyword)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_keyword(&self, id: &str, user_id: &str, patch: &KeywordPatch) -> Result<Option<Keyword>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE keywords SET
                 keyword = COALESCE(?1, keyword),
                 match_type = COALESCE(?2, match_type),
                 response = COALESCE(?3, response),
                 priority = COALESCE(?4, priority),
                 is_active = COALESCE(?5, is_active),
                 updated_at = ?6
             WHERE id = ?7 AND user_id = ?8 AND deleted_at IS NULL",
            params![
                patch.keyword,
                patch.match_type.map(|m| m.as_str()),
                patch.response,
                patch.priority,
                patch.is_active,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let keyword = conn.query_row(
            &format!("SELECT {COLUMNS} FROM keywords WHERE id = ?1"),
            params![id],
            Keyword::from_row,
        )?;
        Ok(Some(keyword))
    }

    pub fn soft_delete_keyword(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE keywords SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_list_ordered_by_priority() {
        let store = Store::in_memory().unwrap();
        store.insert_keyword("u1", "oi", MatchType::Exact, "hello", 1).unwrap();
        store.insert_keyword("u1", "preço", MatchType::Contains, "price list", 10).unwrap();
        let off = store.insert_keyword("u1", "promo", MatchType::Contains, "promo", 99).unwrap();
        store
            .update_keyword(&off.id, "u1", &KeywordPatch { is_active: Some(false), ..Default::default() })
            .unwrap();

        let active = store.list_active_keywords("u1").unwrap();
        let words: Vec<&str> = active.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(words, vec!["preço", "oi"]);
    }

    #[test]
    fn test_patch_match_type() {
        let store = Store::in_memory().unwrap();
        let k = store.insert_keyword("u1", "oi", MatchType::Contains, "hello", 0).unwrap();
        let updated = store
            .update_keyword(
                &k.id,
                "u1",
                &KeywordPatch { match_type: Some(MatchType::Regex), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.match_type, MatchType::Regex);
        assert_eq!(updated.response, "hello");
    }
}
