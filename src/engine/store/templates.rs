// Flow template library. Templates are either owned by a user or public;
// the public ones carry no owner and are readable by everyone.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::Template;
use rusqlite::params;
use serde::Deserialize;

const COLUMNS: &str = "id, name, description, category, flow_data, is_public, \
                       user_id, created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub flow_data: Option<serde_json::Value>,
    pub is_public: Option<bool>,
}

impl Template {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let flow_data: String = row.get(4)?;
        Ok(Template {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            flow_data: serde_json::from_str(&flow_data)
                .unwrap_or(serde_json::Value::Object(Default::default())),
            is_public: row.get(5)?,
            user_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl Store {
    // ── Template CRUD ──────────────────────────────────────────────────

    pub fn insert_template(
        &self,
        user_id: Option<&str>,
        name: &str,
        description: Option<&str>,
        category: &str,
        flow_data: &serde_json::Value,
        is_public: bool,
    ) -> Result<Template> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO templates
                 (id, name, description, category, flow_data, is_public, user_id,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![id, name, description, category, flow_data.to_string(), is_public, user_id, now],
        )?;

        Ok(Template {
            id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            category: category.to_string(),
            flow_data: flow_data.clone(),
            is_public,
            user_id: user_id.map(|s| s.to_string()),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// List templates: a user's own when `owner` is given, the public
    /// library otherwise. `category` narrows either listing.
    pub fn list_templates(&self, owner: Option<&str>, category: Option<&str>) -> Result<Vec<Template>> {
        let conn = self.conn.lock();

        let mut sql = format!("SELECT {COLUMNS} FROM templates WHERE deleted_at IS NULL");
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        match owner {
            Some(user_id) => {
                params_vec.push(Box::new(user_id.to_string()));
                sql.push_str(&format!(" AND user_id = ?{}", params_vec.len()));
            }
            None => sql.push_str(" AND is_public = 1"),
        }
        if let Some(cat) = category {
            params_vec.push(Box::new(cat.to_string()));
            sql.push_str(&format!(" AND category = ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let templates = stmt
            .query_map(param_refs.as_slice(), Template::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(templates)
    }

    pub fn find_template(&self, id: &str) -> Result<Option<Template>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {COLUMNS} FROM templates WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            Template::from_row,
        );

        match result {
            Ok(template) => Ok(Some(template)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Owner-scoped; public templates cannot be edited through this path.
    pub fn update_template(&self, id: &str, user_id: &str, patch: &TemplatePatch) -> Result<Option<Template>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE templates SET
                 name = COALESCE(?1, name),
                 description = COALESCE(?2, description),
                 category = COALESCE(?3, category),
                 flow_data = COALESCE(?4, flow_data),
                 is_public = COALESCE(?5, is_public),
                 updated_at = ?6
             WHERE id = ?7 AND user_id = ?8 AND deleted_at IS NULL",
            params![
                patch.name,
                patch.description,
                patch.category,
                patch.flow_data.as_ref().map(|v| v.to_string()),
                patch.is_public,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let template = conn.query_row(
            &format!("SELECT {COLUMNS} FROM templates WHERE id = ?1"),
            params![id],
            Template::from_row,
        )?;
        Ok(Some(template))
    }

    pub fn soft_delete_template(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE templates SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        Ok(n > 0)
    }
}
