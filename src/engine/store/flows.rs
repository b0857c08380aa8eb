// Conversation flow definitions. Graph validation lives in engine::flows;
// the store tracks the version counter, bumped whenever the graph changes.

use super::Store;
use crate::atoms::error::Result;
use crate::atoms::types::Flow;
use rusqlite::params;
use serde::Deserialize;

const COLUMNS: &str = "id, name, description, nodes, edges, is_active, version, \
                       user_id, created_at, updated_at";

/// Partial update; None leaves the column untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub nodes: Option<serde_json::Value>,
    pub edges: Option<serde_json::Value>,
}

impl Flow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let nodes: String = row.get(3)?;
        let edges: String = row.get(4)?;
        Ok(Flow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            nodes: serde_json::from_str(&nodes).unwrap_or(serde_json::Value::Array(vec![])),
            edges: serde_json::from_str(&edges).unwrap_or(serde_json::Value::Array(vec![])),
            is_active: row.get(5)?,
            version: row.get(6)?,
            user_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl Store {
    // ── Flow CRUD ──────────────────────────────────────────────────────

    pub fn insert_flow(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
        nodes: &serde_json::Value,
        edges: &serde_json::Value,
    ) -> Result<Flow> {
        let conn = self.conn.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO flows
                 (id, name, description, nodes, edges, is_active, version, user_id,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7, ?7)",
            params![id, name, description, nodes.to_string(), edges.to_string(), user_id, now],
        )?;

        Ok(Flow {
            id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            nodes: nodes.clone(),
            edges: edges.clone(),
            is_active: false,
            version: 1,
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn list_flows(&self, user_id: &str) -> Result<Vec<Flow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM flows
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))?;

        let flows = stmt
            .query_map(params![user_id], Flow::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(flows)
    }

    pub fn find_flow(&self, id: &str, user_id: &str) -> Result<Option<Flow>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM flows
                 WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
            ),
            params![id, user_id],
            Flow::from_row,
        );

        match result {
            Ok(flow) => Ok(Some(flow)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Graph edits (nodes or edges present in the patch) bump the version.
    pub fn update_flow(&self, id: &str, user_id: &str, patch: &FlowPatch) -> Result<Option<Flow>> {
        let conn = self.conn.lock();
        let bump: i64 = if patch.nodes.is_some() || patch.edges.is_some() { 1 } else { 0 };
        let n = conn.execute(
            "UPDATE flows SET
                 name = COALESCE(?1, name),
                 description = COALESCE(?2, description),
                 nodes = COALESCE(?3, nodes),
                 edges = COALESCE(?4, edges),
                 version = version + ?5,
                 updated_at = ?6
             WHERE id = ?7 AND user_id = ?8 AND deleted_at IS NULL",
            params![
                patch.name,
                patch.description,
                patch.nodes.as_ref().map(|v| v.to_string()),
                patch.edges.as_ref().map(|v| v.to_string()),
                bump,
                chrono::Utc::now().to_rfc3339(),
                id,
                user_id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let flow = conn.query_row(
            &format!("SELECT {COLUMNS} FROM flows WHERE id = ?1"),
            params![id],
            Flow::from_row,
        )?;
        Ok(Some(flow))
    }

    pub fn set_flow_active(&self, id: &str, user_id: &str, active: bool) -> Result<Option<Flow>> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE flows SET is_active = ?1, updated_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
            params![active, chrono::Utc::now().to_rfc3339(), id, user_id],
        )?;
        if n == 0 {
            return Ok(None);
        }

        let flow = conn.query_row(
            &format!("SELECT {COLUMNS} FROM flows WHERE id = ?1"),
            params![id],
            Flow::from_row,
        )?;
        Ok(Some(flow))
    }

    pub fn soft_delete_flow(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE flows SET deleted_at = ?1, updated_at = ?1
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

    fn sample_graph() -> (serde_json::Value, serde_json::Value) {
        (
            json!([{"id": "n1", "type": "start"}, {"id": "n2", "type": "message"}]),
            json!([{"source": "n1", "target": "n2"}]),
        )
    }

    #[test]
    fn test_version_bumps_only_on_graph_change() {
        let store = Store::in_memory().unwrap();
        let (nodes, edges) = sample_graph();
        let f = store.insert_flow("u1", "Welcome", None, &nodes, &edges).unwrap();
        assert_eq!(f.version, 1);

        let renamed = store
            .update_flow(&f.id, "u1", &FlowPatch { name: Some("Hi".into()), ..Default::default() })
            .unwrap()
            .unwrap();
        assert_eq!(renamed.version, 1);

        let regraphed = store
            .update_flow(
                &f.id,
                "u1",
                &FlowPatch { nodes: Some(json!([{"id": "n1", "type": "start"}])), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        assert_eq!(regraphed.version, 2);
    }

    #[test]
    fn test_activate_deactivate() {
        let store = Store::in_memory().unwrap();
        let (nodes, edges) = sample_graph();
        let f = store.insert_flow("u1", "Welcome", None, &nodes, &edges).unwrap();
        assert!(!f.is_active);

        let on = store.set_flow_active(&f.id, "u1", true).unwrap().unwrap();
        assert!(on.is_active);
        let off = store.set_flow_active(&f.id, "u1", false).unwrap().unwrap();
        assert!(!off.is_active);
    }
}
