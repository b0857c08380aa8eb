// Flow graph validation, applied before any create or graph-changing
// update. Nodes and edges stay opaque JSON for the frontend editor; only
// the structural rules below are enforced server-side.

use crate::atoms::error::{Error, Result};

/// Reject structurally broken graphs: empty node lists, graphs without a
/// `start`-typed node, and edges whose endpoints do not exist.
pub fn validate_graph(nodes: &serde_json::Value, edges: &serde_json::Value) -> Result<()> {
    let node_list = nodes
        .as_array()
        .ok_or_else(|| Error::validation("Flow nodes must be an array"))?;
    if node_list.is_empty() {
        return Err(Error::validation("Flow must have at least one node"));
    }

    let has_start = node_list
        .iter()
        .any(|n| n["type"].as_str() == Some("start"));
    if !has_start {
        return Err(Error::validation("Flow must have a start node"));
    }

    let node_ids: Vec<&str> = node_list.iter().filter_map(|n| n["id"].as_str()).collect();

    let edge_list = edges
        .as_array()
        .ok_or_else(|| Error::validation("Flow edges must be an array"))?;
    for edge in edge_list {
        let source = edge["source"].as_str().unwrap_or_default();
        let target = edge["target"].as_str().unwrap_or_default();
        if !node_ids.contains(&source) || !node_ids.contains(&target) {
            return Err(Error::validation("Edge references non-existent node"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_minimal_valid_graph() {
        let nodes = json!([{"id": "n1", "type": "start"}]);
        let edges = json!([]);
        assert!(validate_graph(&nodes, &edges).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_startless_graphs() {
        assert!(validate_graph(&json!([]), &json!([])).is_err());
        let no_start = json!([{"id": "n1", "type": "message"}]);
        assert!(validate_graph(&no_start, &json!([])).is_err());
    }

    #[test]
    fn test_rejects_dangling_edges() {
        let nodes = json!([{"id": "n1", "type": "start"}, {"id": "n2", "type": "message"}]);
        let good = json!([{"source": "n1", "target": "n2"}]);
        assert!(validate_graph(&nodes, &good).is_ok());

        let bad = json!([{"source": "n1", "target": "ghost"}]);
        let err = validate_graph(&nodes, &bad).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
