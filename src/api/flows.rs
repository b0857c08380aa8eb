// Conversation flow builder routes. Graph validation runs before any write
// that touches nodes or edges; the store bumps the version on graph change.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::Flow;
use crate::engine::flows::validate_graph;
use crate::engine::store::FlowPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_flow).get(list_flows))
        .route("/:id", get(get_flow).put(update_flow).delete(delete_flow))
        .route("/:id/activate", patch(activate_flow))
        .route("/:id/deactivate", patch(deactivate_flow))
}

#[derive(Debug, Deserialize)]
pub struct CreateFlowBody {
    pub name: String,
    pub description: Option<String>,
    pub nodes: Value,
    pub edges: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFlowBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub nodes: Option<Value>,
    pub edges: Option<Value>,
}

async fn create_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateFlowBody>,
) -> Result<(StatusCode, Json<Flow>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    validate_graph(&body.nodes, &body.edges)?;

    let flow = state.store.insert_flow(
        &user.id,
        body.name.trim(),
        body.description.as_deref(),
        &body.nodes,
        &body.edges,
    )?;
    Ok((StatusCode::CREATED, Json(flow)))
}

async fn list_flows(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Flow>>> {
    Ok(Json(state.store.list_flows(&user.id)?))
}

async fn get_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Flow>> {
    let flow = state
        .store
        .find_flow(&id, &user.id)?
        .ok_or_else(|| Error::not_found("Flow not found"))?;
    Ok(Json(flow))
}

async fn update_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateFlowBody>,
) -> Result<Json<Flow>> {
    let current = state
        .store
        .find_flow(&id, &user.id)?
        .ok_or_else(|| Error::not_found("Flow not found"))?;

    // A partial graph update is validated against the merged result.
    if body.nodes.is_some() || body.edges.is_some() {
        let nodes = body.nodes.as_ref().unwrap_or(&current.nodes);
        let edges = body.edges.as_ref().unwrap_or(&current.edges);
        validate_graph(nodes, edges)?;
    }

    let patch = FlowPatch {
        name: body.name,
        description: body.description,
        nodes: body.nodes,
        edges: body.edges,
    };
    let flow = state
        .store
        .update_flow(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Flow not found"))?;
    Ok(Json(flow))
}

async fn activate_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Flow>> {
    let flow = state
        .store
        .set_flow_active(&id, &user.id, true)?
        .ok_or_else(|| Error::not_found("Flow not found"))?;
    Ok(Json(flow))
}

async fn deactivate_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Flow>> {
    let flow = state
        .store
        .set_flow_active(&id, &user.id, false)?
        .ok_or_else(|| Error::not_found("Flow not found"))?;
    Ok(Json(flow))
}

async fn delete_flow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_flow(&id, &user.id)? {
        return Err(Error::not_found("Flow not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
