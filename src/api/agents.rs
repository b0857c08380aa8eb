// Human agent accounts, owned by a user. Agents carry their own credentials
// (hashed like user passwords) and a presence status for routing decisions
// in the frontend.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use serde::Deserialize;

use super::auth::{self, AuthUser};
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Agent, AgentStatus};
use crate::engine::store::AgentPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_agent).get(list_agents))
        .route("/:id", get(get_agent).put(update_agent).delete(delete_agent))
        .route("/:id/status", patch(update_agent_status))
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AgentStatusBody {
    pub status: AgentStatus,
}

async fn create_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateAgentBody>,
) -> Result<(StatusCode, Json<Agent>)> {
    let email = body.email.trim();
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    if !email.contains('@') {
        return Err(Error::validation("Invalid email address"));
    }
    if body.password.len() < 6 {
        return Err(Error::validation("Password must be at least 6 characters"));
    }
    if state.store.find_agent_by_email(&user.id, email)?.is_some() {
        return Err(Error::conflict("Agent with this email already exists"));
    }

    let hash = auth::hash_password(&body.password)?;
    let agent = state.store.insert_agent(&user.id, body.name.trim(), email, &hash)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Agent>>> {
    Ok(Json(state.store.list_agents(&user.id)?))
}

async fn get_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Agent>> {
    let agent = state
        .store
        .find_agent(&id, &user.id)?
        .ok_or_else(|| Error::not_found("Agent not found"))?;
    Ok(Json(agent))
}

async fn update_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateAgentBody>,
) -> Result<Json<Agent>> {
    let password_hash = match body.password.as_deref() {
        Some(password) => Some(auth::hash_password(password)?),
        None => None,
    };
    let patch = AgentPatch {
        name: body.name,
        email: body.email,
        password_hash,
        is_active: body.is_active,
    };
    let agent = state
        .store
        .update_agent(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Agent not found"))?;
    Ok(Json(agent))
}

async fn update_agent_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AgentStatusBody>,
) -> Result<Json<Agent>> {
    let agent = state
        .store
        .set_agent_status(&id, &user.id, body.status)?
        .ok_or_else(|| Error::not_found("Agent not found"))?;
    Ok(Json(agent))
}

async fn delete_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_agent(&id, &user.id)? {
        return Err(Error::not_found("Agent not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
