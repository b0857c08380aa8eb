// Bulk-send campaigns: CRUD plus the status machine. A campaign is born
// DRAFT (or SCHEDULED when a date is given), transitions through RUNNING /
// PAUSED, and ends COMPLETED or CANCELLED. Nothing here dispatches sends;
// the status is bookkeeping for an external runner.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use log::info;
use serde::Deserialize;

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Campaign, CampaignStatus};
use crate::engine::store::CampaignPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_campaign).get(list_campaigns))
        .route("/:id", get(get_campaign).put(update_campaign).delete(delete_campaign))
        .route("/:id/start", patch(start_campaign))
        .route("/:id/pause", patch(pause_campaign))
        .route("/:id/cancel", patch(cancel_campaign))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignBody {
    pub name: String,
    pub message: String,
    pub recipients: Vec<String>,
    pub session_id: String,
    pub description: Option<String>,
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub scheduled_at: Option<String>,
    pub session_id: Option<String>,
}

async fn create_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateCampaignBody>,
) -> Result<(StatusCode, Json<Campaign>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    if body.recipients.is_empty() {
        return Err(Error::validation("Campaign must have at least one recipient"));
    }
    let session = state.lifecycle.get_session(&user.id, &body.session_id)?;

    let campaign = state.store.insert_campaign(
        &user.id,
        body.name.trim(),
        body.description.as_deref(),
        &body.message,
        &body.recipients,
        body.scheduled_at.as_deref(),
        &session.id,
    )?;
    info!("[campaigns] Created '{}' with {} recipients", campaign.name, campaign.total_recipients);
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn list_campaigns(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Campaign>>> {
    Ok(Json(state.store.list_campaigns(&user.id)?))
}

async fn get_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    Ok(Json(find_campaign(&state, &id, &user.id)?))
}

async fn update_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateCampaignBody>,
) -> Result<Json<Campaign>> {
    let campaign = find_campaign(&state, &id, &user.id)?;
    if campaign.status == CampaignStatus::Running {
        return Err(Error::validation("Cannot update running campaign"));
    }
    if let Some(recipients) = &body.recipients {
        if recipients.is_empty() {
            return Err(Error::validation("Campaign must have at least one recipient"));
        }
    }
    let session_row = match body.session_id.as_deref() {
        Some(handle) => Some(state.lifecycle.get_session(&user.id, handle)?.id),
        None => None,
    };

    let patch = CampaignPatch {
        name: body.name,
        description: body.description,
        message: body.message,
        recipients: body.recipients,
        scheduled_at: body.scheduled_at,
        session_id: session_row,
    };
    let campaign = state
        .store
        .update_campaign(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Campaign not found"))?;
    Ok(Json(campaign))
}

async fn start_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = find_campaign(&state, &id, &user.id)?;
    if campaign.status != CampaignStatus::Draft && campaign.status != CampaignStatus::Scheduled {
        return Err(Error::validation("Campaign cannot be started"));
    }
    let updated = transition(&state, &id, &user.id, CampaignStatus::Running)?;
    info!("[campaigns] Started '{}'", updated.name);
    Ok(Json(updated))
}

async fn pause_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = find_campaign(&state, &id, &user.id)?;
    if campaign.status != CampaignStatus::Running {
        return Err(Error::validation("Only running campaigns can be paused"));
    }
    Ok(Json(transition(&state, &id, &user.id, CampaignStatus::Paused)?))
}

async fn cancel_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = find_campaign(&state, &id, &user.id)?;
    if campaign.status == CampaignStatus::Completed {
        return Err(Error::validation("Cannot cancel completed campaign"));
    }
    Ok(Json(transition(&state, &id, &user.id, CampaignStatus::Cancelled)?))
}

async fn delete_campaign(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let campaign = find_campaign(&state, &id, &user.id)?;
    if campaign.status == CampaignStatus::Running {
        return Err(Error::validation("Cannot delete running campaign"));
    }
    state.store.soft_delete_campaign(&id, &user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

fn find_campaign(state: &AppState, id: &str, user_id: &str) -> Result<Campaign> {
    state
        .store
        .find_campaign(id, user_id)?
        .ok_or_else(|| Error::not_found("Campaign not found"))
}

fn transition(state: &AppState, id: &str, user_id: &str, status: CampaignStatus) -> Result<Campaign> {
    state
        .store
        .set_campaign_status(id, user_id, status)?
        .ok_or_else(|| Error::not_found("Campaign not found"))
}
