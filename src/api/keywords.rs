// Auto-reply keyword rules. Matching itself lives in engine::keywords and
// runs from webhook ingestion; this is the management surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Keyword, MatchType};
use crate::engine::store::KeywordPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_keyword).get(list_keywords))
        .route("/:id", get(get_keyword).put(update_keyword).delete(delete_keyword))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeywordBody {
    pub keyword: String,
    pub response: String,
    pub match_type: Option<MatchType>,
    pub priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeywordBody {
    pub keyword: Option<String>,
    pub response: Option<String>,
    pub match_type: Option<MatchType>,
    pub priority: Option<i64>,
    pub is_active: Option<bool>,
}

async fn create_keyword(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateKeywordBody>,
) -> Result<(StatusCode, Json<Keyword>)> {
    if body.keyword.trim().is_empty() {
        return Err(Error::validation("Keyword is required"));
    }
    if body.response.trim().is_empty() {
        return Err(Error::validation("Response is required"));
    }

    let keyword = state.store.insert_keyword(
        &user.id,
        body.keyword.trim(),
        body.match_type.unwrap_or(MatchType::Contains),
        &body.response,
        body.priority.unwrap_or(0),
    )?;
    Ok((StatusCode::CREATED, Json(keyword)))
}

async fn list_keywords(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Keyword>>> {
    Ok(Json(state.store.list_keywords(&user.id)?))
}

async fn get_keyword(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Keyword>> {
    let keyword = state
        .store
        .find_keyword(&id, &user.id)?
        .ok_or_else(|| Error::not_found("Keyword not found"))?;
    Ok(Json(keyword))
}

async fn update_keyword(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateKeywordBody>,
) -> Result<Json<Keyword>> {
    let patch = KeywordPatch {
        keyword: body.keyword,
        match_type: body.match_type,
        response: body.response,
        priority: body.priority,
        is_active: body.is_active,
    };
    let keyword = state
        .store
        .update_keyword(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Keyword not found"))?;
    Ok(Json(keyword))
}

async fn delete_keyword(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_keyword(&id, &user.id)? {
        return Err(Error::not_found("Keyword not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
