// Flow template library. Listing and reads are public: without a bearer
// token the public library is served, with one the caller's own templates.
// Writes always require auth, and duplicates land in the caller's library
// as private copies.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::Template;
use crate::engine::store::TemplatePatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_template).get(list_templates))
        .route("/:id", get(get_template).put(update_template).delete(delete_template))
        .route("/:id/duplicate", post(duplicate_template))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateBody {
    pub name: String,
    pub flow_data: Value,
    pub category: String,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateBody {
    pub name: Option<String>,
    pub flow_data: Option<Value>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateBody {
    pub name: Option<String>,
}

async fn create_template(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateTemplateBody>,
) -> Result<(StatusCode, Json<Template>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    if body.category.trim().is_empty() {
        return Err(Error::validation("Category is required"));
    }

    let template = state.store.insert_template(
        Some(&user.id),
        body.name.trim(),
        body.description.as_deref(),
        body.category.trim(),
        &body.flow_data,
        body.is_public.unwrap_or(false),
    )?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn list_templates(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<Template>>> {
    let owner = user.as_ref().map(|AuthUser(u)| u.id.as_str());
    Ok(Json(state.store.list_templates(owner, query.category.as_deref())?))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>> {
    let template = state
        .store
        .find_template(&id)?
        .ok_or_else(|| Error::not_found("Template not found"))?;
    Ok(Json(template))
}

async fn update_template(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTemplateBody>,
) -> Result<Json<Template>> {
    let patch = TemplatePatch {
        name: body.name,
        description: body.description,
        category: body.category,
        flow_data: body.flow_data,
        is_public: body.is_public,
    };
    let template = state
        .store
        .update_template(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Template not found"))?;
    Ok(Json(template))
}

async fn duplicate_template(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<DuplicateBody>>,
) -> Result<(StatusCode, Json<Template>)> {
    let source = state
        .store
        .find_template(&id)?
        .ok_or_else(|| Error::not_found("Template not found"))?;

    let name = body
        .as_ref()
        .and_then(|Json(b)| b.name.clone())
        .unwrap_or_else(|| format!("{} (Copy)", source.name));

    let copy = state.store.insert_template(
        Some(&user.id),
        &name,
        source.description.as_deref(),
        &source.category,
        &source.flow_data,
        false,
    )?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn delete_template(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_template(&id, &user.id)? {
        return Err(Error::not_found("Template not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
