// Account management. Any authenticated user may list and manage accounts;
// the deployment model is one team per instance. Password changes re-hash
// through the same argon2 path as registration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::auth::{self, AuthUser};
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::User;
use crate::engine::store::UserPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserBody {
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

async fn list_users(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.store.list_users()?))
}

async fn get_user(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<User>> {
    let user = state
        .store
        .find_user(&id)?
        .ok_or_else(|| Error::not_found("User not found"))?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<User>> {
    let password_hash = match body.password.as_deref() {
        Some(password) => Some(auth::hash_password(password)?),
        None => None,
    };
    let patch = UserPatch {
        email: body.email,
        name: body.name,
        avatar: body.avatar,
        password_hash,
        is_active: body.is_active,
    };
    let user = state
        .store
        .update_user(&id, &patch)?
        .ok_or_else(|| Error::not_found("User not found"))?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_user(&id)? {
        return Err(Error::not_found("User not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
