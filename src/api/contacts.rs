// CRM contact CRUD, scoped to the bearer user. Chat sync and webhook
// ingestion link messages to these rows by phone number.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use super::auth::AuthUser;
use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::Contact;
use crate::engine::store::ContactPatch;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_contact).get(list_contacts))
        .route("/:id", get(get_contact).put(update_contact).delete(delete_contact))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactBody {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub custom_fields: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactBody {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub custom_fields: Option<Value>,
    pub notes: Option<String>,
}

async fn create_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateContactBody>,
) -> Result<(StatusCode, Json<Contact>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    let phone = body.phone_number.trim();
    if phone.is_empty() {
        return Err(Error::validation("Phone number is required"));
    }
    if state.store.find_contact_by_phone(&user.id, phone)?.is_some() {
        return Err(Error::conflict("Contact with this phone number already exists"));
    }

    let contact = state.store.insert_contact(
        &user.id,
        body.name.trim(),
        phone,
        body.email.as_deref(),
        body.avatar.as_deref(),
        body.custom_fields.as_ref(),
        body.notes.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Contact>>> {
    Ok(Json(state.store.list_contacts(&user.id)?))
}

async fn get_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Contact>> {
    let contact = state
        .store
        .find_contact(&id, &user.id)?
        .ok_or_else(|| Error::not_found("Contact not found"))?;
    Ok(Json(contact))
}

async fn update_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateContactBody>,
) -> Result<Json<Contact>> {
    let patch = ContactPatch {
        name: body.name,
        phone_number: body.phone_number,
        email: body.email,
        avatar: body.avatar,
        custom_fields: body.custom_fields,
        notes: body.notes,
    };
    let contact = state
        .store
        .update_contact(&id, &user.id, &patch)?
        .ok_or_else(|| Error::not_found("Contact not found"))?;
    Ok(Json(contact))
}

async fn delete_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.store.soft_delete_contact(&id, &user.id)? {
        return Err(Error::not_found("Contact not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
