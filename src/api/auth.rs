// Registration, login and token refresh. Tokens are opaque random strings
// handed to the client once; only their SHA-256 digest is persisted. Refresh
// spends the presented token and issues a fresh pair.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::AppState;
use crate::atoms::error::{Error, Result};
use crate::atoms::types::User;
use crate::engine::store::Store;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/profile", get(profile))
}

// ── Request / response bodies ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let email = body.email.trim();
    if !email.contains('@') {
        return Err(Error::validation("Invalid email address"));
    }
    if body.password.len() < 6 {
        return Err(Error::validation("Password must be at least 6 characters"));
    }
    if body.name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }

    if state.store.find_user_by_email(email)?.is_some() {
        return Err(Error::conflict("Email already exists"));
    }

    let hash = hash_password(&body.password)?;
    let user = state.store.insert_user(email, &hash, body.name.trim())?;
    info!("[auth] Registered user {}", user.email);

    let response = issue_tokens(&state, &user)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<AuthResponse>> {
    let user = state
        .store
        .find_user_by_email(body.email.trim())?
        .ok_or_else(|| Error::auth("Invalid credentials"))?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(Error::auth("Invalid credentials"));
    }
    if !user.is_active {
        return Err(Error::auth("User is inactive"));
    }

    info!("[auth] User {} logged in", user.email);
    Ok(Json(issue_tokens(&state, &user)?))
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<AuthResponse>> {
    let user = authenticate(&state.store, &body.refresh_token, "refresh")?;

    // The presented refresh token is spent whether or not issuing succeeds.
    state.store.delete_token(&token_digest(&body.refresh_token))?;
    Ok(Json(issue_tokens(&state, &user)?))
}

async fn profile(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// ── Bearer extractor ───────────────────────────────────────────────────

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
/// Adding this argument to a handler makes the route protected.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::auth("Missing authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::auth("Invalid authorization header"))?;

        let user = authenticate(&state.store, token, "access")?;
        Ok(AuthUser(user))
    }
}

// ── Token + password primitives ────────────────────────────────────────

/// Argon2id hash with a fresh random salt, PHC string at rest.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::internal(format!("Password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn mint_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

fn issue_tokens(state: &AppState, user: &User) -> Result<AuthResponse> {
    let now = Utc::now();
    state.store.prune_expired_tokens(&now.to_rfc3339())?;

    let access = mint_token();
    let refresh = mint_token();
    state.store.insert_token(
        &token_digest(&access),
        &user.id,
        "access",
        &(now + Duration::seconds(state.auth.access_ttl_secs)).to_rfc3339(),
    )?;
    state.store.insert_token(
        &token_digest(&refresh),
        &user.id,
        "refresh",
        &(now + Duration::seconds(state.auth.refresh_ttl_secs)).to_rfc3339(),
    )?;

    Ok(AuthResponse {
        access_token: access,
        refresh_token: refresh,
        user: UserSummary::from(user),
    })
}

/// Resolve a presented token of the given kind to its live, active user.
fn authenticate(store: &Store, token: &str, kind: &str) -> Result<User> {
    let row = store
        .find_token(&token_digest(token))?
        .ok_or_else(|| Error::auth("Invalid token"))?;
    if row.kind != kind {
        return Err(Error::auth("Invalid token"));
    }
    let expires = DateTime::parse_from_rfc3339(&row.expires_at)
        .map_err(|_| Error::auth("Invalid token"))?;
    if expires <= Utc::now() {
        return Err(Error::auth("Token expired"));
    }

    let user = store
        .find_user(&row.user_id)?
        .ok_or_else(|| Error::auth("Invalid token"))?;
    if !user.is_active {
        return Err(Error::auth("User is inactive"));
    }
    Ok(user)
}
