// Zapdesk API — axum HTTP surface over the store and the lifecycle engine.
// Everything lives under /api; all routes except auth, the public template
// library and the gateway webhook require a bearer token.
//
// Module layout:
//   auth       — register / login / refresh + bearer-token extractor
//   users      — account CRUD
//   sessions   — session lifecycle + chat/contact proxy routes
//   contacts   — CRM contacts
//   keywords   — auto-reply rules
//   flows      — conversation flow builder
//   campaigns  — bulk-send campaigns
//   templates  — flow template library
//   agents     — human agents
//   messages   — message log & conversation threads
//   webhook    — inbound gateway events

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use log::error;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::atoms::error::Error;
use crate::config::AuthConfig;
use crate::engine::lifecycle::Lifecycle;
use crate::engine::store::Store;

mod agents;
mod auth;
mod campaigns;
mod contacts;
mod flows;
mod keywords;
mod messages;
mod sessions;
mod templates;
mod users;
mod webhook;

pub use auth::AuthUser;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub lifecycle: Arc<Lifecycle>,
    pub auth: AuthConfig,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth::routes())
        .nest("/api/users", users::routes())
        .nest("/api/whatsapp", sessions::routes())
        .nest("/api/contacts", contacts::routes())
        .nest("/api/keywords", keywords::routes())
        .nest("/api/flows", flows::routes())
        .nest("/api/campaigns", campaigns::routes())
        .nest("/api/templates", templates::routes())
        .nest("/api/agents", agents::routes())
        .nest("/api/messages", messages::routes())
        .nest("/api/webhooks", webhook::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// HTTP mapping for the crate error enum. Server-side failures are logged
// here once, so handlers never have to.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::NotReadyForSend(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("[api] {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
