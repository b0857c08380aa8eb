// Typed HTTP client for the remote messaging gateway (WAHA-compatible REST
// surface). One method per remote endpoint, no local retries — the retry and
// swallow policy lives in the lifecycle manager. Holds no session state.

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;
use thiserror::Error;

use super::types::{RemoteSession, SendReceipt};
use crate::atoms::error::Error;
use crate::config::GatewayConfig;

// ── Error classes ──────────────────────────────────────────────────────────
// The manager branches on these: 404 and 422 mean "not there / not ready yet"
// during polling, while "already exists" on create means a previous attempt
// partially succeeded and must not abort the flow.

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote session not found")]
    NotFound,

    #[error("remote session already exists")]
    AlreadyExists,

    #[error("remote not ready: {0}")]
    Unprocessable(String),

    #[error("remote error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    /// The transient 404/422 class: consumes a poll attempt instead of
    /// failing the create, and is absorbed on refresh and QR paths.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound | GatewayError::AlreadyExists | GatewayError::Unprocessable(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::NotFound => Some(404),
            GatewayError::AlreadyExists | GatewayError::Unprocessable(_) => Some(422),
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        match &e {
            // The Api display already carries the status code.
            GatewayError::Api { .. } => Error::RemoteFailure(e.to_string()),
            _ => Error::remote(e.status(), e.to_string()),
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// ── Contract ───────────────────────────────────────────────────────────────

/// The remote gateway surface the lifecycle manager drives. Implemented by
/// `HttpGateway` in production and by scripted fakes in tests.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Request gateway-side session creation under `slot`. Duplicate creation
    /// surfaces as `GatewayError::AlreadyExists`, never silently.
    async fn create_session(&self, slot: &str) -> GatewayResult<()>;

    /// Start a stopped gateway-side session.
    async fn start_session(&self, slot: &str) -> GatewayResult<()>;

    /// Fetch the current remote status. 404 surfaces as
    /// `GatewayError::NotFound`, distinct from every other failure.
    async fn session_status(&self, slot: &str) -> GatewayResult<RemoteSession>;

    /// Fetch the current pairing payload as a data URL. Only meaningful
    /// while the remote is in its QR window; outside it the remote answers
    /// 404/422, which map to the not-ready error class.
    async fn qr_code(&self, slot: &str) -> GatewayResult<String>;

    /// Tear down the gateway-side session.
    async fn stop_session(&self, slot: &str) -> GatewayResult<()>;

    async fn send_text(&self, slot: &str, to: &str, text: &str) -> GatewayResult<SendReceipt>;
    async fn send_image(
        &self,
        slot: &str,
        to: &str,
        image_url: &str,
        caption: Option<&str>,
    ) -> GatewayResult<SendReceipt>;
    async fn send_file(
        &self,
        slot: &str,
        to: &str,
        file_url: &str,
        filename: &str,
    ) -> GatewayResult<SendReceipt>;

    async fn chats(&self, slot: &str) -> GatewayResult<Vec<serde_json::Value>>;
    async fn chat_messages(
        &self,
        slot: &str,
        chat_id: &str,
        limit: Option<u32>,
        page: Option<u32>,
    ) -> GatewayResult<Vec<serde_json::Value>>;
    async fn chat_picture(&self, slot: &str, chat_id: &str) -> GatewayResult<String>;
    async fn archive_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()>;
    async fn unarchive_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()>;
    async fn delete_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()>;
    async fn mark_read(&self, slot: &str, chat_id: &str) -> GatewayResult<()>;
    async fn contacts(&self, slot: &str) -> GatewayResult<Vec<serde_json::Value>>;
    async fn contact(&self, slot: &str, contact_id: &str) -> GatewayResult<serde_json::Value>;
    async fn me(&self, slot: &str) -> GatewayResult<serde_json::Value>;
}

// ── HTTP implementation ────────────────────────────────────────────────────

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> crate::atoms::error::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if config.api_key.is_empty() {
            warn!("[gateway] No API key configured, sending unauthenticated requests");
        } else {
            let value = reqwest::header::HeaderValue::from_str(&config.api_key)
                .map_err(|e| Error::Config(format!("Invalid gateway API key: {}", e)))?;
            headers.insert("X-Api-Key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        info!("[gateway] Client ready for {}", config.base_url);

        Ok(HttpGateway {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response into the error taxonomy. The gateway wraps
    /// errors as `{"message": …}`; fall back to the raw body otherwise.
    async fn error_from(resp: reqwest::Response) -> GatewayError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        match status {
            404 => GatewayError::NotFound,
            422 if message.to_lowercase().contains("already exists") => GatewayError::AlreadyExists,
            422 => GatewayError::Unprocessable(message),
            _ => GatewayError::Api { status, message },
        }
    }

    async fn into_json(resp: reqwest::Response) -> GatewayResult<serde_json::Value> {
        if resp.status().is_success() {
            Ok(resp.json().await?)
        } else {
            Err(Self::error_from(resp).await)
        }
    }

    async fn expect_success(resp: reqwest::Response) -> GatewayResult<()> {
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(resp).await)
        }
    }

    async fn get_json(&self, path: &str) -> GatewayResult<serde_json::Value> {
        let resp = self.client.get(self.url(path)).send().await?;
        Self::into_json(resp).await
    }

    async fn get_array(&self, path: &str) -> GatewayResult<Vec<serde_json::Value>> {
        let v = self.get_json(path).await?;
        Ok(v.as_array().cloned().unwrap_or_default())
    }

    async fn post_empty(&self, path: &str) -> GatewayResult<()> {
        let resp = self.client.post(self.url(path)).send().await?;
        Self::expect_success(resp).await
    }

    /// Fetch a binary endpoint and package it as a base64 data URL.
    async fn get_data_url(&self, path: &str, fallback_mime: &str) -> GatewayResult<String> {
        let resp = self.client.get(self.url(path)).send().await?;
        if !resp.status().is_success() {
            return Err(Self::error_from(resp).await);
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(fallback_mime)
            .split(';')
            .next()
            .unwrap_or(fallback_mime)
            .to_string();
        let bytes = resp.bytes().await?;
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn create_session(&self, slot: &str) -> GatewayResult<()> {
        info!("[gateway] POST /api/sessions name={}", slot);
        let resp = self
            .client
            .post(self.url("/api/sessions"))
            .json(&json!({ "name": slot, "config": {} }))
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    async fn start_session(&self, slot: &str) -> GatewayResult<()> {
        info!("[gateway] POST /api/sessions/{}/start", slot);
        self.post_empty(&format!("/api/sessions/{}/start", slot)).await
    }

    async fn session_status(&self, slot: &str) -> GatewayResult<RemoteSession> {
        let v = self.get_json(&format!("/api/sessions/{}", slot)).await?;
        Ok(RemoteSession::from_value(&v))
    }

    async fn qr_code(&self, slot: &str) -> GatewayResult<String> {
        // The gateway answers either JSON {mimetype, data} or a raw PNG body
        // depending on version; handle both.
        let resp = self
            .client
            .get(self.url(&format!("/api/{}/auth/qr", slot)))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from(resp).await);
        }

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            let v: serde_json::Value = resp.json().await?;
            if let Some(data) = v["data"].as_str() {
                let mime = v["mimetype"].as_str().unwrap_or("image/png");
                return Ok(format!("data:{};base64,{}", mime, data));
            }
            if let Some(raw) = v.as_str() {
                return Ok(format!("data:image/png;base64,{}", raw));
            }
            Err(GatewayError::Unprocessable(
                "pairing payload missing data field".into(),
            ))
        } else {
            let bytes = resp.bytes().await?;
            let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes);
            Ok(format!("data:image/png;base64,{}", encoded))
        }
    }

    async fn stop_session(&self, slot: &str) -> GatewayResult<()> {
        info!("[gateway] DELETE /api/sessions/{}", slot);
        let resp = self
            .client
            .delete(self.url(&format!("/api/sessions/{}", slot)))
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    async fn send_text(&self, slot: &str, to: &str, text: &str) -> GatewayResult<SendReceipt> {
        let resp = self
            .client
            .post(self.url("/api/sendText"))
            .json(&json!({ "session": slot, "to": to, "text": text }))
            .send()
            .await?;
        let v = Self::into_json(resp).await?;
        Ok(serde_json::from_value(v).unwrap_or(SendReceipt { sent: true, id: None }))
    }

    async fn send_image(
        &self,
        slot: &str,
        to: &str,
        image_url: &str,
        caption: Option<&str>,
    ) -> GatewayResult<SendReceipt> {
        let resp = self
            .client
            .post(self.url("/api/sendImage"))
            .json(&json!({ "session": slot, "to": to, "image": image_url, "caption": caption }))
            .send()
            .await?;
        let v = Self::into_json(resp).await?;
        Ok(serde_json::from_value(v).unwrap_or(SendReceipt { sent: true, id: None }))
    }

    async fn send_file(
        &self,
        slot: &str,
        to: &str,
        file_url: &str,
        filename: &str,
    ) -> GatewayResult<SendReceipt> {
        let resp = self
            .client
            .post(self.url("/api/sendFile"))
            .json(&json!({ "session": slot, "to": to, "file": file_url, "filename": filename }))
            .send()
            .await?;
        let v = Self::into_json(resp).await?;
        Ok(serde_json::from_value(v).unwrap_or(SendReceipt { sent: true, id: None }))
    }

    async fn chats(&self, slot: &str) -> GatewayResult<Vec<serde_json::Value>> {
        // Prefer the overview endpoint (summaries with last message); older
        // gateway versions only expose the plain chat list.
        match self.get_array(&format!("/api/{}/chats/overview", slot)).await {
            Ok(chats) => Ok(chats),
            Err(e) if e.is_not_ready() => {
                self.get_array(&format!("/api/{}/chats", slot)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn chat_messages(
        &self,
        slot: &str,
        chat_id: &str,
        limit: Option<u32>,
        page: Option<u32>,
    ) -> GatewayResult<Vec<serde_json::Value>> {
        let mut path = format!("/api/{}/chats/{}/messages", slot, urlencoding::encode(chat_id));
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(format!("limit={}", limit));
        }
        if let Some(page) = page {
            query.push(format!("page={}", page));
        }
        if !query.is_empty() {
            path = format!("{}?{}", path, query.join("&"));
        }
        self.get_array(&path).await
    }

    async fn chat_picture(&self, slot: &str, chat_id: &str) -> GatewayResult<String> {
        self.get_data_url(
            &format!("/api/{}/chats/{}/picture", slot, urlencoding::encode(chat_id)),
            "image/jpeg",
        )
        .await
    }

    async fn archive_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()> {
        self.post_empty(&format!("/api/{}/chats/{}/archive", slot, urlencoding::encode(chat_id)))
            .await
    }

    async fn unarchive_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()> {
        self.post_empty(&format!("/api/{}/chats/{}/unarchive", slot, urlencoding::encode(chat_id)))
            .await
    }

    async fn delete_chat(&self, slot: &str, chat_id: &str) -> GatewayResult<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/{}/chats/{}", slot, urlencoding::encode(chat_id))))
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    async fn mark_read(&self, slot: &str, chat_id: &str) -> GatewayResult<()> {
        self.post_empty(&format!(
            "/api/{}/chats/{}/messages/read",
            slot,
            urlencoding::encode(chat_id)
        ))
        .await
    }

    async fn contacts(&self, slot: &str) -> GatewayResult<Vec<serde_json::Value>> {
        self.get_array(&format!("/api/{}/contacts", slot)).await
    }

    async fn contact(&self, slot: &str, contact_id: &str) -> GatewayResult<serde_json::Value> {
        self.get_json(&format!("/api/{}/contacts/{}", slot, urlencoding::encode(contact_id)))
            .await
    }

    async fn me(&self, slot: &str) -> GatewayResult<serde_json::Value> {
        self.get_json(&format!("/api/{}/me", slot)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_class() {
        assert!(GatewayError::NotFound.is_not_ready());
        assert!(GatewayError::AlreadyExists.is_not_ready());
        assert!(GatewayError::Unprocessable("premature".into()).is_not_ready());
        assert!(!GatewayError::Api { status: 500, message: "boom".into() }.is_not_ready());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::NotFound.status(), Some(404));
        assert_eq!(GatewayError::AlreadyExists.status(), Some(422));
        assert_eq!(GatewayError::Api { status: 503, message: String::new() }.status(), Some(503));
    }

    #[test]
    fn test_conversion_to_remote_failure() {
        let e: Error = GatewayError::Api { status: 500, message: "engine down".into() }.into();
        assert!(matches!(e, Error::RemoteFailure(_)));
        assert!(e.to_string().contains("500"));
    }
}
