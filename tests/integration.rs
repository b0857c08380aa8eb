// Integration suite: the session lifecycle engine driven end to end against
// a scripted gateway — create/poll/pairing, refresh and repair, QR reads,
// the send gate, stop/delete, and the chat→conversation sync.
//
// The gateway fake consumes scripted answers front to back and counts every
// call, so each test can assert not just the outcome but how often the wire
// was touched.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use zapdesk::atoms::error::Error;
use zapdesk::atoms::types::{MatchType, MessageDirection, MessageType, Session, SessionStatus};
use zapdesk::config::LifecycleConfig;
use zapdesk::engine::gateway::{
    Gateway, GatewayError, GatewayResult, RemoteMe, RemoteSession, RemoteStatus, SendReceipt,
};
use zapdesk::engine::lifecycle::Lifecycle;
use zapdesk::engine::store::{NewMessage, Store};

// ── Scripted gateway ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
struct Calls {
    create: usize,
    start: usize,
    status: usize,
    qr: usize,
    stop: usize,
    archive: usize,
    mark_read: usize,
}

#[derive(Clone)]
struct Sent {
    kind: &'static str,
    to: String,
    body: String,
}

/// Gateway fake. Status and QR answers are scripted per call; an exhausted
/// script answers with a loud 500 so an unexpected extra call fails the
/// test instead of passing silently.
#[derive(Default)]
struct MockGateway {
    status_script: Mutex<VecDeque<GatewayResult<RemoteSession>>>,
    qr_script: Mutex<VecDeque<GatewayResult<String>>>,
    chats_payload: Mutex<Vec<Value>>,
    create_error: Mutex<Option<GatewayError>>,
    stop_error: Mutex<Option<GatewayError>>,
    send_error: Mutex<Option<GatewayError>>,
    sent: Mutex<Vec<Sent>>,
    calls: Mutex<Calls>,
}

impl MockGateway {
    fn script_status(&self, result: GatewayResult<RemoteSession>) {
        self.status_script.lock().push_back(result);
    }

    fn script_qr(&self, result: GatewayResult<String>) {
        self.qr_script.lock().push_back(result);
    }

    fn set_chats(&self, chats: Vec<Value>) {
        *self.chats_payload.lock() = chats;
    }

    fn fail_next_create(&self, e: GatewayError) {
        *self.create_error.lock() = Some(e);
    }

    fn fail_next_stop(&self, e: GatewayError) {
        *self.stop_error.lock() = Some(e);
    }

    fn fail_next_send(&self, e: GatewayError) {
        *self.send_error.lock() = Some(e);
    }

    fn calls(&self) -> Calls {
        *self.calls.lock()
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    fn record_send(&self, kind: &'static str, to: &str, body: &str) -> GatewayResult<SendReceipt> {
        if let Some(e) = self.send_error.lock().take() {
            return Err(e);
        }
        let mut sent = self.sent.lock();
        sent.push(Sent { kind, to: to.to_string(), body: body.to_string() });
        Ok(SendReceipt { sent: true, id: Some(format!("wamid-{}", sent.len())) })
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn create_session(&self, _slot: &str) -> GatewayResult<()> {
        self.calls.lock().create += 1;
        match self.create_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn start_session(&self, _slot: &str) -> GatewayResult<()> {
        self.calls.lock().start += 1;
        Ok(())
    }

    async fn session_status(&self, _slot: &str) -> GatewayResult<RemoteSession> {
        self.calls.lock().status += 1;
        self.status_script.lock().pop_front().unwrap_or_else(|| {
            Err(GatewayError::Api { status: 500, message: "status script exhausted".into() })
        })
    }

    async fn qr_code(&self, _slot: &str) -> GatewayResult<String> {
        self.calls.lock().qr += 1;
        self.qr_script.lock().pop_front().unwrap_or_else(|| {
            Err(GatewayError::Api { status: 500, message: "qr script exhausted".into() })
        })
    }

    async fn stop_session(&self, _slot: &str) -> GatewayResult<()> {
        self.calls.lock().stop += 1;
        match self.stop_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_text(&self, _slot: &str, to: &str, text: &str) -> GatewayResult<SendReceipt> {
        self.record_send("text", to, text)
    }

    async fn send_image(
        &self,
        _slot: &str,
        to: &str,
        image_url: &str,
        _caption: Option<&str>,
    ) -> GatewayResult<SendReceipt> {
        self.record_send("image", to, image_url)
    }

    async fn send_file(
        &self,
        _slot: &str,
        to: &str,
        file_url: &str,
        _filename: &str,
    ) -> GatewayResult<SendReceipt> {
        self.record_send("file", to, file_url)
    }

    async fn chats(&self, _slot: &str) -> GatewayResult<Vec<Value>> {
        Ok(self.chats_payload.lock().clone())
    }

    async fn chat_messages(
        &self,
        _slot: &str,
        _chat_id: &str,
        _limit: Option<u32>,
        _page: Option<u32>,
    ) -> GatewayResult<Vec<Value>> {
        Ok(vec![])
    }

    async fn chat_picture(&self, _slot: &str, _chat_id: &str) -> GatewayResult<String> {
        Ok("data:image/jpeg;base64,mock".into())
    }

    async fn archive_chat(&self, _slot: &str, _chat_id: &str) -> GatewayResult<()> {
        self.calls.lock().archive += 1;
        Ok(())
    }

    async fn unarchive_chat(&self, _slot: &str, _chat_id: &str) -> GatewayResult<()> {
        Ok(())
    }

    async fn delete_chat(&self, _slot: &str, _chat_id: &str) -> GatewayResult<()> {
        Ok(())
    }

    async fn mark_read(&self, _slot: &str, _chat_id: &str) -> GatewayResult<()> {
        self.calls.lock().mark_read += 1;
        Ok(())
    }

    async fn contacts(&self, _slot: &str) -> GatewayResult<Vec<Value>> {
        Ok(vec![])
    }

    async fn contact(&self, _slot: &str, _contact_id: &str) -> GatewayResult<Value> {
        Ok(json!({}))
    }

    async fn me(&self, _slot: &str) -> GatewayResult<Value> {
        Ok(json!({ "id": "5511000000000@c.us", "pushName": "Gateway Mock" }))
    }
}

// ── Harness ────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<Store>,
    gateway: Arc<MockGateway>,
    lifecycle: Lifecycle,
    owner: String,
}

fn harness() -> Harness {
    harness_with_attempts(10)
}

/// In-memory store, scripted gateway, zero poll and settle delays.
fn harness_with_attempts(poll_attempts: u32) -> Harness {
    let store = Arc::new(Store::in_memory().unwrap());
    let owner = store.insert_user("owner@zapdesk.test", "hash", "Owner").unwrap().id;
    let gateway = Arc::new(MockGateway::default());
    let config = LifecycleConfig {
        poll_attempts,
        poll_delay_ms: 0,
        qr_settle_ms: 0,
        default_slot: "default".into(),
    };
    let lifecycle = Lifecycle::new(store.clone(), gateway.clone(), config);
    Harness { store, gateway, lifecycle, owner }
}

impl Harness {
    /// Session row in `starting`, inserted directly.
    fn seed_session(&self, handle: &str) -> Session {
        self.store.insert_session("Shop", handle, &self.owner).unwrap()
    }

    /// Session row already paired and working.
    fn seed_working_session(&self, handle: &str) -> Session {
        let row = self.seed_session(handle);
        self.store.set_session_working(&row.id, None, None).unwrap();
        self.store.session_by_row_id(&row.id).unwrap().unwrap()
    }
}

fn remote(status: RemoteStatus) -> RemoteSession {
    RemoteSession { status, me: None }
}

fn remote_working(jid: &str, pushname: &str) -> RemoteSession {
    RemoteSession {
        status: RemoteStatus::Working,
        me: Some(RemoteMe { id: jid.to_string(), name: None, pushname: Some(pushname.to_string()) }),
    }
}

fn inbound(owner: &str, session_row: &str, from: &str, text: &str) -> NewMessage {
    NewMessage {
        message_id: format!("wamid-{}", uuid::Uuid::new_v4().simple()),
        kind: MessageType::Text,
        direction: MessageDirection::Incoming,
        text: Some(text.to_string()),
        media_url: None,
        file_name: None,
        mime_type: None,
        metadata: None,
        from: from.to_string(),
        to: "5511000".to_string(),
        quoted_message_id: None,
        session_id: session_row.to_string(),
        contact_id: None,
        user_id: owner.to_string(),
    }
}

// ── Create & pairing ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_pairs_through_bounded_poll() {
    // Two not-ready probes, then the pairing window opens with a code.
    let h = harness();
    h.gateway.script_status(Err(GatewayError::NotFound));
    h.gateway.script_status(Err(GatewayError::NotFound));
    h.gateway.script_status(Ok(remote(RemoteStatus::ScanQrCode)));
    h.gateway.script_qr(Ok("data:image/png;base64,QR1".into()));

    let session = h.lifecycle.create_session(&h.owner, "Shop", Some("shop-main")).await.unwrap();
    assert_eq!(session.session_id, "shop-main");
    assert_eq!(session.status, SessionStatus::Qrcode);
    assert_eq!(session.qr_code.as_deref(), Some("data:image/png;base64,QR1"));

    let calls = h.gateway.calls();
    assert_eq!(calls.create, 1);
    assert_eq!(calls.status, 3);
    assert_eq!(calls.qr, 1);
}

#[tokio::test]
async fn test_create_captures_identity_when_remote_is_working() {
    let h = harness();
    h.gateway.script_status(Ok(remote_working("5511999999999@c.us", "Loja")));

    let session = h.lifecycle.create_session(&h.owner, "Shop", None).await.unwrap();
    assert_eq!(session.status, SessionStatus::Working);
    assert!(session.is_active);
    assert_eq!(session.phone_number.as_deref(), Some("5511999999999"));
    assert_eq!(session.profile_name.as_deref(), Some("Loja"));
    // No handle was requested, so one was generated.
    assert!(session.session_id.starts_with("session-"));
}

#[tokio::test]
async fn test_second_create_adopts_the_live_session() {
    let h = harness();
    h.gateway.script_status(Ok(remote(RemoteStatus::Working)));
    let first = h.lifecycle.create_session(&h.owner, "Shop", Some("shop-main")).await.unwrap();

    // One pairing at a time per owner: the working row is returned as-is,
    // with no further gateway traffic.
    let second = h.lifecycle.create_session(&h.owner, "Another", None).await.unwrap();
    assert_eq!(second.id, first.id);

    let calls = h.gateway.calls();
    assert_eq!(calls.create, 1);
    assert_eq!(calls.status, 1);
}

#[tokio::test]
async fn test_create_refuses_foreign_handle() {
    let h = harness();
    h.store.insert_session("Foreign", "taken", "someone-else").unwrap();

    let err = h.lifecycle.create_session(&h.owner, "Mine", Some("taken")).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(err.to_string(), "Session ID already exists");
    assert_eq!(h.gateway.calls().create, 0);
}

#[tokio::test]
async fn test_create_reuses_resting_row_and_stops_its_stale_slot() {
    let h = harness();
    let prior = h.seed_session("shop-main");
    h.store.set_session_status(&prior.id, SessionStatus::Failed).unwrap();

    h.gateway.script_status(Ok(remote(RemoteStatus::ScanQrCode)));
    h.gateway.script_qr(Ok("data:image/png;base64,QR2".into()));

    let revived =
        h.lifecycle.create_session(&h.owner, "Shop v2", Some("shop-main")).await.unwrap();
    assert_eq!(revived.id, prior.id);
    assert_eq!(revived.name, "Shop v2");
    assert_eq!(revived.status, SessionStatus::Qrcode);

    // The handle's previous remote slot was torn down before provisioning.
    let calls = h.gateway.calls();
    assert_eq!(calls.stop, 1);
    assert_eq!(calls.create, 1);
}

#[tokio::test]
async fn test_create_tolerates_already_provisioned_slot() {
    let h = harness();
    h.gateway.fail_next_create(GatewayError::AlreadyExists);
    h.gateway.script_status(Ok(remote(RemoteStatus::Working)));

    let session = h.lifecycle.create_session(&h.owner, "Shop", None).await.unwrap();
    assert_eq!(session.status, SessionStatus::Working);
    // A duplicate slot downgrades the create into a restart.
    assert_eq!(h.gateway.calls().start, 1);
}

#[tokio::test]
async fn test_exhausted_poll_returns_row_still_starting() {
    let h = harness_with_attempts(3);
    for _ in 0..3 {
        h.gateway.script_status(Err(GatewayError::NotFound));
    }

    let session = h.lifecycle.create_session(&h.owner, "Slow", Some("slow")).await.unwrap();
    assert_eq!(session.status, SessionStatus::Starting);
    assert!(session.qr_code.is_none());
    assert_eq!(h.gateway.calls().status, 3);
}

#[tokio::test]
async fn test_fatal_poll_error_marks_row_failed() {
    let h = harness();
    h.gateway
        .script_status(Err(GatewayError::Api { status: 401, message: "denied".into() }));

    let err = h.lifecycle.create_session(&h.owner, "Shop", Some("shop-main")).await.unwrap_err();
    assert!(matches!(err, Error::RemoteFailure(_)));

    // The failed row stays behind for the next create to reuse.
    let row = h.store.find_session("shop-main").unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Failed);
    assert!(!row.is_active);
}

#[tokio::test]
async fn test_create_requires_known_owner() {
    let h = harness();
    let err = h.lifecycle.create_session("ghost", "Shop", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(h.gateway.calls().create, 0);
}

// ── Refresh & repair ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_applies_remote_observations() {
    let h = harness();
    h.seed_session("shop-main");

    h.gateway.script_status(Ok(remote_working("5511888@c.us", "Shop")));
    let refreshed = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(refreshed.status, SessionStatus::Working);
    assert_eq!(refreshed.phone_number.as_deref(), Some("5511888"));

    h.gateway.script_status(Ok(remote(RemoteStatus::Stopped)));
    let refreshed = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(refreshed.status, SessionStatus::Stopped);
    assert!(!refreshed.is_active);
}

#[tokio::test]
async fn test_refresh_keeps_cached_status_when_remote_is_unhelpful() {
    let h = harness();
    h.seed_working_session("shop-main");

    // A booting remote reports STARTING: no local change.
    h.gateway.script_status(Ok(remote(RemoteStatus::Starting)));
    let row = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(row.status, SessionStatus::Working);

    // Unrecognized vocabulary from a newer gateway: no local change.
    h.gateway.script_status(Ok(remote(RemoteStatus::Unknown)));
    let row = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(row.status, SessionStatus::Working);

    // Mid-restart 404 and engine 5xx are absorbed the same way.
    h.gateway.script_status(Err(GatewayError::NotFound));
    let row = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(row.status, SessionStatus::Working);

    h.gateway.script_status(Err(GatewayError::Api { status: 503, message: "down".into() }));
    let row = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap();
    assert_eq!(row.status, SessionStatus::Working);
}

#[tokio::test]
async fn test_refresh_surfaces_auth_failures_without_corrupting_the_row() {
    let h = harness();
    h.seed_working_session("shop-main");

    h.gateway.script_status(Err(GatewayError::Api { status: 401, message: "bad key".into() }));
    let err = h.lifecycle.refresh_status(&h.owner, "shop-main").await.unwrap_err();
    assert!(matches!(err, Error::RemoteFailure(_)));

    // Propagated, not failed: the cached view survives.
    let row = h.store.find_session("shop-main").unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Working);
}

#[tokio::test]
async fn test_list_repairs_newest_row_against_a_live_remote() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.set_session_status(&row.id, SessionStatus::Stopped).unwrap();

    // The gateway kept running across a backend restart.
    h.gateway.script_status(Ok(remote_working("5511777@c.us", "Shop")));
    let sessions = h.lifecycle.list_sessions(&h.owner).await.unwrap();
    assert_eq!(sessions[0].status, SessionStatus::Working);

    // An unreachable gateway leaves the cached rows untouched.
    h.gateway.script_status(Err(GatewayError::NotFound));
    let sessions = h.lifecycle.list_sessions(&h.owner).await.unwrap();
    assert_eq!(sessions[0].status, SessionStatus::Working);
}

#[tokio::test]
async fn test_foreign_session_reads_as_missing() {
    let h = harness();
    h.store.insert_session("Foreign", "other", "someone-else").unwrap();

    let err = h.lifecycle.get_session(&h.owner, "other").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    let err = h.lifecycle.stop_session(&h.owner, "other").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ── QR reads ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_qr_is_fetched_fresh_while_pairing() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.store_fresh_qr(&row.id, "data:image/png;base64,OLD").unwrap();

    // Codes expire, so every read during the pairing window hits the remote.
    h.gateway.script_status(Ok(remote(RemoteStatus::ScanQrCode)));
    h.gateway.script_qr(Ok("data:image/png;base64,NEW".into()));
    let qr = h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap();
    assert_eq!(qr, "data:image/png;base64,NEW");

    h.gateway.script_status(Ok(remote(RemoteStatus::ScanQrCode)));
    h.gateway.script_qr(Ok("data:image/png;base64,NEWER".into()));
    let qr = h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap();
    assert_eq!(qr, "data:image/png;base64,NEWER");

    assert_eq!(h.gateway.calls().qr, 2);
    let row = h.store.find_session("shop-main").unwrap().unwrap();
    assert_eq!(row.qr_code.as_deref(), Some("data:image/png;base64,NEWER"));
}

#[tokio::test]
async fn test_qr_never_fails_for_gateway_reasons() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.store_fresh_qr(&row.id, "data:image/png;base64,CACHED").unwrap();

    // Already paired: nothing to scan.
    h.gateway.script_status(Ok(remote(RemoteStatus::Working)));
    assert_eq!(h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap(), "");

    // Outside the pairing window: cached code.
    h.gateway.script_status(Ok(remote(RemoteStatus::Stopped)));
    let qr = h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap();
    assert_eq!(qr, "data:image/png;base64,CACHED");

    // Status probe down: cached code beats a doomed fetch.
    h.gateway.script_status(Err(GatewayError::Api { status: 500, message: "down".into() }));
    let qr = h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap();
    assert_eq!(qr, "data:image/png;base64,CACHED");

    // Window open but the fetch itself refuses: cached fallback.
    h.gateway.script_status(Ok(remote(RemoteStatus::ScanQrCode)));
    h.gateway.script_qr(Err(GatewayError::Unprocessable("not ready".into())));
    let qr = h.lifecycle.qr_code(&h.owner, "shop-main").await.unwrap();
    assert_eq!(qr, "data:image/png;base64,CACHED");

    assert_eq!(h.gateway.calls().qr, 1);
}

// ── Send gate ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_refused_before_pairing_completes() {
    let h = harness();
    h.seed_session("shop-main");

    let err =
        h.lifecycle.send_text(&h.owner, "shop-main", "5511999@c.us", "oi").await.unwrap_err();
    assert!(matches!(err, Error::NotReadyForSend(_)));
    // Refused before any wire traffic.
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn test_send_refused_again_after_stop() {
    let h = harness();
    let row = h.seed_working_session("shop-main");
    h.store.set_session_status(&row.id, SessionStatus::Stopped).unwrap();

    let err =
        h.lifecycle.send_text(&h.owner, "shop-main", "5511999@c.us", "oi").await.unwrap_err();
    assert!(matches!(err, Error::NotReadyForSend(_)));
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn test_sends_go_out_once_working() {
    let h = harness();
    h.seed_working_session("shop-main");

    let receipt =
        h.lifecycle.send_text(&h.owner, "shop-main", "5511999@c.us", "oi").await.unwrap();
    assert!(receipt.sent);
    assert!(receipt.id.is_some());

    h.lifecycle
        .send_image(&h.owner, "shop-main", "5511999@c.us", "https://cdn.test/pic.png", Some("look"))
        .await
        .unwrap();
    h.lifecycle
        .send_file(&h.owner, "shop-main", "5511999@c.us", "https://cdn.test/doc.pdf", "doc.pdf")
        .await
        .unwrap();

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].kind, "text");
    assert_eq!(sent[0].to, "5511999@c.us");
    assert_eq!(sent[0].body, "oi");
    assert_eq!(sent[1].kind, "image");
    assert_eq!(sent[2].kind, "file");
}

#[tokio::test]
async fn test_send_failure_propagates_and_leaves_the_row_alone() {
    let h = harness();
    h.seed_working_session("shop-main");

    h.gateway.fail_next_send(GatewayError::Api { status: 500, message: "engine down".into() });
    let err =
        h.lifecycle.send_text(&h.owner, "shop-main", "5511999@c.us", "oi").await.unwrap_err();
    assert!(matches!(err, Error::RemoteFailure(_)));

    let row = h.store.find_session("shop-main").unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Working);
}

// ── Stop & delete ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_persists_the_stopped_row() {
    let h = harness();
    h.seed_working_session("shop-main");

    let stopped = h.lifecycle.stop_session(&h.owner, "shop-main").await.unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert!(!stopped.is_active);
    assert_eq!(h.gateway.calls().stop, 1);
}

#[tokio::test]
async fn test_stop_failure_keeps_the_last_state() {
    let h = harness();
    h.seed_working_session("shop-main");

    h.gateway.fail_next_stop(GatewayError::Api { status: 500, message: "boom".into() });
    assert!(h.lifecycle.stop_session(&h.owner, "shop-main").await.is_err());

    // No local pretence: the row still says working.
    let row = h.store.find_session("shop-main").unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Working);
}

#[tokio::test]
async fn test_delete_stops_a_live_session_first() {
    let h = harness();
    h.seed_working_session("shop-main");

    h.lifecycle.delete_session(&h.owner, "shop-main").await.unwrap();
    assert_eq!(h.gateway.calls().stop, 1);
    assert!(h.store.find_session("shop-main").unwrap().is_none());
}

#[tokio::test]
async fn test_delete_skips_stop_for_a_resting_session() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.set_session_status(&row.id, SessionStatus::Stopped).unwrap();

    h.lifecycle.delete_session(&h.owner, "shop-main").await.unwrap();
    assert_eq!(h.gateway.calls().stop, 0);
    assert!(h.store.find_session("shop-main").unwrap().is_none());
}

#[tokio::test]
async fn test_deleted_handle_is_free_for_a_new_pairing() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.set_session_status(&row.id, SessionStatus::Stopped).unwrap();
    h.lifecycle.delete_session(&h.owner, "shop-main").await.unwrap();

    h.gateway.script_status(Ok(remote(RemoteStatus::Working)));
    let fresh = h.lifecycle.create_session(&h.owner, "Shop again", Some("shop-main")).await.unwrap();
    assert_ne!(fresh.id, row.id);
    assert_eq!(fresh.session_id, "shop-main");
}

// ── Chat sync & mirrors ────────────────────────────────────────────────────

#[tokio::test]
async fn test_sync_chats_requires_working() {
    let h = harness();
    h.seed_session("shop-main");

    let err = h.lifecycle.sync_chats(&h.owner, "shop-main").await.unwrap_err();
    assert!(matches!(err, Error::NotReadyForSend(_)));
}

#[tokio::test]
async fn test_sync_chats_mirrors_contacts_and_threads() {
    let h = harness();
    let row = h.seed_working_session("shop-main");

    h.gateway.set_chats(vec![
        json!({
            "id": "5511999@c.us",
            "name": "Alice",
            "unreadCount": 3,
            "lastMessage": { "body": "see you", "type": "text" }
        }),
        json!({
            "id": { "_serialized": "5522888@c.us" },
            "lastMessage": { "type": "image" }
        }),
    ]);

    let conversations = h.lifecycle.sync_chats(&h.owner, "shop-main").await.unwrap();
    assert_eq!(conversations.len(), 2);

    let alice = conversations.iter().find(|c| c.phone_number == "5511999").unwrap();
    assert_eq!(alice.unread_count, 3);
    assert_eq!(alice.last_message.as_deref(), Some("see you"));
    let other = conversations.iter().find(|c| c.phone_number == "5522888").unwrap();
    assert_eq!(other.last_message.as_deref(), Some("📷 Image"));

    let mirrored = h.store.find_contact_by_phone(&h.owner, "5511999").unwrap().unwrap();
    assert_eq!(mirrored.name, "Alice");
    let nameless = h.store.find_contact_by_phone(&h.owner, "5522888").unwrap().unwrap();
    assert_eq!(nameless.name, "5522888");

    // A later sync refreshes previews without resurrecting local unread
    // state the user already cleared.
    h.store.mark_conversation_read(&h.owner, &row.id, "5511999").unwrap();
    h.gateway.set_chats(vec![json!({
        "id": "5511999@c.us",
        "name": "Alice",
        "unreadCount": 9,
        "lastMessage": { "body": "later", "type": "text" }
    })]);
    let conversations = h.lifecycle.sync_chats(&h.owner, "shop-main").await.unwrap();
    let alice = conversations.iter().find(|c| c.phone_number == "5511999").unwrap();
    assert_eq!(alice.unread_count, 0);
    assert_eq!(alice.last_message.as_deref(), Some("later"));
}

#[tokio::test]
async fn test_sync_never_downgrades_a_contact_name_to_the_number() {
    let h = harness();
    h.seed_working_session("shop-main");
    h.store.insert_contact(&h.owner, "Alice", "5511999", None, None, None, None).unwrap();

    // Chat with no usable name: the stored name survives.
    h.gateway.set_chats(vec![json!({ "id": "5511999@c.us" })]);
    h.lifecycle.sync_chats(&h.owner, "shop-main").await.unwrap();
    let contact = h.store.find_contact_by_phone(&h.owner, "5511999").unwrap().unwrap();
    assert_eq!(contact.name, "Alice");

    // A real rename is followed.
    h.gateway.set_chats(vec![json!({ "id": "5511999@c.us", "name": "Alice Silva" })]);
    h.lifecycle.sync_chats(&h.owner, "shop-main").await.unwrap();
    let contact = h.store.find_contact_by_phone(&h.owner, "5511999").unwrap().unwrap();
    assert_eq!(contact.name, "Alice Silva");
}

#[tokio::test]
async fn test_chats_count_is_gated_on_working() {
    let h = harness();
    h.seed_session("counted");

    let err = h.lifecycle.chats_count(&h.owner, "counted").await.unwrap_err();
    assert!(matches!(err, Error::NotReadyForSend(_)));

    let row = h.store.find_session("counted").unwrap().unwrap();
    h.store.set_session_working(&row.id, None, None).unwrap();
    h.gateway.set_chats(vec![json!({ "id": "a@c.us" }), json!({ "id": "b@c.us" })]);
    assert_eq!(h.lifecycle.chats_count(&h.owner, "counted").await.unwrap(), 2);
}

#[tokio::test]
async fn test_archive_and_read_mirror_local_threads() {
    let h = harness();
    let row = h.seed_working_session("shop-main");
    h.store.insert_message(&inbound(&h.owner, &row.id, "5511999", "oi")).unwrap();

    h.lifecycle.archive_chat(&h.owner, "shop-main", "5511999@c.us").await.unwrap();
    assert_eq!(h.gateway.calls().archive, 1);
    assert!(h.store.list_conversations(&h.owner, None).unwrap().is_empty());

    h.lifecycle.unarchive_chat(&h.owner, "shop-main", "5511999@c.us").await.unwrap();
    let threads = h.store.list_conversations(&h.owner, None).unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].unread_count, 1);

    h.lifecycle.mark_chat_read(&h.owner, "shop-main", "5511999@c.us").await.unwrap();
    assert_eq!(h.gateway.calls().mark_read, 1);
    let threads = h.store.list_conversations(&h.owner, None).unwrap();
    assert_eq!(threads[0].unread_count, 0);
}

// ── Keyword auto-replies ───────────────────────────────────────────────────

#[tokio::test]
async fn test_keyword_rule_answers_inbound_text() {
    let h = harness();
    let row = h.seed_working_session("shop-main");
    h.store
        .insert_keyword(&h.owner, "preço", MatchType::Contains, "Tabela: zapdesk.test/precos", 5)
        .unwrap();

    let session = h.store.session_by_row_id(&row.id).unwrap().unwrap();
    let reply = h
        .lifecycle
        .auto_reply_text(&session, "5511999@c.us", "qual o PREÇO?")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reply.direction, MessageDirection::Outgoing);
    assert!(reply.message_id.starts_with("auto_"));
    assert_eq!(reply.text.as_deref(), Some("Tabela: zapdesk.test/precos"));
    assert_eq!(reply.metadata.as_ref().unwrap()["autoReply"], json!(true));

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "5511999@c.us");
    assert_eq!(sent[0].body, "Tabela: zapdesk.test/precos");
}

#[tokio::test]
async fn test_auto_reply_respects_the_send_gate() {
    let h = harness();
    let row = h.seed_session("shop-main");
    h.store.insert_keyword(&h.owner, "oi", MatchType::Exact, "Olá!", 0).unwrap();

    // Session still pairing: the rule matches but the gate refuses, and
    // nothing is sent or recorded.
    let session = h.store.session_by_row_id(&row.id).unwrap().unwrap();
    let reply = h.lifecycle.auto_reply_text(&session, "5511999@c.us", "oi").await.unwrap();
    assert!(reply.is_none());
    assert!(h.gateway.sent().is_empty());
    assert!(h.store.list_messages(&h.owner, None, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_no_matching_rule_means_no_reply() {
    let h = harness();
    let row = h.seed_working_session("shop-main");
    h.store.insert_keyword(&h.owner, "preço", MatchType::Contains, "Tabela", 0).unwrap();

    let session = h.store.session_by_row_id(&row.id).unwrap().unwrap();
    let reply = h.lifecycle.auto_reply_text(&session, "5511999@c.us", "bom dia").await.unwrap();
    assert!(reply.is_none());
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn test_failed_reply_send_is_absorbed() {
    let h = harness();
    let row = h.seed_working_session("shop-main");
    h.store.insert_keyword(&h.owner, "oi", MatchType::Exact, "Olá!", 0).unwrap();

    h.gateway.fail_next_send(GatewayError::Api { status: 500, message: "down".into() });
    let session = h.store.session_by_row_id(&row.id).unwrap().unwrap();
    let reply = h.lifecycle.auto_reply_text(&session, "5511999@c.us", "oi").await.unwrap();
    assert!(reply.is_none());
    // The failed attempt leaves no phantom outgoing message behind.
    assert!(h.store.list_messages(&h.owner, None, None).unwrap().is_empty());
}
