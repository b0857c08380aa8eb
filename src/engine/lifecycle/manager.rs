// Session lifecycle manager. Owns the reconciliation between the locally
// persisted session row and the live remote gateway process.
//
// The row is a cache of the last-observed remote state, never the truth:
// no operation here assumes the cached status is currently true of the
// remote. Reads refresh the cache on demand; writes go through the status
// mapping in `mapping.rs`; gateway failures are settled through the
// disposition table so every swallow is auditable in one place.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::atoms::error::{Error, Result};
use crate::atoms::types::{Session, SessionStatus};
use crate::config::LifecycleConfig;
use crate::engine::gateway::{Gateway, GatewayError, RemoteStatus};
use crate::engine::store::Store;

use super::mapping::{self, Disposition, GatewayOp};
use super::slots;

pub struct Lifecycle {
    pub(crate) store: Arc<Store>,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) config: LifecycleConfig,
}

/// How one bounded poll ended.
enum PollOutcome {
    /// A successful probe was applied; the row is returned as persisted.
    Observed(Session),
    /// Every attempt answered not-ready; the row was never touched.
    Exhausted,
    /// A gateway failure outside the not-ready class.
    Fatal(GatewayError),
}

impl Lifecycle {
    pub fn new(store: Arc<Store>, gateway: Arc<dyn Gateway>, config: LifecycleConfig) -> Self {
        Lifecycle { store, gateway, config }
    }

    // ── Create ─────────────────────────────────────────────────────────

    /// Create (or reconnect) a session for `owner`. Bounded call: remote
    /// provisioning plus at most `poll_attempts` status probes. May return
    /// a row still in `starting` when the remote takes longer than the
    /// poll budget; the caller is expected to keep polling status.
    pub async fn create_session(
        &self,
        owner: &str,
        name: &str,
        requested_id: Option<&str>,
    ) -> Result<Session> {
        if self.store.find_user(owner)?.is_none() {
            return Err(Error::not_found("User not found"));
        }

        let handle = match requested_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("session-{}", &uuid::Uuid::new_v4().to_string()[..8]),
        };

        // One pairing at a time per owner. An in-progress session is
        // adopted instead of racing a second remote pairing against it.
        if let Some(existing) = self.store.list_sessions(owner)?.into_iter().find(|s| s.status.is_live()) {
            if existing.status == SessionStatus::Working {
                info!(
                    "[lifecycle] Session '{}' already working for user {}, returning it",
                    existing.session_id, owner
                );
                return Ok(existing);
            }
            if existing.status == SessionStatus::Qrcode && existing.qr_code.is_some() {
                debug!(
                    "[lifecycle] Session '{}' is pairing, returning it with the cached code",
                    existing.session_id
                );
                return Ok(existing);
            }
            // Starting, or qrcode with no code cached: the remote side may
            // never have materialized. Restart it on the existing row.
            return self.revive_session(existing).await;
        }

        // Handle bookkeeping: reuse the owner's resting row under this
        // handle, refuse a live or foreign one, otherwise insert fresh.
        // The partial unique index backs this up against concurrent
        // creates racing the same handle.
        let (row, reused) = match self.store.find_session(&handle)? {
            Some(prior) if prior.user_id == owner && prior.status.is_resting() => {
                let row = self
                    .store
                    .reset_session_for_restart(&prior.id, name)?
                    .ok_or_else(|| Error::not_found("Session not found"))?;
                info!("[lifecycle] Reusing resting session '{}' for user {}", handle, owner);
                (row, true)
            }
            Some(_) => return Err(Error::conflict("Session ID already exists")),
            None => (self.store.insert_session(name, &handle, owner)?, false),
        };

        let slot = slots::resolve(&self.store, &self.config, &row.session_id)?;

        // A reused handle may still hold a half-dead remote slot from the
        // previous pairing; tear it down before provisioning again.
        if reused {
            if let Err(e) = self.gateway.stop_session(&slot).await {
                if !matches!(e, GatewayError::NotFound) {
                    warn!("[lifecycle] Could not stop previous slot '{}': {}", slot, e);
                }
            }
        }

        info!("[lifecycle] Provisioning slot '{}' for session '{}'", slot, row.session_id);
        if let Err(e) = self.ensure_remote(&slot).await {
            match mapping::disposition(GatewayOp::CreateRemote, &e) {
                Disposition::AbsorbKeep => {
                    warn!(
                        "[lifecycle] Slot '{}' missing after provisioning ({}), polling anyway",
                        slot, e
                    );
                }
                _ => return Err(self.settle_fatal(GatewayOp::CreateRemote, &row.id, e)),
            }
        }

        match self.poll_remote(&row.id, &slot, GatewayOp::CreatePoll).await? {
            PollOutcome::Observed(session) => Ok(session),
            PollOutcome::Exhausted => {
                warn!(
                    "[lifecycle] Slot '{}' not ready after {} attempts, returning starting row",
                    slot, self.config.poll_attempts
                );
                self.require_row(&row.id)
            }
            PollOutcome::Fatal(e) => Err(self.settle_fatal(GatewayOp::CreatePoll, &row.id, e)),
        }
    }

    /// Restart the remote side of an in-progress row whose gateway
    /// presence is in doubt. The row predates this call, so gateway
    /// refusals fall back to returning it as-is; fatals surface without
    /// marking it failed.
    async fn revive_session(&self, row: Session) -> Result<Session> {
        let slot = slots::resolve(&self.store, &self.config, &row.session_id)?;
        info!("[lifecycle] Reviving session '{}' on slot '{}'", row.session_id, slot);

        if let Err(e) = self.ensure_remote(&slot).await {
            return match mapping::disposition(GatewayOp::Revive, &e) {
                Disposition::AbsorbKeep => {
                    warn!(
                        "[lifecycle] Remote refused revival of '{}' ({}), keeping the row as-is",
                        row.session_id, e
                    );
                    Ok(row)
                }
                _ => Err(self.settle_fatal(GatewayOp::Revive, &row.id, e)),
            };
        }

        match self.poll_remote(&row.id, &slot, GatewayOp::Revive).await? {
            PollOutcome::Observed(session) => Ok(session),
            PollOutcome::Exhausted => {
                warn!(
                    "[lifecycle] Slot '{}' not ready after {} attempts, returning adopted row",
                    slot, self.config.poll_attempts
                );
                Ok(row)
            }
            PollOutcome::Fatal(e) => Err(self.settle_fatal(GatewayOp::Revive, &row.id, e)),
        }
    }

    /// Bring the remote slot up. Creation tolerates a slot that already
    /// exists by restarting it; a start refusal in the not-ready class
    /// means the slot is already coming up, which the poll will confirm.
    async fn ensure_remote(&self, slot: &str) -> std::result::Result<(), GatewayError> {
        match self.gateway.create_session(slot).await {
            Ok(()) => Ok(()),
            Err(GatewayError::AlreadyExists) => {
                info!("[lifecycle] Slot '{}' already provisioned, restarting it", slot);
                match self.gateway.start_session(slot).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_ready() => {
                        debug!("[lifecycle] Start refused for slot '{}' ({}), polling anyway", slot, e);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Bounded reconciliation poll. Waits, probes, applies the first
    /// successful observation, and grabs the pairing code if the pairing
    /// window just opened. Only not-ready answers consume attempts; the
    /// first successful probe decides the outcome whatever it says.
    async fn poll_remote(&self, row_id: &str, slot: &str, op: GatewayOp) -> Result<PollOutcome> {
        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(Duration::from_millis(self.config.poll_delay_ms)).await;

            let remote = match self.gateway.session_status(slot).await {
                Ok(remote) => remote,
                Err(e) => {
                    if mapping::disposition(op, &e) == Disposition::AbsorbKeep {
                        debug!(
                            "[lifecycle] Slot '{}' not ready yet (attempt {}/{})",
                            slot, attempt, self.config.poll_attempts
                        );
                        continue;
                    }
                    return Ok(PollOutcome::Fatal(e));
                }
            };

            mapping::apply_observation(&self.store, row_id, &remote)?;
            let mut row = self.require_row(row_id)?;

            if row.status == SessionStatus::Qrcode && row.qr_code.is_none() {
                // The code often lags the status change by a moment.
                tokio::time::sleep(Duration::from_millis(self.config.qr_settle_ms)).await;
                match self.gateway.qr_code(slot).await {
                    Ok(qr) if !qr.is_empty() => {
                        self.store.store_fresh_qr(row_id, &qr)?;
                        row = self.require_row(row_id)?;
                    }
                    Ok(_) => {}
                    Err(e) => match mapping::disposition(GatewayOp::FetchQr, &e) {
                        Disposition::AbsorbKeep => {
                            warn!(
                                "[lifecycle] Pairing code not available yet for slot '{}': {}",
                                slot, e
                            );
                        }
                        _ => return Ok(PollOutcome::Fatal(e)),
                    },
                }
            }

            return Ok(PollOutcome::Observed(row));
        }

        Ok(PollOutcome::Exhausted)
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// One session by handle, scoped to its owner. A handle owned by a
    /// different user is indistinguishable from a missing one.
    pub fn get_session(&self, owner: &str, session_id: &str) -> Result<Session> {
        self.find_owned(owner, session_id)
    }

    /// All sessions for one owner, newest first. As a side effect the
    /// newest row is reconciled against the remote when the two obviously
    /// disagree: a gateway that kept running across a backend restart
    /// still reports working while the row says stopped or failed.
    pub async fn list_sessions(&self, owner: &str) -> Result<Vec<Session>> {
        let mut sessions = self.store.list_sessions(owner)?;

        if let Some(latest) = sessions.first().cloned() {
            let slot = slots::resolve(&self.store, &self.config, &latest.session_id)?;
            match self.gateway.session_status(&slot).await {
                Ok(remote)
                    if remote.status == RemoteStatus::Working && latest.status.is_resting() =>
                {
                    info!(
                        "[lifecycle] Repairing session '{}': remote is working, row said {}",
                        latest.session_id,
                        latest.status.as_str()
                    );
                    mapping::apply_observation(&self.store, &latest.id, &remote)?;
                    sessions[0] = self.require_row(&latest.id)?;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        "[lifecycle] Could not reconcile newest session '{}': {}",
                        latest.session_id, e
                    );
                }
            }
        }

        Ok(sessions)
    }

    /// Single non-looping reconciliation: probe the remote once, persist
    /// the mapped status, return the row. An unreachable or not-ready
    /// remote keeps the cached view instead of corrupting it.
    pub async fn refresh_status(&self, owner: &str, session_id: &str) -> Result<Session> {
        let row = self.find_owned(owner, session_id)?;
        let slot = slots::resolve(&self.store, &self.config, &row.session_id)?;

        match self.gateway.session_status(&slot).await {
            Ok(remote) => {
                if let Some(status) = mapping::apply_observation(&self.store, &row.id, &remote)? {
                    debug!(
                        "[lifecycle] Session '{}' refreshed to {}",
                        session_id,
                        status.as_str()
                    );
                }
                self.require_row(&row.id)
            }
            Err(e) => match mapping::disposition(GatewayOp::Refresh, &e) {
                Disposition::AbsorbKeep => {
                    debug!(
                        "[lifecycle] Remote unavailable for '{}' ({}), keeping cached status {}",
                        session_id,
                        e,
                        row.status.as_str()
                    );
                    Ok(row)
                }
                _ => Err(self.settle_fatal(GatewayOp::Refresh, &row.id, e)),
            },
        }
    }

    /// Pairing-code read. Never fails for gateway reasons: the worst
    /// answer is an empty string, the best a freshly minted code. A
    /// cached code is served only when a live fetch is impossible,
    /// because codes expire and a stale one pairs nothing.
    pub async fn qr_code(&self, owner: &str, session_id: &str) -> Result<String> {
        let row = self.find_owned(owner, session_id)?;
        let slot = slots::resolve(&self.store, &self.config, &row.session_id)?;

        match self.gateway.session_status(&slot).await {
            Ok(remote) => match remote.status {
                RemoteStatus::Working => {
                    debug!("[lifecycle] Session '{}' already working, no pairing needed", session_id);
                    return Ok(String::new());
                }
                // Pairing window open: fall through to the fresh fetch.
                RemoteStatus::ScanQrCode => {}
                other => {
                    debug!(
                        "[lifecycle] Slot '{}' is {:?}, serving cached code if any",
                        slot, other
                    );
                    return Ok(row.qr_code.unwrap_or_default());
                }
            },
            Err(e) => {
                // Probe failed; a cached code beats a fetch that is
                // unlikely to fare better.
                if let Some(cached) = row.qr_code.clone() {
                    warn!(
                        "[lifecycle] Status probe failed for '{}' ({}), serving cached code",
                        session_id, e
                    );
                    return Ok(cached);
                }
            }
        }

        match self.gateway.qr_code(&slot).await {
            Ok(qr) => {
                self.store.store_fresh_qr(&row.id, &qr)?;
                info!("[lifecycle] Fresh pairing code stored for session '{}'", session_id);
                Ok(qr)
            }
            Err(e) => match mapping::disposition(GatewayOp::FetchQr, &e) {
                Disposition::AbsorbKeep => {
                    warn!(
                        "[lifecycle] Pairing code fetch failed for '{}' ({}), serving cached copy",
                        session_id, e
                    );
                    Ok(row.qr_code.unwrap_or_default())
                }
                _ => Err(e.into()),
            },
        }
    }

    // ── Teardown ───────────────────────────────────────────────────────

    /// Stop the remote, then persist `stopped`. A remote failure here
    /// propagates with no local pretence: the row keeps its last state.
    pub async fn stop_session(&self, owner: &str, session_id: &str) -> Result<Session> {
        let row = self.find_owned(owner, session_id)?;
        let slot = slots::resolve(&self.store, &self.config, &row.session_id)?;

        match self.gateway.stop_session(&slot).await {
            Ok(()) => {
                self.store.set_session_status(&row.id, SessionStatus::Stopped)?;
                info!("[lifecycle] Session '{}' stopped", session_id);
                self.require_row(&row.id)
            }
            Err(e) => Err(self.settle_fatal(GatewayOp::Stop, &row.id, e)),
        }
    }

    /// Soft-delete, stopping the remote first when the row says the
    /// session is live on the wire. Dependent messages and conversations
    /// keep their references; history is append-only.
    pub async fn delete_session(&self, owner: &str, session_id: &str) -> Result<()> {
        let row = self.find_owned(owner, session_id)?;

        if row.status == SessionStatus::Working {
            self.stop_session(owner, session_id).await?;
        }

        self.store.soft_delete_session(&row.id)?;
        info!("[lifecycle] Session '{}' deleted", session_id);
        Ok(())
    }

    // ── Shared plumbing ────────────────────────────────────────────────

    pub(crate) fn find_owned(&self, owner: &str, session_id: &str) -> Result<Session> {
        match self.store.find_session(session_id)? {
            Some(session) if session.user_id == owner => Ok(session),
            _ => Err(Error::not_found("Session not found")),
        }
    }

    pub(crate) fn require_row(&self, row_id: &str) -> Result<Session> {
        self.store
            .session_by_row_id(row_id)?
            .ok_or_else(|| Error::not_found("Session not found"))
    }

    pub(crate) fn slot_for(&self, session: &Session) -> Result<String> {
        slots::resolve(&self.store, &self.config, &session.session_id)
    }

    /// Convert a fatal gateway error for the caller, marking the row
    /// failed first when the policy table says so. The failed row is left
    /// behind so the next create can inspect and reuse it.
    fn settle_fatal(&self, op: GatewayOp, row_id: &str, err: GatewayError) -> Error {
        if mapping::disposition(op, &err) == Disposition::FailThenPropagate {
            if let Err(store_err) = self.store.set_session_status(row_id, SessionStatus::Failed) {
                warn!("[lifecycle] Could not mark session row {} failed: {}", row_id, store_err);
            }
        }
        err.into()
    }
}
