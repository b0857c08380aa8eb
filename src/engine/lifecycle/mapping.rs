// Remote→local status mapping and the error disposition table. Every rule
// about how an observed gateway state or gateway failure may touch the
// local row lives here, so the whole policy is auditable in one place and
// the manager never branches on raw status codes.

use crate::atoms::error::Result;
use crate::atoms::types::SessionStatus;
use crate::engine::gateway::{GatewayError, RemoteSession, RemoteStatus};
use crate::engine::store::Store;

// ── Status mapping ─────────────────────────────────────────────────────────

/// Local status one remote observation maps to. `None` for the remote
/// states that must not move the cached row (booting, unrecognized).
pub fn local_status_for(remote: RemoteStatus) -> Option<SessionStatus> {
    match remote {
        RemoteStatus::Working => Some(SessionStatus::Working),
        RemoteStatus::ScanQrCode => Some(SessionStatus::Qrcode),
        RemoteStatus::Failed => Some(SessionStatus::Failed),
        RemoteStatus::Stopped => Some(SessionStatus::Stopped),
        RemoteStatus::Starting | RemoteStatus::Unknown => None,
    }
}

/// Write one observation into the row. A working remote also captures the
/// account identity when it was reported. Returns the status written, or
/// None when the observation leaves the row alone.
pub fn apply_observation(
    store: &Store,
    row_id: &str,
    remote: &RemoteSession,
) -> Result<Option<SessionStatus>> {
    match local_status_for(remote.status) {
        Some(SessionStatus::Working) => {
            let phone = remote.me.as_ref().map(|m| phone_from_jid(&m.id));
            let profile = remote.me.as_ref().and_then(|m| m.display_name());
            store.set_session_working(row_id, phone.as_deref(), profile.as_deref())?;
            Ok(Some(SessionStatus::Working))
        }
        Some(status) => {
            store.set_session_status(row_id, status)?;
            Ok(Some(status))
        }
        None => Ok(None),
    }
}

/// Account ids come as JIDs ("5511999@c.us", "1234-5678@g.us"); the part
/// before the @ is the phone number.
pub fn phone_from_jid(jid: &str) -> String {
    match jid.split_once('@') {
        Some((phone, _)) => phone.to_string(),
        None => jid.to_string(),
    }
}

// ── Error dispositions ─────────────────────────────────────────────────────

/// Lifecycle operations that can observe a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOp {
    /// Provisioning the remote slot during create.
    CreateRemote,
    /// One attempt of the bounded create poll.
    CreatePoll,
    /// Restarting the remote for a row adopted from a previous create.
    /// The row predates the current call, so a failed restart must not
    /// clobber it with `failed`.
    Revive,
    /// On-demand status refresh of an existing row.
    Refresh,
    /// Pairing-code fetch (status probe and QR read alike).
    FetchQr,
    /// Remote teardown.
    Stop,
    /// Outbound message delivery.
    Send,
}

/// What the manager does with a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Surface the error to the caller; the row stays as it was.
    Propagate,
    /// Mark the row failed, then surface the error.
    FailThenPropagate,
    /// Swallow the error; the row keeps serving the last observation.
    AbsorbKeep,
}

/// The policy table. One entry per operation and error class.
pub fn disposition(op: GatewayOp, error: &GatewayError) -> Disposition {
    match op {
        // A 404 from provisioning means the engine is still materializing
        // the slot; the poll gives it time. Anything else aborts the
        // create.
        GatewayOp::CreateRemote => match error {
            GatewayError::NotFound => Disposition::AbsorbKeep,
            _ => Disposition::FailThenPropagate,
        },
        // Not-ready answers consume a poll attempt; anything else aborts
        // the create, leaving a failed row for the next attempt to reuse.
        GatewayOp::CreatePoll => {
            if error.is_not_ready() {
                Disposition::AbsorbKeep
            } else {
                Disposition::FailThenPropagate
            }
        }
        // Same absorb class as the create poll, but fatals leave the
        // adopted row untouched.
        GatewayOp::Revive => {
            if error.is_not_ready() {
                Disposition::AbsorbKeep
            } else {
                Disposition::Propagate
            }
        }
        // A missing, mid-restart, or server-erroring remote does not
        // invalidate the cached view; transport and auth failures do
        // surface.
        GatewayOp::Refresh => match error {
            e if e.is_not_ready() => Disposition::AbsorbKeep,
            GatewayError::Api { status, .. } if *status >= 500 => Disposition::AbsorbKeep,
            _ => Disposition::Propagate,
        },
        // Pairing reads fall back to the cached code, never to an error.
        GatewayOp::FetchQr => Disposition::AbsorbKeep,
        // Teardown and sends have no safe local fallback.
        GatewayOp::Stop | GatewayOp::Send => Disposition::Propagate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gateway::RemoteMe;

    #[test]
    fn test_mapping_is_total_over_remote_states() {
        assert_eq!(local_status_for(RemoteStatus::Working), Some(SessionStatus::Working));
        assert_eq!(local_status_for(RemoteStatus::ScanQrCode), Some(SessionStatus::Qrcode));
        assert_eq!(local_status_for(RemoteStatus::Failed), Some(SessionStatus::Failed));
        assert_eq!(local_status_for(RemoteStatus::Stopped), Some(SessionStatus::Stopped));
        assert_eq!(local_status_for(RemoteStatus::Starting), None);
        assert_eq!(local_status_for(RemoteStatus::Unknown), None);
        // Garbage strings land in Unknown, which maps to no change.
        assert_eq!(local_status_for(RemoteStatus::parse("BANANA")), None);
    }

    #[test]
    fn test_working_observation_captures_identity() {
        let store = Store::in_memory().unwrap();
        let row = store.insert_session("Shop", "s1", "u1").unwrap();

        let remote = RemoteSession {
            status: RemoteStatus::Working,
            me: Some(RemoteMe {
                id: "5511999@c.us".into(),
                name: None,
                pushname: Some("Loja".into()),
            }),
        };
        let written = apply_observation(&store, &row.id, &remote).unwrap();
        assert_eq!(written, Some(SessionStatus::Working));

        let row = store.session_by_row_id(&row.id).unwrap().unwrap();
        assert_eq!(row.phone_number.as_deref(), Some("5511999"));
        assert_eq!(row.profile_name.as_deref(), Some("Loja"));
    }

    #[test]
    fn test_starting_observation_leaves_row_alone() {
        let store = Store::in_memory().unwrap();
        let row = store.insert_session("Shop", "s1", "u1").unwrap();
        store.set_session_status(&row.id, SessionStatus::Qrcode).unwrap();

        let remote = RemoteSession { status: RemoteStatus::Starting, me: None };
        assert_eq!(apply_observation(&store, &row.id, &remote).unwrap(), None);
        let row = store.session_by_row_id(&row.id).unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Qrcode);
    }

    #[test]
    fn test_phone_from_jid() {
        assert_eq!(phone_from_jid("5511999@c.us"), "5511999");
        assert_eq!(phone_from_jid("1234-5678@g.us"), "1234-5678");
        assert_eq!(phone_from_jid("5511999"), "5511999");
    }

    #[test]
    fn test_disposition_table() {
        let not_ready = GatewayError::NotFound;
        let server = GatewayError::Api { status: 500, message: "boom".into() };
        let denied = GatewayError::Api { status: 401, message: "no".into() };

        assert_eq!(disposition(GatewayOp::CreateRemote, &not_ready), Disposition::AbsorbKeep);
        assert_eq!(
            disposition(GatewayOp::CreateRemote, &GatewayError::Unprocessable("bad name".into())),
            Disposition::FailThenPropagate
        );

        assert_eq!(disposition(GatewayOp::CreatePoll, &not_ready), Disposition::AbsorbKeep);
        assert_eq!(disposition(GatewayOp::CreatePoll, &server), Disposition::FailThenPropagate);

        assert_eq!(disposition(GatewayOp::Revive, &not_ready), Disposition::AbsorbKeep);
        assert_eq!(disposition(GatewayOp::Revive, &server), Disposition::Propagate);

        assert_eq!(disposition(GatewayOp::Refresh, &not_ready), Disposition::AbsorbKeep);
        assert_eq!(disposition(GatewayOp::Refresh, &server), Disposition::AbsorbKeep);
        assert_eq!(disposition(GatewayOp::Refresh, &denied), Disposition::Propagate);

        assert_eq!(disposition(GatewayOp::FetchQr, &server), Disposition::AbsorbKeep);
        assert_eq!(disposition(GatewayOp::Stop, &not_ready), Disposition::Propagate);
        assert_eq!(disposition(GatewayOp::Send, &server), Disposition::Propagate);
    }
}
