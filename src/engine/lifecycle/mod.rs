// Session lifecycle engine — the state machine reconciling local session
// rows against the remote gateway.
//
// Module layout:
//   mapping — remote→local status mapping + gateway error disposition table
//   slots   — logical handle → physical gateway slot assignment
//   manager — create/poll/reconcile/stop/delete orchestration
//   chats   — chat and contact proxies + chat→conversation sync
//   sender  — send gate + outbound text/image/file sends

mod chats;
mod manager;
mod mapping;
mod sender;
mod slots;

pub use manager::Lifecycle;
pub use mapping::{local_status_for, phone_from_jid, Disposition, GatewayOp};
