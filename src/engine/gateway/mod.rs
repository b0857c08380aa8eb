// Gateway client — typed wrapper over the remote messaging gateway's REST
// surface.
//
// Module layout:
//   types  — remote status vocabulary and wire payloads
//   client — Gateway trait + HttpGateway implementation + error classes

mod client;
mod types;

pub use client::{Gateway, GatewayError, GatewayResult, HttpGateway};
pub use types::{RemoteMe, RemoteSession, RemoteStatus, SendReceipt};
