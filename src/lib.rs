// ── Zapdesk ────────────────────────────────────────────────────────────────
// WhatsApp business-messaging CRM backend over a WAHA-compatible gateway.
//
// Layer layout, innermost first:
//   atoms  — pure data + error types, no I/O
//   config — environment-driven settings
//   engine — store, gateway client, lifecycle manager, keywords, flows
//   api    — axum HTTP surface

pub mod api;
pub mod atoms;
pub mod config;
pub mod engine;
