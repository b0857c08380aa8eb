// Engine — the domain logic beneath the HTTP surface.
//
// Module layout:
//   store     — SQLite persistence for every entity
//   gateway   — typed client for the remote messaging gateway
//   lifecycle — session state machine, reconciliation, sends
//   keywords  — keyword auto-reply matching
//   flows     — conversation flow graph validation

pub mod flows;
pub mod gateway;
pub mod keywords;
pub mod lifecycle;
pub mod store;
