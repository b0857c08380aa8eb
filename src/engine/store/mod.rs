// Zapdesk Store — SQLite persistence via rusqlite.
// One database file, one connection behind a Mutex; every table is created
// idempotently at startup so there is no external migration step.
//
// Module layout:
//   schema     — idempotent migrations
//   users      — account CRUD
//   tokens     — opaque bearer tokens, hashed at rest
//   sessions   — WhatsApp session rows + gateway slot assignments
//   contacts   — CRM contact CRUD + phone lookup
//   keywords   — auto-reply rule CRUD
//   flows      — conversation flow CRUD + versioning
//   campaigns  — bulk-send campaign CRUD + status machine writes
//   templates  — flow template library
//   agents     — human agent CRUD
//   messages   — message log + conversation thread upsert

use crate::atoms::error::Result;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

mod agents;
mod campaigns;
mod contacts;
mod flows;
mod keywords;
mod messages;
mod schema;
mod sessions;
mod templates;
mod tokens;
mod users;

// ── Re-exports ───────────────────────────────────────────────────────────────

pub use agents::AgentPatch;
pub use campaigns::CampaignPatch;
pub use contacts::ContactPatch;
pub use flows::FlowPatch;
pub use keywords::KeywordPatch;
pub use messages::NewMessage;
pub use templates::TemplatePatch;
pub use tokens::AuthToken;
pub use users::UserPatch;

/// Thread-safe database wrapper.
pub struct Store {
    /// The SQLite connection, protected by a Mutex.
    /// `pub` for integration tests that need raw queries.
    pub conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: &Path) -> Result<Self> {
        info!("[store] Opening database at {:?}", path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();

        schema::run_migrations(&conn)?;

        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store with the full schema. Used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }
}
