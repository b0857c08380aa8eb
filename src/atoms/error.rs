// ── Zapdesk Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the backend, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Network…) plus the
//     caller-facing classes the API maps to HTTP codes (Conflict, NotFound,
//     Validation, Auth, NotReadyForSend, RemoteFailure).
//   • `#[from]` wires std/external conversions automatically; the rusqlite
//     conversion is hand-written so constraint violations surface as Conflict.
//   • No variant carries secret material (API keys, password hashes) in its
//     message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure (non-constraint).
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Request payload or parameters rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness clash: session id already live, email already registered.
    #[error("{0}")]
    Conflict(String),

    /// No matching non-deleted row for the addressed id.
    #[error("{0}")]
    NotFound(String),

    /// Authentication / authorization failure.
    #[error("{0}")]
    Auth(String),

    /// Send attempted while the session is not in a ready state.
    #[error("{0}")]
    NotReadyForSend(String),

    /// Durable remote-gateway failure that has no safe local fallback.
    #[error("Gateway failure: {0}")]
    RemoteFailure(String),

    /// Server configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Internal(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            Some(code) => Self::RemoteFailure(format!("{} ({})", message, code)),
            None => Self::RemoteFailure(message),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

// ── rusqlite bridge ────────────────────────────────────────────────────────
// UNIQUE / CHECK violations must be distinguishable from plain DB failures:
// a concurrent duplicate insert surfaces as Conflict, not a 500.

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                return Error::Conflict(e.to_string());
            }
        }
        Error::Database(e)
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All fallible operations in this crate return this type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_becomes_conflict() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT);
        let e: Error = rusqlite::Error::SqliteFailure(ffi, Some("UNIQUE constraint failed".into())).into();
        assert!(matches!(e, Error::Conflict(_)));
    }

    #[test]
    fn test_plain_db_error_stays_database() {
        let e: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(e, Error::Database(_)));
    }
}
