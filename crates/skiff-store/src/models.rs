//! Domain model structs persisted in the server database.
//!
//! Every struct derives `Serialize` and `Deserialize` so records can be
//! handed to reporting or tooling layers without conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A registered user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Row id (SQLite AUTOINCREMENT).
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// bcrypt digest of the password; never the plain text.
    pub password_hash: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// Last successful LOGIN, if any.
    pub last_login: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Stored file
// ---------------------------------------------------------------------------

/// Metadata for a file held in the server's transfer root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    /// Row id.
    pub id: i64,
    /// Bare file name (no path components), unique across the server.
    pub filename: String,
    /// Size in bytes as recorded at upload time.
    pub size: i64,
    /// Owning account id.
    pub owner_id: i64,
    /// When the file was (last) uploaded.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// History entry
// ---------------------------------------------------------------------------

/// One append-only operation-history record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Row id.
    pub id: i64,
    /// Account the operation is attributed to; `None` for pre-auth events.
    pub owner_id: Option<i64>,
    /// Machine-parseable outcome tag, e.g. `UPLOAD_FAIL:NoFilename`.
    pub operation: String,
    /// Username of the acting session, or `"unknown"` pre-authentication.
    pub actor: String,
    /// When the operation completed.
    pub occurred_at: DateTime<Utc>,
}
