//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `accounts`, `files`, and `history`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Accounts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- bcrypt digest
    created_at    TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    last_login    TEXT
);

-- ----------------------------------------------------------------
-- Stored-file metadata
-- ----------------------------------------------------------------
-- Filenames are globally unique because every file lives flat inside one
-- server-side root directory.
CREATE TABLE IF NOT EXISTS files (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    filename   TEXT NOT NULL UNIQUE,
    size       INTEGER NOT NULL,
    owner_id   INTEGER NOT NULL,               -- FK -> accounts(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_owner_id ON files(owner_id);

-- ----------------------------------------------------------------
-- Operation history
-- ----------------------------------------------------------------
-- owner_id is nullable: pre-authentication failures are recorded against
-- no account, with actor 'unknown'.
CREATE TABLE IF NOT EXISTS history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER,                       -- nullable FK -> accounts(id)
    operation   TEXT NOT NULL,                 -- machine-parseable outcome tag
    actor       TEXT NOT NULL,
    occurred_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_history_owner_ts
    ON history(owner_id, occurred_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
