//! Store seams consumed by the session engine.
//!
//! The protocol core talks to persistence exclusively through these three
//! narrow traits, so the session and handler tests can run against
//! in-memory stubs while production wires in [`SqliteStore`].  The store
//! handle is constructed once in `main` and passed down explicitly; there
//! is no ambient global database state.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use skiff_store::{Account, Database, HistoryEntry, StoreError, StoredFile};

/// Account lookup and creation.
pub trait AccountStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
    fn insert(&self, username: &str, password_hash: &str) -> Result<Account, StoreError>;
    fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Stored-file metadata.
pub trait FileStore: Send + Sync {
    fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError>;
    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<StoredFile>, StoreError>;
    fn save(&self, owner_id: i64, filename: &str, size: i64) -> Result<StoredFile, StoreError>;
}

/// Append-only operation history.
pub trait AuditSink: Send + Sync {
    fn append(
        &self,
        owner_id: Option<i64>,
        operation: &str,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// SQLite-backed implementation of all three store traits.
///
/// `rusqlite::Connection` is not `Sync`, so the database handle sits behind
/// a mutex; individual queries are short enough that sessions never hold it
/// across a suspension point.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(guard) => guard,
            // A poisoned lock means another session panicked mid-query;
            // the connection itself is still usable.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AccountStore for SqliteStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        self.db().find_account_by_username(username)
    }

    fn insert(&self, username: &str, password_hash: &str) -> Result<Account, StoreError> {
        self.db().insert_account(username, password_hash)
    }

    fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.db().update_last_login(id, at)
    }
}

impl FileStore for SqliteStore {
    fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError> {
        self.db().find_file_by_name(filename)
    }

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<StoredFile>, StoreError> {
        self.db().files_by_owner(owner_id)
    }

    fn save(&self, owner_id: i64, filename: &str, size: i64) -> Result<StoredFile, StoreError> {
        self.db().upsert_file(owner_id, filename, size)
    }
}

impl AuditSink for SqliteStore {
    fn append(
        &self,
        owner_id: Option<i64>,
        operation: &str,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.db()
            .append_history(owner_id, operation, actor, occurred_at)?;
        Ok(())
    }

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db().history_by_owner(owner_id)
    }
}
