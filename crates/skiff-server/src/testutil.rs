//! In-memory store stubs and state builders shared by the unit tests.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use skiff_store::{Account, HistoryEntry, StoreError, StoredFile};

use crate::config::ServerConfig;
use crate::password::PasswordHasher;
use crate::state::AppState;
use crate::stores::{AccountStore, AuditSink, FileStore};

/// In-memory implementation of all three store traits.
///
/// Records enough call-count information to verify that handlers do not
/// touch collaborators before validation.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<Vec<Account>>,
    files: Mutex<Vec<StoredFile>>,
    history: Mutex<Vec<HistoryEntry>>,
    next_id: AtomicI64,
    find_file_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        })
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Operation tags recorded so far, in append order.
    pub fn operation_tags(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.operation.clone())
            .collect()
    }

    pub fn accounts_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn files_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// How many times `FileStore::find_by_filename` was invoked.
    pub fn find_file_calls(&self) -> usize {
        self.find_file_calls.load(Ordering::SeqCst)
    }
}

impl AccountStore for MemoryStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    fn insert(&self, username: &str, password_hash: &str) -> Result<Account, StoreError> {
        let account = Account {
            id: self.allocate_id(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
            last_login: None,
        };
        self.accounts.lock().unwrap().push(account.clone());
        Ok(account)
    }

    fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        for account in self.accounts.lock().unwrap().iter_mut() {
            if account.id == id {
                account.last_login = Some(at);
                return Ok(());
            }
        }
        Err(StoreError::NotFound)
    }
}

impl FileStore for MemoryStore {
    fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError> {
        self.find_file_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.filename == filename)
            .cloned())
    }

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<StoredFile>, StoreError> {
        let mut files: Vec<StoredFile> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    fn save(&self, owner_id: i64, filename: &str, size: i64) -> Result<StoredFile, StoreError> {
        let mut files = self.files.lock().unwrap();
        if let Some(existing) = files.iter_mut().find(|f| f.filename == filename) {
            existing.owner_id = owner_id;
            existing.size = size;
            existing.created_at = Utc::now();
            return Ok(existing.clone());
        }
        let file = StoredFile {
            id: self.allocate_id(),
            filename: filename.to_string(),
            size,
            owner_id,
            created_at: Utc::now(),
        };
        files.push(file.clone());
        Ok(file)
    }
}

impl AuditSink for MemoryStore {
    fn append(
        &self,
        owner_id: Option<i64>,
        operation: &str,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut history = self.history.lock().unwrap();
        let id = history.len() as i64 + 1;
        history.push(HistoryEntry {
            id,
            owner_id,
            operation: operation.to_string(),
            actor: actor.to_string(),
            occurred_at,
        });
        Ok(())
    }

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.owner_id == Some(owner_id))
            .cloned()
            .collect())
    }
}

/// Identity-function "hasher" so auth tests do not pay bcrypt cost.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, plain: &str) -> Result<String, bcrypt::BcryptError> {
        Ok(format!("plain:{plain}"))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        digest == format!("plain:{plain}")
    }
}

/// Config rooted inside a temp directory.
pub fn test_config(dir: &std::path::Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.files_dir = dir.join("files");
    config.report_path = dir.join("report.csv");
    config
}

/// AppState over a fresh [`MemoryStore`] rooted in a temp directory.
///
/// The returned `TempDir` must be kept alive for the duration of the test.
pub fn state_with_memory_store() -> (AppState, Arc<MemoryStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (state, store) = state_with_config(config);
    (state, store, dir)
}

/// AppState over a fresh [`MemoryStore`] with an explicit config.
pub fn state_with_config(config: ServerConfig) -> (AppState, Arc<MemoryStore>) {
    std::fs::create_dir_all(&config.files_dir).unwrap();
    let store = MemoryStore::new();
    let state = AppState {
        accounts: store.clone(),
        files: store.clone(),
        audit: store.clone(),
        hasher: Arc::new(PlainHasher),
        config: Arc::new(config),
    };
    (state, store)
}
