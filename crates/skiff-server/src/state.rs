//! Shared application state handed to every session.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::password::PasswordHasher;
use crate::stores::{AccountStore, AuditSink, FileStore};

/// Dependencies of the protocol engine, assembled once in `main` (or in a
/// test harness) and cloned into each session task.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub files: Arc<dyn FileStore>,
    pub audit: Arc<dyn AuditSink>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub config: Arc<ServerConfig>,
}
