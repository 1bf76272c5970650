//! # skiff-server
//!
//! A small line-oriented file-transfer daemon.
//!
//! This binary provides:
//! - **Per-connection sessions** over plain TCP with a newline-terminated
//!   command protocol (LOGIN, REGISTER, LOGOUT, UPLOAD, DOWNLOAD, LIST,
//!   HISTORY, REPORT, ECHO)
//! - **Length-prefixed binary framing** for file payloads, with progress
//!   tracking, stall detection, and partial-transfer cleanup
//! - **Per-account ownership** of stored files, enforced on DOWNLOAD/LIST
//! - **Append-only operation history** with machine-parseable outcome tags
//! - **Bounded admission**: a hard ceiling on concurrent sessions

mod acceptor;
mod audit;
mod auth;
mod commands;
mod config;
mod error;
mod password;
mod report;
mod session;
mod state;
mod stores;
mod transfer;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::password::Bcrypt;
use crate::state::AppState;
use crate::stores::SqliteStore;
use skiff_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,skiff_server=debug")),
        )
        .init();

    info!("Starting skiff file server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    std::fs::create_dir_all(&config.files_dir).with_context(|| {
        format!(
            "Failed to create files directory '{}'",
            config.files_dir.display()
        )
    })?;

    // -----------------------------------------------------------------------
    // 3. Open the database and assemble the store handles
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory '{}'", parent.display())
                    })?;
                }
            }
            Database::open_at(path)
        }
        None => Database::new(),
    }
    .context("Failed to open database")?;

    let store = Arc::new(SqliteStore::new(db));
    let state = AppState {
        accounts: store.clone(),
        files: store.clone(),
        audit: store,
        hasher: Arc::new(Bcrypt::default()),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Bind the acceptor and run until Ctrl+C
    // -----------------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let acceptor = Acceptor::bind(state, shutdown_rx)
        .await
        .context("Failed to bind listener")?;
    info!(addr = %acceptor.local_addr()?, "skiff listening");

    let acceptor_task = tokio::spawn(acceptor.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");
    let _ = shutdown_tx.send(true);

    acceptor_task
        .await
        .context("Acceptor task panicked")?
        .context("Acceptor failed")?;

    info!("Server shutdown complete");
    Ok(())
}
