//! # skiff-store
//!
//! Persistence layer for the skiff file server, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: accounts, stored-file metadata, and operation history.  Schema
//! migrations run automatically on open, guarded by `PRAGMA user_version`.

pub mod accounts;
pub mod database;
pub mod files;
pub mod history;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
