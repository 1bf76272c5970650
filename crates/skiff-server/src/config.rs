//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the acceptor binds to.
    /// Env: `SKIFF_BIND`
    /// Default: `127.0.0.1:2121`
    pub bind_addr: SocketAddr,

    /// Directory holding uploaded files (flat, no subdirectories).
    /// Env: `SKIFF_FILES_DIR`
    /// Default: `./server_files`
    pub files_dir: PathBuf,

    /// Explicit SQLite database path.  When unset the platform data
    /// directory is used.
    /// Env: `SKIFF_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Where REPORT writes its CSV export.
    /// Env: `SKIFF_REPORT_PATH`
    /// Default: `report.csv`
    pub report_path: PathBuf,

    /// Maximum number of concurrent sessions before new connections are
    /// refused with a "server full" line.
    /// Env: `SKIFF_MAX_CONNECTIONS`
    /// Default: `50`
    pub max_connections: usize,

    /// How long a session may sit idle between commands.
    /// Env: `SKIFF_IDLE_TIMEOUT_SECS`
    /// Default: 300 seconds
    pub idle_timeout: Duration,

    /// How long a transfer may go without forward progress.
    /// Env: `SKIFF_STALL_TIMEOUT_SECS`
    /// Default: 300 seconds
    pub stall_timeout: Duration,

    /// Largest declared upload size accepted (100 MiB).
    /// Env: `SKIFF_MAX_FILE_SIZE`
    pub max_file_size: u64,

    /// Chunk size for binary transfer I/O (16 KiB).
    /// Env: `SKIFF_CHUNK_SIZE`
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 2121).into(),
            files_dir: PathBuf::from("./server_files"),
            db_path: None,
            report_path: PathBuf::from("report.csv"),
            max_connections: 50,
            idle_timeout: Duration::from_secs(300),
            stall_timeout: Duration::from_secs(300),
            max_file_size: 100 * 1024 * 1024, // 100 MiB
            chunk_size: 16 * 1024,            // 16 KiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.  Invalid values log a warning and keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SKIFF_BIND") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(_) => {
                    tracing::warn!(value = %addr, "Invalid SKIFF_BIND, using default");
                }
            }
        }

        if let Ok(dir) = std::env::var("SKIFF_FILES_DIR") {
            config.files_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("SKIFF_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("SKIFF_REPORT_PATH") {
            config.report_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("SKIFF_MAX_CONNECTIONS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_connections = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid SKIFF_MAX_CONNECTIONS, using default");
                }
            }
        }

        if let Some(secs) = parse_secs_var("SKIFF_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = secs;
        }

        if let Some(secs) = parse_secs_var("SKIFF_STALL_TIMEOUT_SECS") {
            config.stall_timeout = secs;
        }

        if let Ok(val) = std::env::var("SKIFF_MAX_FILE_SIZE") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.max_file_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid SKIFF_MAX_FILE_SIZE, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("SKIFF_CHUNK_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.chunk_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid SKIFF_CHUNK_SIZE, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read a positive-seconds env var, warning on garbage.
fn parse_secs_var(name: &str) -> Option<Duration> {
    let val = std::env::var(name).ok()?;
    match val.parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(var = name, value = %val, "Invalid duration, using default");
            None
        }
    }
}
