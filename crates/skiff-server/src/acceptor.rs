//! Transport acceptor: owns the listening socket, enforces the admission
//! ceiling, and spawns one session task per accepted connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::ServerError;
use crate::session::Session;
use crate::state::AppState;

pub struct Acceptor {
    listener: TcpListener,
    state: AppState,
    active: Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
}

impl Acceptor {
    /// Bind the configured address.  Failure to bind is fatal and reported
    /// to the caller; there is no retry.
    pub async fn bind(
        state: AppState,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(state.config.bind_addr).await?;
        Ok(Self {
            listener,
            state,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signalled.
    ///
    /// Shutdown only stops accepting; in-flight sessions are not forcibly
    /// terminated and end when their sockets close.
    pub async fn run(self) -> Result<(), ServerError> {
        let Acceptor {
            listener,
            state,
            active,
            mut shutdown,
        } = self;

        tracing::info!(addr = %listener.local_addr()?, "listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("acceptor shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    admit(&state, &active, stream, peer);
                }
            }
        }
    }
}

/// Check the live-session counter and either spawn a session or refuse the
/// connection with a single "server full" line.
fn admit(state: &AppState, active: &Arc<AtomicUsize>, stream: TcpStream, peer: SocketAddr) {
    let _ = stream.set_nodelay(true);

    let ceiling = state.config.max_connections;
    let Some(slot) = SessionSlot::try_acquire(active.clone(), ceiling) else {
        tracing::warn!(%peer, ceiling, "connection ceiling reached, refusing");
        tokio::spawn(async move {
            let mut stream = stream;
            let _ = stream.write_all(b"ERROR: Server full\n").await;
            let _ = stream.shutdown().await;
        });
        return;
    };

    tracing::info!(%peer, "client connected");
    let state = state.clone();
    tokio::spawn(async move {
        // Holds the admission slot for the whole session; dropped on every
        // exit path.
        let _slot = slot;
        let (read_half, write_half) = stream.into_split();
        let session = Session::new(
            BufReader::new(read_half),
            write_half,
            state,
            peer.to_string(),
        );
        match session.run().await {
            Ok(()) => tracing::info!(%peer, "client disconnected"),
            Err(e) => tracing::debug!(%peer, error = %e, "session ended with error"),
        }
    });
}

/// RAII slot in the live-session counter.
struct SessionSlot {
    active: Arc<AtomicUsize>,
}

impl SessionSlot {
    fn try_acquire(active: Arc<AtomicUsize>, ceiling: usize) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        if previous >= ceiling {
            active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self { active })
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
