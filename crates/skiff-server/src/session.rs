//! Per-connection session: the command loop and dispatcher.
//!
//! One session owns the buffered reader and writer halves of one accepted
//! stream and processes commands strictly sequentially -- the protocol has
//! no pipelining, and responses are emitted in arrival order.  The session
//! is generic over the stream type so the protocol engine can be exercised
//! over in-memory duplex pipes in tests.

use skiff_proto::{fail_tag, parse_line, Command, FailReason, ParsedLine, Verb};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::audit;
use crate::auth::{self, AuthReply, Identity};
use crate::commands;
use crate::error::ServerError;
use crate::state::AppState;
use crate::transfer;

/// Write one newline-terminated response line and flush it.
pub(crate) async fn send_line<W>(writer: &mut W, line: &str) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// State and behavior bound to one connection's lifetime.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    state: AppState,
    identity: Identity,
    peer: String,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, state: AppState, peer: String) -> Self {
        Self {
            reader,
            writer,
            state,
            identity: Identity::Anonymous,
            peer,
        }
    }

    /// Run the command loop until EOF, idle timeout, or a transport error.
    pub async fn run(mut self) -> Result<(), ServerError> {
        send_line(&mut self.writer, "Welcome to skiff file server!").await?;

        loop {
            let mut line = String::new();
            let n = match timeout(
                self.state.config.idle_timeout,
                self.reader.read_line(&mut line),
            )
            .await
            {
                Err(_) => {
                    tracing::info!(peer = %self.peer, "idle timeout, closing connection");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::debug!(peer = %self.peer, error = %e, "read failed");
                    return Err(e.into());
                }
                Ok(Ok(n)) => n,
            };
            if n == 0 {
                tracing::debug!(peer = %self.peer, "client disconnected");
                return Ok(());
            }

            if let Err(e) = self.handle_line(&line).await {
                match e {
                    // Transport is gone; nothing left to notify.
                    ServerError::Io(e) => {
                        tracing::debug!(peer = %self.peer, error = %e, "session terminated");
                        return Err(e.into());
                    }
                    // Server-side fault: answer with one error line and
                    // keep the connection alive.
                    other => {
                        tracing::error!(peer = %self.peer, error = %other, "command failed");
                        send_line(&mut self.writer, "ERROR: Internal server error").await?;
                    }
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), ServerError> {
        match parse_line(line) {
            ParsedLine::Blank => Ok(()),
            ParsedLine::Unknown(token) => {
                send_line(
                    &mut self.writer,
                    &format!("ERROR: Unknown command: {token}"),
                )
                .await
            }
            ParsedLine::Command(cmd) => self.dispatch(cmd).await,
        }
    }

    async fn dispatch(&mut self, cmd: Command) -> Result<(), ServerError> {
        match cmd.verb {
            Verb::Login => {
                let reply = auth::login(&self.state, &self.identity, &cmd.args)?;
                self.apply(reply).await
            }
            Verb::Register => {
                let reply = auth::register(&self.state, &self.identity, &cmd.args)?;
                self.apply(reply).await
            }
            Verb::Echo => {
                let reply = commands::echo(&self.state, &self.identity, &cmd.args);
                send_line(&mut self.writer, &reply).await
            }
            // Everything else is gated behind authentication.
            verb => {
                let Identity::User { id, username } = self.identity.clone() else {
                    audit::record(
                        &*self.state.audit,
                        None,
                        "unknown",
                        &fail_tag(verb, FailReason::NotLoggedIn),
                    );
                    return send_line(&mut self.writer, "ERROR: Not logged in").await;
                };
                self.dispatch_authed(verb, id, &username, &cmd.args).await
            }
        }
    }

    async fn dispatch_authed(
        &mut self,
        verb: Verb,
        owner_id: i64,
        actor: &str,
        args: &str,
    ) -> Result<(), ServerError> {
        match verb {
            Verb::Logout => {
                let reply = auth::logout(&self.state, &self.identity);
                self.apply(reply).await
            }
            Verb::List => {
                let reply = commands::list(&self.state, owner_id, actor)?;
                send_line(&mut self.writer, &reply).await
            }
            Verb::History => {
                let reply = commands::history(&self.state, owner_id, actor, args)?;
                send_line(&mut self.writer, &reply).await
            }
            Verb::Report => {
                let reply = commands::report(&self.state, owner_id, actor).await?;
                send_line(&mut self.writer, &reply).await
            }
            Verb::Upload => {
                transfer::upload(
                    &self.state,
                    owner_id,
                    actor,
                    &mut self.reader,
                    &mut self.writer,
                    args,
                )
                .await
            }
            Verb::Download => {
                transfer::download(&self.state, owner_id, actor, &mut self.writer, args).await
            }
            // Handled before the authentication gate.
            Verb::Login | Verb::Register | Verb::Echo => Ok(()),
        }
    }

    /// Adopt an identity transition, then answer.
    async fn apply(&mut self, reply: AuthReply) -> Result<(), ServerError> {
        if let Some(identity) = reply.transition {
            self.identity = identity;
        }
        send_line(&mut self.writer, &reply.line).await
    }
}
