//! UPLOAD / DOWNLOAD: the binary-framing transfer handlers.
//!
//! Both verbs share the same framing: one decimal size line, then exactly
//! that many raw bytes on the same stream, no delimiter.  The upload path
//! reads the payload through the session's buffered reader (bytes the line
//! reader already buffered belong to the payload), the download path
//! streams straight from disk to the socket in fixed-size chunks.
//!
//! Failure handling is the point of this module: a partial upload is never
//! left visible on disk, every distinct failure gets its own audit tag, and
//! a stalled or severed stream terminates the session because the framing
//! can no longer be trusted.

use std::io;
use std::time::Duration;

use skiff_proto::{fail_tag, ok_tag_with, validate_filename, FailReason, FilenameError, Verb};
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::audit;
use crate::error::ServerError;
use crate::session::send_line;
use crate::state::AppState;
use crate::stores::FileStore;

/// How one transfer attempt fell over.
enum TransferFailure {
    /// Peer closed the stream before the declared size arrived.
    Eof,
    /// No forward progress within the stall timeout.
    Stalled,
    /// Socket-level error; the transport is gone.
    Socket(io::Error),
    /// Local filesystem error; `remaining` payload bytes are still in
    /// flight on the socket and must be discarded to keep framing intact.
    Disk { error: io::Error, remaining: u64 },
}

/// `UPLOAD <filename>` -- receive a length-prefixed payload into the root.
pub async fn upload<R, W>(
    state: &AppState,
    owner_id: i64,
    actor: &str,
    reader: &mut R,
    writer: &mut W,
    args: &str,
) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let filename = args.trim();
    if let Err(e) = validate_filename(filename) {
        let (reason, msg) = match e {
            FilenameError::Empty => (FailReason::NoFilename, "ERROR: No filename given"),
            FilenameError::Traversal => (FailReason::InvalidFilename, "ERROR: Invalid filename"),
        };
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Upload, reason),
        );
        return send_line(writer, msg).await;
    }

    // Re-uploading your own file overwrites it; claiming someone else's
    // name is refused before the client commits any payload.
    if let Some(existing) = state.files.find_by_filename(filename)? {
        if existing.owner_id != owner_id {
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Upload, FailReason::AccessDenied),
            );
            return send_line(writer, "ERROR: Access denied").await;
        }
    }

    send_line(writer, "READY").await?;

    // Exactly one size line follows; nothing past it is consumed unless the
    // size is accepted.
    let mut size_line = String::new();
    let n = match timeout(state.config.stall_timeout, reader.read_line(&mut size_line)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Upload, FailReason::Stalled),
            );
            let _ = send_line(writer, "ERROR: Transfer stalled").await;
            return Err(stall_error().into());
        }
    };
    if n == 0 {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Upload, FailReason::Incomplete),
        );
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before size line",
        )
        .into());
    }

    let declared: u64 = match size_line.trim().parse() {
        Ok(v) if v > 0 => v,
        _ => {
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Upload, FailReason::InvalidFileSize),
            );
            return send_line(writer, "ERROR: Invalid file size").await;
        }
    };

    if declared > state.config.max_file_size {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Upload, FailReason::TooLarge),
        );
        return send_line(writer, "ERROR: File too large").await;
    }

    let path = state.config.files_dir.join(filename);
    let file = match fs::File::create(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to create upload target");
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Upload, FailReason::Storage),
            );
            // Discard the payload the client is about to send so the line
            // framing stays aligned for the next command.
            drain(reader, declared, state.config.stall_timeout).await?;
            return send_line(writer, "ERROR: Server storage error").await;
        }
    };

    tracing::info!(filename, size = declared, actor, "upload started");

    if let Err(failure) = receive_payload(
        reader,
        file,
        declared,
        state.config.chunk_size,
        state.config.stall_timeout,
        filename,
    )
    .await
    {
        // Whatever happened, the half-written file must not become visible
        // to LIST/DOWNLOAD.
        let _ = fs::remove_file(&path).await;

        return match failure {
            TransferFailure::Eof => {
                audit::record(
                    &*state.audit,
                    Some(owner_id),
                    actor,
                    &fail_tag(Verb::Upload, FailReason::Incomplete),
                );
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during upload",
                )
                .into())
            }
            TransferFailure::Stalled => {
                audit::record(
                    &*state.audit,
                    Some(owner_id),
                    actor,
                    &fail_tag(Verb::Upload, FailReason::Stalled),
                );
                let _ = send_line(writer, "ERROR: Transfer stalled").await;
                Err(stall_error().into())
            }
            TransferFailure::Socket(e) => Err(e.into()),
            TransferFailure::Disk { error, remaining } => {
                tracing::error!(filename, error = %error, "disk write failed during upload");
                audit::record(
                    &*state.audit,
                    Some(owner_id),
                    actor,
                    &fail_tag(Verb::Upload, FailReason::Storage),
                );
                drain(reader, remaining, state.config.stall_timeout).await?;
                send_line(writer, "ERROR: Server storage error").await
            }
        };
    }

    // Metadata is persisted only once all bytes are safely on disk.
    if let Err(e) = state.files.save(owner_id, filename, declared as i64) {
        tracing::error!(filename, error = %e, "failed to persist file metadata");
        let _ = fs::remove_file(&path).await;
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Upload, FailReason::Storage),
        );
        return send_line(writer, "ERROR: Server storage error").await;
    }

    audit::record(
        &*state.audit,
        Some(owner_id),
        actor,
        &ok_tag_with(Verb::Upload, filename),
    );
    tracing::info!(filename, size = declared, actor, "upload complete");
    send_line(writer, "OK").await
}

/// Copy exactly `declared` bytes from the stream into `file`.
async fn receive_payload<R>(
    reader: &mut R,
    mut file: fs::File,
    declared: u64,
    chunk_size: usize,
    stall: Duration,
    filename: &str,
) -> Result<(), TransferFailure>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    let mut progress = Progress::new(declared);
    let mut remaining = declared;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match timeout(stall, reader.read(&mut buf[..want])).await {
            Ok(Ok(0)) => return Err(TransferFailure::Eof),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(TransferFailure::Socket(e)),
            Err(_) => return Err(TransferFailure::Stalled),
        };

        if let Err(e) = file.write_all(&buf[..n]).await {
            return Err(TransferFailure::Disk {
                error: e,
                remaining: remaining - n as u64,
            });
        }

        remaining -= n as u64;
        if let Some(pct) = progress.advance(n as u64) {
            tracing::debug!(filename, pct, "upload progress");
        }
    }

    if let Err(e) = file.flush().await {
        return Err(TransferFailure::Disk {
            error: e,
            remaining: 0,
        });
    }
    Ok(())
}

/// `DOWNLOAD <filename>` -- stream a stored file back to the client.
pub async fn download<W>(
    state: &AppState,
    owner_id: i64,
    actor: &str,
    writer: &mut W,
    args: &str,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let filename = args.trim();
    if let Err(e) = validate_filename(filename) {
        let (reason, msg) = match e {
            FilenameError::Empty => (FailReason::NoFilename, "ERROR: No filename given"),
            FilenameError::Traversal => (FailReason::InvalidFilename, "ERROR: Invalid filename"),
        };
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Download, reason),
        );
        return send_line(writer, msg).await;
    }

    let Some(meta) = state.files.find_by_filename(filename)? else {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Download, FailReason::FileNotFound),
        );
        return send_line(writer, "ERROR: File not found").await;
    };

    if meta.owner_id != owner_id {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Download, FailReason::AccessDenied),
        );
        return send_line(writer, "ERROR: Access denied").await;
    }

    // Metadata and filesystem can disagree; a missing physical file is its
    // own failure, distinct from unknown metadata.
    let path = state.config.files_dir.join(filename);
    let mut file = match fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Download, FailReason::FileNotFoundOnServer),
            );
            return send_line(writer, "ERROR: File not found on server").await;
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to open stored file");
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Download, FailReason::Storage),
            );
            return send_line(writer, "ERROR: Server storage error").await;
        }
    };

    let size = match file.metadata().await {
        Ok(md) => md.len(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to stat stored file");
            audit::record(
                &*state.audit,
                Some(owner_id),
                actor,
                &fail_tag(Verb::Download, FailReason::Storage),
            );
            return send_line(writer, "ERROR: Server storage error").await;
        }
    };

    // Size line, then exactly that many raw bytes.
    send_line(writer, &size.to_string()).await?;

    tracing::info!(filename, size, actor, "download started");

    let mut buf = vec![0u8; state.config.chunk_size];
    let mut progress = Progress::new(size);
    let mut sent: u64 = 0;

    while sent < size {
        let n = match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::error!(filename, error = %e, "disk read failed during download");
                audit::record(
                    &*state.audit,
                    Some(owner_id),
                    actor,
                    &fail_tag(Verb::Download, FailReason::Storage),
                );
                // The client was promised `size` bytes; the stream cannot
                // be repaired, so the session ends here.
                return Err(e.into());
            }
        };

        // Never send past the advertised length, even if the file grew.
        let n = n.min((size - sent) as usize);

        match timeout(state.config.stall_timeout, writer.write_all(&buf[..n])).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                audit::record(
                    &*state.audit,
                    Some(owner_id),
                    actor,
                    &fail_tag(Verb::Download, FailReason::Stalled),
                );
                return Err(stall_error().into());
            }
        }

        sent += n as u64;
        if let Some(pct) = progress.advance(n as u64) {
            tracing::debug!(filename, pct, "download progress");
        }
    }
    writer.flush().await?;

    if sent != size {
        // The file shrank underneath us; the client is still waiting for
        // bytes that will never come.
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Download, FailReason::SizeMismatch),
        );
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stored file shorter than advertised",
        )
        .into());
    }

    audit::record(
        &*state.audit,
        Some(owner_id),
        actor,
        &ok_tag_with(Verb::Download, filename),
    );
    tracing::info!(filename, size, actor, "download complete");
    Ok(())
}

/// Read and discard `remaining` payload bytes after a server-side failure,
/// so the next line the session reads is a command again.
async fn drain<R>(reader: &mut R, mut remaining: u64, stall: Duration) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match timeout(stall, reader.read(&mut buf[..want])).await {
            Ok(Ok(0)) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while discarding payload",
                )
                .into())
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(stall_error().into()),
        };
        remaining -= n as u64;
    }
    Ok(())
}

fn stall_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "transfer stalled")
}

/// Decile progress tracker for transfer logging.
struct Progress {
    total: u64,
    moved: u64,
    next_pct: u64,
}

impl Progress {
    fn new(total: u64) -> Self {
        Self {
            total,
            moved: 0,
            next_pct: 10,
        }
    }

    /// Record `n` more bytes; returns the highest decile newly crossed.
    fn advance(&mut self, n: u64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        self.moved += n;
        let mut crossed = None;
        while self.next_pct <= 100 && self.moved * 100 >= self.total * self.next_pct {
            crossed = Some(self.next_pct);
            self.next_pct += 10;
        }
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::state_with_memory_store;
    use tokio::io::BufReader;

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    #[test]
    fn progress_reports_deciles_once() {
        let mut p = Progress::new(100);
        assert_eq!(p.advance(5), None);
        assert_eq!(p.advance(5), Some(10));
        assert_eq!(p.advance(45), Some(50));
        assert_eq!(p.advance(45), Some(90));
        assert_eq!(p.advance(5), Some(100));
    }

    #[test]
    fn progress_handles_single_chunk() {
        let mut p = Progress::new(7);
        assert_eq!(p.advance(7), Some(100));
        assert_eq!(p.advance(0), None);
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Drive `upload` with a scripted client side and return everything the
    /// server wrote back.
    async fn run_upload(
        state: &crate::state::AppState,
        args: &str,
        client_sends: &[u8],
    ) -> Vec<String> {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let (sr, mut sw) = tokio::io::split(server);
        let mut reader = BufReader::new(sr);

        let (mut cr, mut cw) = tokio::io::split(client);
        cw.write_all(client_sends).await.unwrap();
        // Half-close the client->server direction so EOF paths run to
        // completion.
        cw.shutdown().await.unwrap();

        let result = upload(state, 1, "alice", &mut reader, &mut sw, args).await;
        let _ = result;
        sw.shutdown().await.unwrap();

        let mut replies = String::new();
        cr.read_to_string(&mut replies).await.unwrap();
        replies.lines().map(|l| l.to_string()).collect()
    }

    #[tokio::test]
    async fn upload_happy_path() {
        let (state, store, _dir) = state_with_memory_store();

        let replies = run_upload(&state, "f.txt", b"5\nhello").await;
        assert_eq!(replies, vec!["READY", "OK"]);

        let stored = std::fs::read(state.config.files_dir.join("f.txt")).unwrap();
        assert_eq!(stored, b"hello");

        let meta = state.files.find_by_filename("f.txt").unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.owner_id, 1);

        assert!(store
            .operation_tags()
            .contains(&"UPLOAD_OK: f.txt".to_string()));
    }

    #[tokio::test]
    async fn upload_rejects_traversal_before_any_io() {
        let (state, store, _dir) = state_with_memory_store();

        let replies = run_upload(&state, "../evil", b"5\nhello").await;
        assert_eq!(replies, vec!["ERROR: Invalid filename"]);

        // No filesystem entry, no metadata lookup, no saved file.
        assert_eq!(store.find_file_calls(), 0);
        assert_eq!(store.files_count(), 0);
        assert!(std::fs::read_dir(&state.config.files_dir)
            .unwrap()
            .next()
            .is_none());
        assert_eq!(
            store.operation_tags(),
            vec!["UPLOAD_FAIL:InvalidFilename".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_rejects_empty_filename() {
        let (state, store, _dir) = state_with_memory_store();

        let replies = run_upload(&state, "   ", b"").await;
        assert_eq!(replies, vec!["ERROR: No filename given"]);
        assert_eq!(
            store.operation_tags(),
            vec!["UPLOAD_FAIL:NoFilename".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_rejects_non_numeric_size() {
        let (state, store, _dir) = state_with_memory_store();

        let replies = run_upload(&state, "f.txt", b"five\n").await;
        assert_eq!(replies, vec!["READY", "ERROR: Invalid file size"]);
        assert_eq!(
            store.operation_tags(),
            vec!["UPLOAD_FAIL:InvalidFileSize".to_string()]
        );
        assert!(!state.config.files_dir.join("f.txt").exists());
    }

    #[tokio::test]
    async fn upload_rejects_zero_size() {
        let (state, _store, _dir) = state_with_memory_store();
        let replies = run_upload(&state, "f.txt", b"0\n").await;
        assert_eq!(replies, vec!["READY", "ERROR: Invalid file size"]);
    }

    #[tokio::test]
    async fn upload_rejects_oversized_declaration() {
        let (state, store, _dir) = {
            let dir = tempfile::tempdir().unwrap();
            let mut config = crate::testutil::test_config(dir.path());
            config.max_file_size = 8;
            let (state, store) = crate::testutil::state_with_config(config);
            (state, store, dir)
        };

        let replies = run_upload(&state, "f.txt", b"9\nnine-byte").await;
        assert_eq!(replies, vec!["READY", "ERROR: File too large"]);
        assert_eq!(
            store.operation_tags(),
            vec!["UPLOAD_FAIL:TooLarge".to_string()]
        );
        assert!(!state.config.files_dir.join("f.txt").exists());
    }

    #[tokio::test]
    async fn upload_cannot_claim_a_foreign_filename() {
        let (state, store, _dir) = state_with_memory_store();
        state.files.save(99, "taken.txt", 3).unwrap();
        std::fs::write(state.config.files_dir.join("taken.txt"), b"old").unwrap();

        let replies = run_upload(&state, "taken.txt", b"5\nhello").await;
        assert_eq!(replies, vec!["ERROR: Access denied"]);

        // The existing file is untouched.
        let kept = std::fs::read(state.config.files_dir.join("taken.txt")).unwrap();
        assert_eq!(kept, b"old");
        assert!(store
            .operation_tags()
            .contains(&"UPLOAD_FAIL:AccessDenied".to_string()));
    }

    #[tokio::test]
    async fn upload_cleans_partial_on_early_eof() {
        let (state, store, _dir) = state_with_memory_store();

        // Declares 10 bytes but only 2 arrive before EOF.
        let replies = run_upload(&state, "f.txt", b"10\nhi").await;
        assert!(replies.contains(&"READY".to_string()));

        assert!(!state.config.files_dir.join("f.txt").exists());
        assert_eq!(store.files_count(), 0);
        assert_eq!(
            store.operation_tags(),
            vec!["UPLOAD_FAIL:Incomplete".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_does_not_consume_payload_after_bad_size() {
        let (state, _store, _dir) = state_with_memory_store();

        let (client, server) = tokio::io::duplex(4096);
        let (sr, mut sw) = tokio::io::split(server);
        let mut reader = BufReader::new(sr);

        let (_cr, mut cw) = tokio::io::split(client);
        cw.write_all(b"bogus\nNEXT LINE\n").await.unwrap();

        upload(&state, 1, "alice", &mut reader, &mut sw, "f.txt")
            .await
            .unwrap();

        // The line after the rejected size line is still readable intact.
        let mut next = String::new();
        reader.read_line(&mut next).await.unwrap();
        assert_eq!(next, "NEXT LINE\n");
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    async fn run_download(state: &crate::state::AppState, owner_id: i64, args: &str) -> Vec<u8> {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let (_sr, mut sw) = tokio::io::split(server);

        let result = download(state, owner_id, "alice", &mut sw, args).await;
        let _ = result;
        sw.shutdown().await.unwrap();

        let (mut cr, _cw) = tokio::io::split(client);
        let mut out = Vec::new();
        cr.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn download_round_trips_uploaded_bytes() {
        let (state, _store, _dir) = state_with_memory_store();

        let replies = run_upload(&state, "f.txt", b"5\nhello").await;
        assert_eq!(replies, vec!["READY", "OK"]);

        let raw = run_download(&state, 1, "f.txt").await;
        assert_eq!(raw, b"5\nhello");
    }

    #[tokio::test]
    async fn download_unknown_file() {
        let (state, store, _dir) = state_with_memory_store();

        let raw = run_download(&state, 1, "ghost.txt").await;
        assert_eq!(raw, b"ERROR: File not found\n");
        assert_eq!(
            store.operation_tags(),
            vec!["DOWNLOAD_FAIL:FileNotFound".to_string()]
        );
    }

    #[tokio::test]
    async fn download_denies_foreign_files_without_leaking_existence_of_content() {
        let (state, store, _dir) = state_with_memory_store();

        // Owned by account 99, requested by account 1.
        state.files.save(99, "secret.bin", 4).unwrap();
        std::fs::write(state.config.files_dir.join("secret.bin"), b"shhh").unwrap();

        let raw = run_download(&state, 1, "secret.bin").await;
        assert_eq!(raw, b"ERROR: Access denied\n");
        assert!(store
            .operation_tags()
            .contains(&"DOWNLOAD_FAIL:AccessDenied".to_string()));
    }

    #[tokio::test]
    async fn download_distinguishes_missing_physical_file() {
        let (state, store, _dir) = state_with_memory_store();

        // Metadata exists, bytes do not.
        state.files.save(1, "lost.bin", 4).unwrap();

        let raw = run_download(&state, 1, "lost.bin").await;
        assert_eq!(raw, b"ERROR: File not found on server\n");
        assert!(store
            .operation_tags()
            .contains(&"DOWNLOAD_FAIL:FileNotFoundOnServer".to_string()));
    }

    #[tokio::test]
    async fn download_rejects_traversal_before_lookup() {
        let (state, store, _dir) = state_with_memory_store();

        let raw = run_download(&state, 1, "../../etc/passwd").await;
        assert_eq!(raw, b"ERROR: Invalid filename\n");
        assert_eq!(store.find_file_calls(), 0);
    }
}
