//! Thin command handlers: ECHO, LIST, HISTORY, REPORT.
//!
//! Each handler produces one response string (possibly multi-line) and
//! records exactly one history event.  The binary-framing verbs live in
//! [`crate::transfer`]; the auth transitions in [`crate::auth`].

use skiff_proto::{fail_tag, ok_tag, FailReason, Verb};

use crate::audit;
use crate::auth::Identity;
use crate::error::ServerError;
use crate::report;
use crate::state::AppState;
use crate::stores::{AccountStore, AuditSink, FileStore};

/// `ECHO <text>` -- no authentication required.
pub fn echo(state: &AppState, identity: &Identity, args: &str) -> String {
    audit::record(
        &*state.audit,
        identity.user_id(),
        identity.actor_name(),
        &ok_tag(Verb::Echo),
    );
    format!("ECHO: {args}")
}

/// `LIST` -- names of the files owned by the current identity.
pub fn list(state: &AppState, owner_id: i64, actor: &str) -> Result<String, ServerError> {
    let files = state.files.list_by_owner(owner_id)?;

    audit::record(&*state.audit, Some(owner_id), actor, &ok_tag(Verb::List));

    if files.is_empty() {
        return Ok("FILES: (no files)".to_string());
    }

    let mut reply = String::from("FILES:");
    for file in &files {
        reply.push(' ');
        reply.push_str(&file.filename);
    }
    Ok(reply)
}

/// `HISTORY <username>` -- operation history for the named user.
///
/// Deliberately not restricted to the caller's own history; see the open
/// question recorded in DESIGN.md.
pub fn history(
    state: &AppState,
    owner_id: i64,
    actor: &str,
    args: &str,
) -> Result<String, ServerError> {
    let username = args.trim();
    if username.is_empty() {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::History, FailReason::Usage),
        );
        return Ok("ERROR: No username given".to_string());
    }

    let Some(target) = state.accounts.find_by_username(username)? else {
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::History, FailReason::UserNotFound),
        );
        return Ok("ERROR: User not found".to_string());
    };

    let entries = state.audit.list_by_owner(target.id)?;

    audit::record(&*state.audit, Some(owner_id), actor, &ok_tag(Verb::History));

    if entries.is_empty() {
        return Ok("HISTORY: (no operations)".to_string());
    }

    let mut reply = String::from("HISTORY:");
    for entry in &entries {
        reply.push('\n');
        reply.push_str(&entry.occurred_at.to_rfc3339());
        reply.push_str(" | ");
        reply.push_str(&entry.operation);
    }
    Ok(reply)
}

/// `REPORT` -- export the caller's history as CSV.
pub async fn report(state: &AppState, owner_id: i64, actor: &str) -> Result<String, ServerError> {
    let entries = state.audit.list_by_owner(owner_id)?;
    let csv = report::render_csv(&entries);

    let path = &state.config.report_path;
    if let Err(e) = tokio::fs::write(path, csv).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to write report");
        audit::record(
            &*state.audit,
            Some(owner_id),
            actor,
            &fail_tag(Verb::Report, FailReason::Storage),
        );
        return Ok("ERROR: Could not write report".to_string());
    }

    audit::record(&*state.audit, Some(owner_id), actor, &ok_tag(Verb::Report));
    Ok(format!("REPORT OK: {}", path.display()))
}
