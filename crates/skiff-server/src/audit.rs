//! Audit hook: one history append per terminal command outcome.

use chrono::Utc;

use crate::stores::AuditSink;

/// Append one operation-history event.
///
/// History is observability, not correctness: a failed append must never
/// turn a completed command into an error, so failures are logged and
/// swallowed here.
pub fn record(sink: &dyn AuditSink, owner_id: Option<i64>, actor: &str, tag: &str) {
    if let Err(e) = sink.append(owner_id, tag, actor, Utc::now()) {
        tracing::warn!(error = %e, tag, actor, "failed to append history event");
    }
}
