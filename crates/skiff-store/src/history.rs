use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::HistoryEntry;

impl Database {
    /// Append one operation-history record.  History is append-only; there
    /// is deliberately no update or delete helper.
    pub fn append_history(
        &self,
        owner_id: Option<i64>,
        operation: &str,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO history (owner_id, operation, actor, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, operation, actor, occurred_at.to_rfc3339()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// All history attributed to `owner_id`, oldest first.
    pub fn history_by_owner(&self, owner_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner_id, operation, actor, occurred_at
             FROM history
             WHERE owner_id = ?1
             ORDER BY occurred_at, id",
        )?;

        let rows = stmt.query_map(params![owner_id], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let ts_str: String = row.get(4)?;
    let occurred_at = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(HistoryEntry {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        operation: row.get(2)?,
        actor: row.get(3)?,
        occurred_at,
    })
}
