use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredFile;

impl Database {
    /// Insert or replace the metadata row for `filename`.
    ///
    /// Filenames are unique across the server (the transfer root is a flat
    /// directory), so re-uploading under the same name updates size, owner
    /// and timestamp in place.
    pub fn upsert_file(&self, owner_id: i64, filename: &str, size: i64) -> Result<StoredFile> {
        let created_at = Utc::now();
        self.conn().execute(
            "INSERT INTO files (filename, size, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(filename) DO UPDATE SET
                 size = excluded.size,
                 owner_id = excluded.owner_id,
                 created_at = excluded.created_at",
            params![filename, size, owner_id, created_at.to_rfc3339()],
        )?;

        // The upsert path does not report the surviving row id, so read it
        // back rather than trusting last_insert_rowid().
        self.find_file_by_name(filename)?
            .ok_or(crate::error::StoreError::NotFound)
    }

    /// Look up file metadata by its server-wide unique name.
    pub fn find_file_by_name(&self, filename: &str) -> Result<Option<StoredFile>> {
        let file = self
            .conn()
            .query_row(
                "SELECT id, filename, size, owner_id, created_at
                 FROM files WHERE filename = ?1",
                params![filename],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    /// All files owned by `owner_id`, sorted by name for stable listings.
    pub fn files_by_owner(&self, owner_id: i64) -> Result<Vec<StoredFile>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, filename, size, owner_id, created_at
             FROM files
             WHERE owner_id = ?1
             ORDER BY filename",
        )?;

        let rows = stmt.query_map(params![owner_id], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFile> {
    let ts_str: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredFile {
        id: row.get(0)?,
        filename: row.get(1)?,
        size: row.get(2)?,
        owner_id: row.get(3)?,
        created_at,
    })
}
