use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::Account;

impl Database {
    /// Insert a new account and return it with its assigned row id.
    ///
    /// The `username` column is UNIQUE; attempting to insert a duplicate
    /// surfaces as a constraint violation from SQLite.
    pub fn insert_account(&self, username: &str, password_hash: &str) -> Result<Account> {
        let created_at = Utc::now();
        self.conn().execute(
            "INSERT INTO accounts (username, password_hash, created_at, last_login)
             VALUES (?1, ?2, ?3, NULL)",
            params![username, password_hash, created_at.to_rfc3339()],
        )?;

        Ok(Account {
            id: self.conn().last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
            last_login: None,
        })
    }

    /// Look up an account by its unique username.
    pub fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let account = self
            .conn()
            .query_row(
                "SELECT id, username, password_hash, created_at, last_login
                 FROM accounts WHERE username = ?1",
                params![username],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Record a successful login timestamp.
    pub fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE accounts SET last_login = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let created_str: String = row.get(3)?;
    let last_login_str: Option<String> = row.get(4)?;

    let created_at = parse_ts(3, &created_str)?;
    let last_login = match last_login_str {
        Some(s) => Some(parse_ts(4, &s)?),
        None => None,
    };

    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at,
        last_login,
    })
}

fn parse_ts(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
