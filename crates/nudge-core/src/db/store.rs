//! Shared libSQL handle behind every repository trait

use libsql::Connection;

use super::Database;
use crate::error::{Error, Result};

/// libSQL implementation of the note, outbox, ledger and sync-state
/// repositories. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct LibSqlStore {
    pub(super) conn: Connection,
}

impl LibSqlStore {
    /// Create a new store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.connection().clone())
    }

    pub(super) async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub(super) async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

/// Parse a stored enum label, surfacing corrupt rows as database errors
pub(super) fn parse_label<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(Error::Database)
}

pub(super) fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Database(format!("{column} out of range: {value}")))
}
