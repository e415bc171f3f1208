//! Outbox repository implementation

use libsql::params;

use super::store::{parse_label, to_u32, LibSqlStore};
use crate::error::Result;
use crate::models::OutboxEntry;

const OUTBOX_COLUMNS: &str = "entity_id, owner_id, operation, payload, payload_hash, created_at, \
     updated_at, retry_count, next_retry_at, last_error";

/// Keyed storage for pending outbox rows (one row per entity)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    async fn get_entry(&self, entity_id: &str) -> Result<Option<OutboxEntry>>;

    /// Insert or replace the row keyed by `entry.entity_id`
    async fn put_entry(&self, entry: &OutboxEntry) -> Result<()>;

    /// Rows with retry budget left whose backoff has elapsed, oldest first
    async fn list_ready_entries(&self, now: i64, max_attempts: u32) -> Result<Vec<OutboxEntry>>;

    /// Every row, oldest first
    async fn list_entries(&self) -> Result<Vec<OutboxEntry>>;

    async fn update_retry(
        &self,
        entity_id: &str,
        retry_count: u32,
        next_retry_at: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<()>;

    /// Delete rows by entity id, returning how many were removed
    async fn delete_entries(&self, entity_ids: &[String]) -> Result<u64>;

    /// Delete a row only if it still holds the given revision
    async fn delete_settled(
        &self,
        entity_id: &str,
        updated_at: i64,
        payload_hash: &str,
    ) -> Result<bool>;
}

impl LibSqlStore {
    fn parse_entry(row: &libsql::Row) -> Result<OutboxEntry> {
        Ok(OutboxEntry {
            entity_id: row.get(0)?,
            owner_id: row.get(1)?,
            operation: parse_label(&row.get::<String>(2)?)?,
            payload: row.get(3)?,
            payload_hash: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            retry_count: to_u32(row.get(7)?, "retry_count")?,
            next_retry_at: row.get(8)?,
            last_error: row.get(9)?,
        })
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<OutboxEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

impl OutboxRepository for LibSqlStore {
    async fn get_entry(&self, entity_id: &str) -> Result<Option<OutboxEntry>> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE entity_id = ?");
        Ok(self.query_entries(&sql, [entity_id]).await?.pop())
    }

    async fn put_entry(&self, entry: &OutboxEntry) -> Result<()> {
        // DO UPDATE keeps the rowid, which breaks FIFO ties between equal created_at values
        self.conn
            .execute(
                &format!(
                    "INSERT INTO outbox ({OUTBOX_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(entity_id) DO UPDATE SET
                         owner_id = excluded.owner_id,
                         operation = excluded.operation,
                         payload = excluded.payload,
                         payload_hash = excluded.payload_hash,
                         created_at = excluded.created_at,
                         updated_at = excluded.updated_at,
                         retry_count = excluded.retry_count,
                         next_retry_at = excluded.next_retry_at,
                         last_error = excluded.last_error"
                ),
                params![
                    entry.entity_id.clone(),
                    entry.owner_id.clone(),
                    entry.operation.as_str(),
                    entry.payload.clone(),
                    entry.payload_hash.clone(),
                    entry.created_at,
                    entry.updated_at,
                    i64::from(entry.retry_count),
                    entry.next_retry_at,
                    entry.last_error.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_ready_entries(&self, now: i64, max_attempts: u32) -> Result<Vec<OutboxEntry>> {
        let sql = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox
             WHERE (next_retry_at IS NULL OR next_retry_at <= ?1)
               AND retry_count < ?2
             ORDER BY created_at ASC, rowid ASC"
        );
        self.query_entries(&sql, params![now, i64::from(max_attempts)])
            .await
    }

    async fn list_entries(&self) -> Result<Vec<OutboxEntry>> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY created_at ASC, rowid ASC");
        self.query_entries(&sql, ()).await
    }

    async fn update_retry(
        &self,
        entity_id: &str,
        retry_count: u32,
        next_retry_at: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE outbox SET retry_count = ?1, next_retry_at = ?2, last_error = ?3
                 WHERE entity_id = ?4",
                params![
                    i64::from(retry_count),
                    next_retry_at,
                    last_error.map(str::to_string),
                    entity_id,
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_entries(&self, entity_ids: &[String]) -> Result<u64> {
        let mut removed = 0;
        for entity_id in entity_ids {
            removed += self
                .conn
                .execute(
                    "DELETE FROM outbox WHERE entity_id = ?",
                    [entity_id.as_str()],
                )
                .await?;
        }
        Ok(removed)
    }

    async fn delete_settled(
        &self,
        entity_id: &str,
        updated_at: i64,
        payload_hash: &str,
    ) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE entity_id = ?1 AND updated_at = ?2 AND payload_hash = ?3",
                params![entity_id, updated_at, payload_hash],
            )
            .await?;
        Ok(removed > 0)
    }
}
