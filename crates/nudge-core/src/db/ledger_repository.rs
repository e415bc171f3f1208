//! Schedule ledger repository implementation

use libsql::params;

use super::store::{parse_label, LibSqlStore};
use crate::error::Result;
use crate::models::ScheduleLedgerEntry;

/// Keyed storage for schedule ledger rows (one row per entity)
#[allow(async_fn_in_trait)]
pub trait LedgerRepository {
    async fn get_ledger(&self, entity_id: &str) -> Result<Option<ScheduleLedgerEntry>>;

    /// Insert or replace the row keyed by `entry.entity_id`
    async fn put_ledger(&self, entry: &ScheduleLedgerEntry) -> Result<()>;
}

impl LedgerRepository for LibSqlStore {
    async fn get_ledger(&self, entity_id: &str) -> Result<Option<ScheduleLedgerEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_id, notification_ids, last_scheduled_hash, status,
                        last_scheduled_at, last_error
                 FROM schedule_ledger WHERE entity_id = ?",
                [entity_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let notification_ids: Vec<String> = serde_json::from_str(&row.get::<String>(1)?)?;
        Ok(Some(ScheduleLedgerEntry {
            entity_id: row.get(0)?,
            notification_ids,
            last_scheduled_hash: row.get(2)?,
            status: parse_label(&row.get::<String>(3)?)?,
            last_scheduled_at: row.get(4)?,
            last_error: row.get(5)?,
        }))
    }

    async fn put_ledger(&self, entry: &ScheduleLedgerEntry) -> Result<()> {
        let notification_ids = serde_json::to_string(&entry.notification_ids)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO schedule_ledger (
                    entity_id, notification_ids, last_scheduled_hash, status,
                    last_scheduled_at, last_error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.entity_id.clone(),
                    notification_ids,
                    entry.last_scheduled_hash.clone(),
                    entry.status.as_str(),
                    entry.last_scheduled_at,
                    entry.last_error.clone(),
                ],
            )
            .await?;
        Ok(())
    }
}
