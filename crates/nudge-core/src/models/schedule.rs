//! Schedule ledger model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Last committed scheduling outcome for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Scheduled,
    Canceled,
    Error,
}

impl LedgerStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Canceled => "canceled",
            Self::Error => "error",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "canceled" => Ok(Self::Canceled),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown ledger status '{other}'")),
        }
    }
}

/// Durable record of the notifications issued for one entity.
///
/// `Scheduled` entries hold at least one handle; `Canceled` and `Error`
/// entries hold none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLedgerEntry {
    pub entity_id: String,
    pub notification_ids: Vec<String>,
    pub last_scheduled_hash: Option<String>,
    pub status: LedgerStatus,
    pub last_scheduled_at: Option<i64>,
    pub last_error: Option<String>,
}

impl ScheduleLedgerEntry {
    pub fn scheduled(
        entity_id: impl Into<String>,
        notification_ids: Vec<String>,
        hash: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            notification_ids,
            last_scheduled_hash: Some(hash.into()),
            status: LedgerStatus::Scheduled,
            last_scheduled_at: Some(now),
            last_error: None,
        }
    }

    pub fn canceled(entity_id: impl Into<String>, now: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            notification_ids: Vec::new(),
            last_scheduled_hash: None,
            status: LedgerStatus::Canceled,
            last_scheduled_at: Some(now),
            last_error: None,
        }
    }

    pub fn failed(
        entity_id: impl Into<String>,
        hash: impl Into<String>,
        error: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            notification_ids: Vec::new(),
            last_scheduled_hash: Some(hash.into()),
            status: LedgerStatus::Error,
            last_scheduled_at: Some(now),
            last_error: Some(error.into()),
        }
    }

    /// Whether the handle list agrees with the status
    pub fn is_consistent(&self) -> bool {
        match self.status {
            LedgerStatus::Scheduled => !self.notification_ids.is_empty(),
            LedgerStatus::Canceled | LedgerStatus::Error => self.notification_ids.is_empty(),
        }
    }
}
