//! Outbox entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pending remote operation kind.
///
/// Variant order is the submission order inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOperation {
    Create,
    Update,
    Delete,
}

impl OutboxOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OutboxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown outbox operation '{other}'")),
        }
    }
}

/// The single pending remote operation for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Entity the operation applies to (one row per entity)
    pub entity_id: String,
    pub owner_id: String,
    pub operation: OutboxOperation,
    /// Serialized entity state at enqueue time
    pub payload: String,
    pub payload_hash: String,
    /// First enqueue time (Unix ms), preserved across overwrites
    pub created_at: i64,
    /// Latest enqueue time (Unix ms)
    pub updated_at: i64,
    pub retry_count: u32,
    /// `None` means immediately eligible (unless retries are exhausted)
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Whether the entry may be submitted at `now`
    pub fn is_ready(&self, now: i64, max_attempts: u32) -> bool {
        self.retry_count < max_attempts && self.next_retry_at.is_none_or(|at| at <= now)
    }
}
