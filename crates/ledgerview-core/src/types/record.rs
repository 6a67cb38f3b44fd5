use crate::types::{Amount, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error as ThisError;

///
/// RecordKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    TopUp,
    Withdraw,
    Adjustment,
    Audit,
}

///
/// RecordStatus
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl RecordStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Completed, Self::Failed, Self::Reversed];
}

///
/// RecordDecodeError
///

#[derive(Debug, ThisError)]
pub enum RecordDecodeError {
    #[error("malformed ledger record: {reason}")]
    Malformed { reason: String },
}

///
/// LedgerRecord
///
/// Typed ledger row. `id` and `timestamp` are immutable and form the
/// descending sort key; the business fields (`kind`, `status`, `amount`,
/// `note`) are mutable server-side and may be patched by live events.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub timestamp: Timestamp,
    pub kind: RecordKind,
    pub status: RecordStatus,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default)]
    pub note: Option<String>,
}

impl LedgerRecord {
    /// Decode one loosely-typed wire row into a typed record.
    ///
    /// This is the only place dynamic payloads become typed data; everything
    /// past the adapter boundary operates on [`LedgerRecord`] values.
    pub fn decode(row: serde_json::Value) -> Result<Self, RecordDecodeError> {
        serde_json::from_value(row).map_err(|e| RecordDecodeError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Descending sort-key comparison: newest timestamp first, ties broken
    /// by descending record id.
    #[must_use]
    pub fn cmp_desc(a: &Self, b: &Self) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    }

    /// Whether a modification to `from` → `to` changes any field that feeds
    /// the cached statistics.
    #[must_use]
    pub fn stats_affecting_change(from: &Self, to: &Self) -> bool {
        from.amount != to.amount || from.status != to.status
    }
}
