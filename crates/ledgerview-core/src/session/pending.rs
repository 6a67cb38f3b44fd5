//! Two-phase optimistic patches.
//!
//! A local mutation is applied tentatively, tagged with a correlation id,
//! and either confirmed by the matching authoritative change event or rolled
//! back when it expires. The prior value travels with the patch so rollback
//! and statistics deltas never guess.

use crate::types::{Amount, CorrelationId, LedgerRecord, RecordId, RecordStatus, Timestamp};

///
/// RecordPatch
/// The fields a consumer may mutate optimistically.
///

#[derive(Clone, Debug, Default)]
pub struct RecordPatch {
    pub amount: Option<Amount>,
    pub status: Option<RecordStatus>,
}

impl RecordPatch {
    /// The patched copy of `record`, leaving untouched fields alone.
    #[must_use]
    pub fn applied_to(&self, record: &LedgerRecord) -> LedgerRecord {
        let mut updated = record.clone();
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(status) = self.status {
            updated.status = status;
        }

        updated
    }
}

///
/// PendingPatch
///

#[derive(Clone, Debug)]
pub struct PendingPatch {
    pub correlation: CorrelationId,
    pub record_id: RecordId,
    pub prior: LedgerRecord,
    pub expires_at: Timestamp,
}

///
/// PendingPatches
/// The per-partition buffer of unconfirmed optimistic patches.
///

#[derive(Debug, Default)]
pub struct PendingPatches {
    patches: Vec<PendingPatch>,
}

impl PendingPatches {
    pub fn insert(&mut self, patch: PendingPatch) {
        self.patches.push(patch);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// An authoritative event arrived for this record: every tentative
    /// patch on it is settled.
    pub fn confirm(&mut self, record_id: RecordId) -> bool {
        let before = self.patches.len();
        self.patches.retain(|p| p.record_id != record_id);

        self.patches.len() != before
    }

    /// Remove one patch by correlation id (explicit rollback).
    pub fn remove(&mut self, correlation: CorrelationId) -> Option<PendingPatch> {
        let at = self
            .patches
            .iter()
            .position(|p| p.correlation == correlation)?;

        Some(self.patches.remove(at))
    }

    /// Drain every patch whose deadline has passed.
    pub fn take_expired(&mut self, now: Timestamp) -> Vec<PendingPatch> {
        let (expired, live) = std::mem::take(&mut self.patches)
            .into_iter()
            .partition(|p| p.expires_at <= now);
        self.patches = live;

        expired
    }

    /// A fresh authoritative fetch covered these records; their tentative
    /// patches are settled by it.
    pub fn settle_fetched(&mut self, records: &[LedgerRecord]) {
        self.patches
            .retain(|p| !records.iter().any(|r| r.id == p.record_id));
    }

    pub fn clear(&mut self) {
        self.patches.clear();
    }
}
