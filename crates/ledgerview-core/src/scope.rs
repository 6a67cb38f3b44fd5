//! Scope identity: the active filter/visibility combination and the derived
//! key that partitions every cache.

use crate::types::{LedgerRecord, RecordKind, RecordStatus, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

///
/// FilterSet
///
/// The active filter combination. Empty kind/status sets mean "no
/// restriction". Set-valued fields are ordered so the canonical encoding is
/// deterministic regardless of insertion order.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FilterSet {
    pub kinds: BTreeSet<RecordKind>,
    pub statuses: BTreeSet<RecordStatus>,
    pub from: Option<Timestamp>,
    pub until: Option<Timestamp>,
    pub team: Option<String>,
}

impl FilterSet {
    /// Whether a record is visible under the client-checkable fields of
    /// this filter combination. `team` is enforced server-side; see
    /// [`Self::is_client_checkable`].
    #[must_use]
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if let Some(from) = self.from
            && record.timestamp < from
        {
            return false;
        }
        if let Some(until) = self.until
            && record.timestamp > until
        {
            return false;
        }

        true
    }

    /// Whether every field of this filter can be checked against a record
    /// client-side. Records carry no team attribute, so a team-filtered
    /// scope cannot verify membership locally.
    #[must_use]
    pub const fn is_client_checkable(&self) -> bool {
        self.team.is_none()
    }

    /// Narrow to a single status, intersecting with any existing status
    /// restriction. `None` when the scope already excludes that status.
    #[must_use]
    pub fn with_status(&self, status: RecordStatus) -> Option<Self> {
        if !self.statuses.is_empty() && !self.statuses.contains(&status) {
            return None;
        }

        let mut scoped = self.clone();
        scoped.statuses = BTreeSet::from([status]);

        Some(scoped)
    }

    /// Narrow to the UTC day containing `now` (used by the scoped aggregate path).
    #[must_use]
    pub fn with_day_of(&self, now: Timestamp) -> Self {
        let mut scoped = self.clone();
        let start = now.day_start();
        scoped.from = Some(match scoped.from {
            Some(from) if from > start => from,
            _ => start,
        });

        scoped
    }
}

///
/// ScopeKey
///
/// Stable, deterministic digest of the active (filter set, page size) pair.
/// Cursors, pages, and statistics computed under one scope key are
/// meaningless under another.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScopeKey([u8; 32]);

impl ScopeKey {
    #[must_use]
    pub fn derive(filters: &FilterSet, page_size: u32) -> Self {
        let mut hasher = Sha256::new();
        // BTreeSet fields keep the JSON encoding canonical.
        let encoded = serde_json::to_string(filters).unwrap_or_default();
        hasher.update(encoded.as_bytes());
        hasher.update(page_size.to_be_bytes());

        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }

        out
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

///
/// ScopeVersion
///
/// Monotonic counter bumped on every scope-invalidating event. In-flight
/// fetches carry the version at issue time; a completion whose version no
/// longer matches is discarded instead of written to cache.
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ScopeVersion(u64);

impl ScopeVersion {
    #[must_use]
    pub const fn bumped(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}
