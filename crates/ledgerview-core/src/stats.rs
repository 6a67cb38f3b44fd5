//! Aggregate statistics with bounded staleness.
//!
//! Statistics prefer the backend's aggregation capability and fall back to a
//! bounded manual scan when that capability is absent or failing. Cached
//! values live under a TTL and accept in-place deltas from the live-event
//! reconciler so a page navigation never forces a rescan.

use crate::{
    config::SessionConfig,
    error::QueryError,
    executor::{AggregateRequest, QueryExecutor, decode_page},
    obs::MetricsSink,
    scope::FilterSet,
    types::{Amount, LedgerRecord, RecordStatus, Timestamp},
};
use std::collections::BTreeMap;

///
/// Statistics
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Statistics {
    pub total_amount: Amount,
    pub total_count: u64,
    pub per_status: BTreeMap<RecordStatus, u64>,
    pub today_amount: Amount,
    pub completed_count: u64,
    pub computed_at: Timestamp,
    /// True when the value was computed over a capped subset of the dataset.
    pub is_partial: bool,
}

impl Statistics {
    #[must_use]
    pub fn empty(computed_at: Timestamp) -> Self {
        Self {
            total_amount: Amount::ZERO,
            total_count: 0,
            per_status: BTreeMap::new(),
            today_amount: Amount::ZERO,
            completed_count: 0,
            computed_at,
            is_partial: false,
        }
    }

    /// Mean amount per record; 0 when the scope is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_amount(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.total_amount.get() as f64 / self.total_count as f64
        }
    }

    /// Fold one record into the totals (scan path and "added" deltas).
    pub fn apply_added(&mut self, record: &LedgerRecord, today_start: Timestamp) {
        self.total_amount = self.total_amount.saturating_add(record.amount);
        self.total_count += 1;
        *self.per_status.entry(record.status).or_insert(0) += 1;
        if record.timestamp >= today_start {
            self.today_amount = self.today_amount.saturating_add(record.amount);
        }
        if record.status == RecordStatus::Completed {
            self.completed_count += 1;
        }
    }

    /// Shift the totals for an in-place modification with a known prior
    /// value. The record count is unchanged; amount and status buckets move.
    pub fn apply_modified(
        &mut self,
        prior: &LedgerRecord,
        current: &LedgerRecord,
        today_start: Timestamp,
    ) {
        self.total_amount = self
            .total_amount
            .saturating_add(current.amount)
            .saturating_sub(prior.amount);
        if current.timestamp >= today_start {
            self.today_amount = self
                .today_amount
                .saturating_add(current.amount)
                .saturating_sub(prior.amount);
        }

        if prior.status != current.status {
            if let Some(count) = self.per_status.get_mut(&prior.status) {
                *count = count.saturating_sub(1);
            }
            *self.per_status.entry(current.status).or_insert(0) += 1;

            if prior.status == RecordStatus::Completed {
                self.completed_count = self.completed_count.saturating_sub(1);
            }
            if current.status == RecordStatus::Completed {
                self.completed_count += 1;
            }
        }
    }
}

///
/// CacheEntry
///

#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub data: T,
    pub written_at: Timestamp,
    pub expires_at: Timestamp,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub const fn new(data: T, written_at: Timestamp, expires_at: Timestamp) -> Self {
        Self {
            data,
            written_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn fresh_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

///
/// StatsCache
///
/// TTL-cached statistics for one scope partition, with the in-flight and
/// queued-refresh bookkeeping demanded by the reentrancy rules.
///

#[derive(Debug, Default)]
pub struct StatsCache {
    entry: Option<CacheEntry<Statistics>>,
    in_flight: bool,
    refresh_queued: bool,
}

impl StatsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fresh(&self, now: Timestamp) -> Option<&Statistics> {
        self.entry
            .as_ref()
            .filter(|entry| entry.fresh_at(now))
            .map(|entry| &entry.data)
    }

    /// Cached value regardless of freshness; a failed refresh never
    /// discards previously valid data.
    #[must_use]
    pub fn any(&self) -> Option<&Statistics> {
        self.entry.as_ref().map(|entry| &entry.data)
    }

    pub fn store(&mut self, stats: Statistics, now: Timestamp, ttl_secs: u64) {
        self.entry = Some(CacheEntry::new(
            stats,
            now,
            now.saturating_add_secs(ttl_secs),
        ));
    }

    /// Expire the cached value without discarding it ("removed" events and
    /// modifications whose prior value is unknown force the next read to
    /// recompute).
    pub fn mark_stale(&mut self) {
        if let Some(entry) = self.entry.as_mut() {
            entry.expires_at = entry.written_at;
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
        self.in_flight = false;
        self.refresh_queued = false;
    }

    /// Mutable access to the cached statistics for in-place deltas.
    pub fn data_mut(&mut self) -> Option<&mut Statistics> {
        self.entry.as_mut().map(|entry| &mut entry.data)
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn begin_compute(&mut self) {
        self.in_flight = true;
    }

    /// Finish a computation; returns true when a forced refresh was queued
    /// behind it and the caller should recompute once more.
    pub fn finish_compute(&mut self) -> bool {
        self.in_flight = false;
        std::mem::take(&mut self.refresh_queued)
    }

    pub fn queue_refresh(&mut self) {
        self.refresh_queued = true;
    }
}

/// Compute statistics through the aggregation capability: one overall
/// sum+count call, a per-status count per bucket, and a today-window sum.
/// Any failure falls back to the bounded scan in [`compute_statistics`].
fn compute_via_aggregates(
    executor: &dyn QueryExecutor,
    filters: &FilterSet,
    now: Timestamp,
) -> Result<Statistics, QueryError> {
    let overall = executor.get_aggregate(filters, AggregateRequest::SUM_AND_COUNT)?;
    let today = executor.get_aggregate(&filters.with_day_of(now), AggregateRequest::SUM)?;

    let mut per_status = BTreeMap::new();
    for status in RecordStatus::ALL {
        // A status the scope already excludes counts zero without a query.
        let Some(scoped) = filters.with_status(status) else {
            per_status.insert(status, 0);
            continue;
        };
        let values = executor.get_aggregate(&scoped, AggregateRequest::COUNT)?;
        per_status.insert(status, values.count.unwrap_or(0));
    }

    Ok(Statistics {
        total_amount: overall.sum.unwrap_or(Amount::ZERO),
        total_count: overall.count.unwrap_or(0),
        completed_count: per_status
            .get(&RecordStatus::Completed)
            .copied()
            .unwrap_or(0),
        per_status,
        today_amount: today.sum.unwrap_or(Amount::ZERO),
        computed_at: now,
        is_partial: false,
    })
}

/// Bounded manual scan: walk pages through the range-query API, folding
/// every record into the totals, stopping at `max_scan_records` and marking
/// the result partial when the cap is hit with data remaining.
fn compute_via_scan(
    executor: &dyn QueryExecutor,
    filters: &FilterSet,
    config: &SessionConfig,
    metrics: &dyn MetricsSink,
    now: Timestamp,
) -> Result<Statistics, QueryError> {
    let mut stats = Statistics::empty(now);
    let today_start = now.day_start();
    let mut cursor = None;
    let mut scanned: u32 = 0;

    loop {
        let raw = executor.get_page(cursor.as_ref(), config.page_size, filters)?;
        let page = decode_page(raw, metrics);

        for record in &page.records {
            stats.apply_added(record, today_start);
        }
        scanned = scanned.saturating_add(page.records.len() as u32);

        let exhausted = (page.records.len() as u32) < config.page_size;
        cursor = page.last_cursor;

        if exhausted || cursor.is_none() {
            break;
        }
        if scanned >= config.max_scan_records {
            stats.is_partial = true;
            break;
        }
    }

    Ok(stats)
}

/// Compute statistics for a scope: aggregation path first, bounded scan on
/// any aggregation failure. Only scan-path errors propagate.
pub fn compute_statistics(
    executor: &dyn QueryExecutor,
    filters: &FilterSet,
    config: &SessionConfig,
    metrics: &dyn MetricsSink,
    now: Timestamp,
) -> Result<Statistics, QueryError> {
    match compute_via_aggregates(executor, filters, now) {
        Ok(stats) => Ok(stats),
        Err(QueryError::PermissionDenied { message }) => {
            Err(QueryError::PermissionDenied { message })
        }
        Err(_) => compute_via_scan(executor, filters, config, metrics, now),
    }
}
