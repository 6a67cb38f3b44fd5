//! Live change reconciliation.
//!
//! [`ChangeReconciler`] owns the subscription state machine
//! (`Initializing → Active ⇄ Reconnecting → Closed`), the baseline-snapshot
//! rule, the injectable coalescing policy, and reconnection backoff. The
//! actual cache patching lives in the session, which drains typed events
//! from the reconciler and applies them to its scope partition.

use crate::{
    config::{MAX_BACKOFF_SECS, SessionConfig},
    error::SyncError,
    obs::{MetricsEvent, MetricsSink},
    types::{LedgerRecord, RecordId, Timestamp},
};
use serde::Deserialize;
use std::str::FromStr as _;

///
/// RawEvent
/// One transport-level notification, rows still dynamic.
///

#[derive(Clone, Debug)]
pub enum RawEvent {
    /// Initial full-snapshot batch delivered right after subscribing.
    Snapshot(Vec<serde_json::Value>),
    Added(serde_json::Value),
    Modified(serde_json::Value),
    /// Carries either the removed row or a bare `{"id": …}` reference.
    Removed(serde_json::Value),
}

///
/// ChangeEvent
/// Typed counterpart of [`RawEvent`] past the adapter boundary.
///

#[derive(Clone, Debug)]
pub enum ChangeEvent {
    Snapshot(Vec<LedgerRecord>),
    Added(LedgerRecord),
    Modified(LedgerRecord),
    Removed(RecordId),
}

impl ChangeEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Removed(_) => "removed",
        }
    }
}

/// Decode one raw event; malformed payloads count as decode rejections and
/// yield `None` (malformed snapshot rows are skipped individually).
pub fn decode_event(raw: RawEvent, metrics: &dyn MetricsSink) -> Option<ChangeEvent> {
    match raw {
        RawEvent::Snapshot(rows) => {
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                match LedgerRecord::decode(row) {
                    Ok(record) => records.push(record),
                    Err(_) => metrics.record(MetricsEvent::DecodeRejected),
                }
            }

            Some(ChangeEvent::Snapshot(records))
        }
        RawEvent::Added(row) => match LedgerRecord::decode(row) {
            Ok(record) => Some(ChangeEvent::Added(record)),
            Err(_) => {
                metrics.record(MetricsEvent::DecodeRejected);
                None
            }
        },
        RawEvent::Modified(row) => match LedgerRecord::decode(row) {
            Ok(record) => Some(ChangeEvent::Modified(record)),
            Err(_) => {
                metrics.record(MetricsEvent::DecodeRejected);
                None
            }
        },
        RawEvent::Removed(row) => match decode_removed_id(&row) {
            Some(id) => Some(ChangeEvent::Removed(id)),
            None => {
                metrics.record(MetricsEvent::DecodeRejected);
                None
            }
        },
    }
}

// Removal payloads are either the full prior row or a bare id reference.
fn decode_removed_id(row: &serde_json::Value) -> Option<RecordId> {
    #[derive(Deserialize)]
    struct IdOnly {
        id: String,
    }

    IdOnly::deserialize(row)
        .ok()
        .and_then(|raw| RecordId::from_str(&raw.id).ok())
}

///
/// CoalescePolicy
///
/// How reconciliation work is scheduled: applied on arrival, or buffered
/// and applied together once the batch fills (or is explicitly flushed).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoalescePolicy {
    Immediate,
    /// Buffer up to this many events before applying them in arrival order.
    Batch(usize),
}

///
/// ReconcilerState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconcilerState {
    /// Subscribed, baseline snapshot not yet seen.
    Initializing,

    /// Baseline established; incremental events are being reconciled.
    Active,

    /// Transport failed; waiting out the backoff before resubscribing.
    Reconnecting {
        attempt: u32,
        next_attempt_at: Timestamp,
    },

    /// Torn down, or the retry budget is exhausted.
    Closed,
}

///
/// ReconnectPlan
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconnectPlan {
    RetryAt { attempt: u32, at: Timestamp },
    GiveUp { attempts: u32 },
}

///
/// ChangeReconciler
///

#[derive(Debug)]
pub struct ChangeReconciler {
    state: ReconcilerState,
    policy: CoalescePolicy,
    buffer: Vec<ChangeEvent>,
}

impl ChangeReconciler {
    #[must_use]
    pub const fn new(policy: CoalescePolicy) -> Self {
        Self {
            state: ReconcilerState::Initializing,
            policy,
            buffer: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ReconcilerState {
        self.state
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, ReconcilerState::Closed)
    }

    /// Accept one typed event, returning the events now due for application
    /// (empty while the coalescing buffer is still filling).
    ///
    /// The first snapshot after (re)subscribing is the baseline: it
    /// duplicates data already obtained through the page fetch and is never
    /// applied incrementally.
    pub fn accept(&mut self, event: ChangeEvent) -> Vec<ChangeEvent> {
        match self.state {
            ReconcilerState::Closed => return Vec::new(),
            ReconcilerState::Initializing | ReconcilerState::Reconnecting { .. } => {
                if matches!(event, ChangeEvent::Snapshot(_)) {
                    self.state = ReconcilerState::Active;
                    return Vec::new();
                }
            }
            ReconcilerState::Active => {}
        }

        match self.policy {
            CoalescePolicy::Immediate => vec![event],
            CoalescePolicy::Batch(cap) => {
                self.buffer.push(event);
                if self.buffer.len() >= cap.max(1) {
                    std::mem::take(&mut self.buffer)
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Drain whatever the coalescing buffer holds, in arrival order.
    pub fn flush(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.buffer)
    }

    /// Register a transport-level failure and plan the next reconnection.
    pub fn on_transport_error(
        &mut self,
        now: Timestamp,
        config: &SessionConfig,
    ) -> ReconnectPlan {
        let attempt = match self.state {
            ReconcilerState::Reconnecting { attempt, .. } => attempt.saturating_add(1),
            _ => 1,
        };

        if attempt > config.max_resubscribe_attempts {
            self.state = ReconcilerState::Closed;
            return ReconnectPlan::GiveUp {
                attempts: attempt.saturating_sub(1),
            };
        }

        let at = now.saturating_add_secs(backoff_delay(attempt, config.backoff_base_secs));
        self.state = ReconcilerState::Reconnecting {
            attempt,
            next_attempt_at: at,
        };

        ReconnectPlan::RetryAt { attempt, at }
    }

    /// Attempt number due for resubscription, if the backoff has elapsed.
    #[must_use]
    pub const fn due_resubscribe(&self, now: Timestamp) -> Option<u32> {
        match self.state {
            ReconcilerState::Reconnecting {
                attempt,
                next_attempt_at,
            } if now.get() >= next_attempt_at.get() => Some(attempt),
            _ => None,
        }
    }

    /// A replacement transport subscription is up: stop scheduling retries
    /// and wait for its baseline snapshot. Resets the retry budget.
    pub fn resubscribed(&mut self) {
        if matches!(self.state, ReconcilerState::Reconnecting { .. }) {
            self.state = ReconcilerState::Initializing;
        }
    }

    pub fn close(&mut self) {
        self.state = ReconcilerState::Closed;
        self.buffer.clear();
    }
}

/// Exponential backoff: base doubles per attempt, capped.
#[must_use]
pub const fn backoff_delay(attempt: u32, base_secs: u64) -> u64 {
    let exp = attempt.saturating_sub(1);
    if exp >= 32 {
        return MAX_BACKOFF_SECS;
    }
    let delay = base_secs.saturating_mul(1 << exp);
    if delay > MAX_BACKOFF_SECS {
        MAX_BACKOFF_SECS
    } else {
        delay
    }
}

///
/// LiveObserver
///
/// UI-facing callbacks for one live subscription. All methods default to
/// no-ops so consumers implement only what they render.
///

pub trait LiveObserver {
    /// The cached head page changed (insert, patch, or removal).
    fn on_head_changed(&self) {}

    /// Cached statistics changed or were invalidated.
    fn on_stats_changed(&self) {}

    /// The subscription was lost for good (retry budget exhausted).
    fn on_error(&self, _error: &SyncError) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::NullSink;
    use serde_json::json;

    fn added(secs: u64) -> ChangeEvent {
        ChangeEvent::Added(LedgerRecord {
            id: crate::types::RecordId::from_parts(secs * 1_000, 1),
            timestamp: Timestamp::from_seconds(secs),
            kind: crate::types::RecordKind::TopUp,
            status: crate::types::RecordStatus::Pending,
            amount: crate::types::Amount::from_minor(10),
            note: None,
        })
    }

    #[test]
    fn first_snapshot_is_baseline_not_incremental() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);

        let due = rec.accept(ChangeEvent::Snapshot(Vec::new()));

        assert!(due.is_empty(), "baseline must not be applied incrementally");
        assert_eq!(rec.state(), ReconcilerState::Active);
    }

    #[test]
    fn immediate_policy_passes_incremental_events_through() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);
        rec.accept(ChangeEvent::Snapshot(Vec::new()));

        let due = rec.accept(added(100));

        assert_eq!(due.len(), 1);
    }

    #[test]
    fn batch_policy_buffers_until_the_cap_and_keeps_order() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Batch(3));
        rec.accept(ChangeEvent::Snapshot(Vec::new()));

        assert!(rec.accept(added(1)).is_empty());
        assert!(rec.accept(added(2)).is_empty());
        let due = rec.accept(added(3));

        let secs: Vec<u64> = due
            .iter()
            .map(|ev| match ev {
                ChangeEvent::Added(r) => r.timestamp.get(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(secs, vec![1, 2, 3], "arrival order preserved");
    }

    #[test]
    fn flush_drains_a_partial_batch() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Batch(10));
        rec.accept(ChangeEvent::Snapshot(Vec::new()));
        rec.accept(added(1));

        assert_eq!(rec.flush().len(), 1);
        assert!(rec.flush().is_empty());
    }

    #[test]
    fn snapshot_after_reconnect_rebaselines() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);
        rec.accept(ChangeEvent::Snapshot(Vec::new()));

        let config = SessionConfig::default();
        rec.on_transport_error(Timestamp::from_seconds(100), &config);
        assert!(matches!(rec.state(), ReconcilerState::Reconnecting { .. }));

        let due = rec.accept(ChangeEvent::Snapshot(Vec::new()));
        assert!(due.is_empty(), "resync snapshot is a baseline too");
        assert_eq!(rec.state(), ReconcilerState::Active);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1, 1), 1);
        assert_eq!(backoff_delay(2, 1), 2);
        assert_eq!(backoff_delay(5, 1), 16);
        assert_eq!(backoff_delay(30, 1), MAX_BACKOFF_SECS);
    }

    #[test]
    fn retry_budget_exhaustion_closes_the_reconciler() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);
        let config = SessionConfig {
            max_resubscribe_attempts: 2,
            ..SessionConfig::default()
        };
        let now = Timestamp::from_seconds(1_000);

        assert!(matches!(
            rec.on_transport_error(now, &config),
            ReconnectPlan::RetryAt { attempt: 1, .. }
        ));
        assert!(matches!(
            rec.on_transport_error(now, &config),
            ReconnectPlan::RetryAt { attempt: 2, .. }
        ));
        assert_eq!(
            rec.on_transport_error(now, &config),
            ReconnectPlan::GiveUp { attempts: 2 }
        );
        assert!(rec.is_closed());
    }

    #[test]
    fn due_resubscribe_waits_out_the_backoff() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);
        let config = SessionConfig::default();
        let now = Timestamp::from_seconds(1_000);

        let ReconnectPlan::RetryAt { at, .. } = rec.on_transport_error(now, &config) else {
            panic!("first failure must schedule a retry");
        };

        assert_eq!(rec.due_resubscribe(now), None, "not due before the delay");
        assert_eq!(rec.due_resubscribe(at), Some(1));
    }

    #[test]
    fn resubscribed_stops_retry_scheduling_until_the_next_baseline() {
        let mut rec = ChangeReconciler::new(CoalescePolicy::Immediate);
        let config = SessionConfig::default();
        let now = Timestamp::from_seconds(1_000);
        let ReconnectPlan::RetryAt { at, .. } = rec.on_transport_error(now, &config) else {
            panic!("first failure must schedule a retry");
        };

        rec.resubscribed();

        assert_eq!(rec.due_resubscribe(at), None);
        assert_eq!(rec.state(), ReconcilerState::Initializing);
        let due = rec.accept(ChangeEvent::Snapshot(Vec::new()));
        assert!(due.is_empty());
        assert_eq!(rec.state(), ReconcilerState::Active);
    }

    #[test]
    fn decode_event_skips_malformed_snapshot_rows() {
        let raw = RawEvent::Snapshot(vec![
            json!({
                "id": crate::types::RecordId::from_parts(1_000, 1).to_string(),
                "timestamp": 1,
                "kind": "audit",
                "status": "pending",
            }),
            json!({"broken": true}),
        ]);

        let Some(ChangeEvent::Snapshot(records)) = decode_event(raw, &NullSink) else {
            panic!("snapshot should decode");
        };
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn decode_event_reads_bare_removal_references() {
        let id = crate::types::RecordId::from_parts(5_000, 9);
        let raw = RawEvent::Removed(json!({ "id": id.to_string() }));

        let Some(ChangeEvent::Removed(decoded)) = decode_event(raw, &NullSink) else {
            panic!("removal reference should decode");
        };
        assert_eq!(decoded, id);
    }
}
