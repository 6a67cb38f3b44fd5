//! Collaborator contracts and the typed-decode adapter boundary.
//!
//! The remote backend is reached exclusively through [`QueryExecutor`]
//! (cursor range queries plus an optional aggregation capability) and
//! [`ChangeSource`] (the server-push change stream). Rows arrive as dynamic
//! JSON and are decoded into [`LedgerRecord`] exactly once, here; everything
//! past this boundary operates on typed data.

use crate::{
    cursor::Cursor,
    error::QueryError,
    live::RawEvent,
    obs::{MetricsEvent, MetricsSink},
    scope::FilterSet,
    types::{Amount, LedgerRecord},
};
use std::rc::Rc;

///
/// RawPage
/// One page as delivered by the transport: dynamic rows in strict
/// descending sort-key order, plus the server's resumption cursor.
///

#[derive(Clone, Debug)]
pub struct RawPage {
    pub rows: Vec<serde_json::Value>,
    pub last_cursor: Option<Cursor>,
}

///
/// RecordPage
/// The typed counterpart of [`RawPage`] past the adapter boundary.
///

#[derive(Clone, Debug)]
pub struct RecordPage {
    pub records: Vec<LedgerRecord>,
    pub last_cursor: Option<Cursor>,
}

///
/// AggregateRequest
/// Which aggregate values the backend should compute.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AggregateRequest {
    pub sum: bool,
    pub count: bool,
    pub avg: bool,
}

impl AggregateRequest {
    pub const SUM: Self = Self {
        sum: true,
        count: false,
        avg: false,
    };
    pub const COUNT: Self = Self {
        sum: false,
        count: true,
        avg: false,
    };
    pub const SUM_AND_COUNT: Self = Self {
        sum: true,
        count: true,
        avg: false,
    };
}

///
/// AggregateValues
///

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AggregateValues {
    pub sum: Option<Amount>,
    pub count: Option<u64>,
    pub avg: Option<f64>,
}

///
/// QueryExecutor
///
/// Ordered range queries over the remote ledger. `get_page` with no cursor
/// starts from the newest record; fewer than `page_size` rows signals
/// end-of-data. The default `get_aggregate` declares the capability absent,
/// which routes statistics through the manual-scan fallback.
///

pub trait QueryExecutor {
    fn get_page(
        &self,
        cursor: Option<&Cursor>,
        page_size: u32,
        filters: &FilterSet,
    ) -> Result<RawPage, QueryError>;

    fn get_aggregate(
        &self,
        _filters: &FilterSet,
        _request: AggregateRequest,
    ) -> Result<AggregateValues, QueryError> {
        Err(QueryError::unsupported("aggregate queries not available"))
    }
}

///
/// EventSink
/// Receives raw transport events for one subscription.
///

pub trait EventSink {
    fn on_event(&self, event: RawEvent);
    fn on_error(&self, error: QueryError);
}

///
/// SubscriptionHandle
/// Cancels delivery when dropped or explicitly cancelled.
///

pub trait SubscriptionHandle {
    fn cancel(&mut self);
}

///
/// ChangeSource
///
/// Server-push change notifications. A new subscription first delivers one
/// full-snapshot batch, then incremental added/modified/removed events in
/// arrival order.
///

pub trait ChangeSource {
    fn subscribe(
        &self,
        filters: &FilterSet,
        sink: Rc<dyn EventSink>,
    ) -> Result<Box<dyn SubscriptionHandle>, QueryError>;
}

/// Decode one raw page, skipping malformed rows (each skip is counted
/// through the metrics sink) and restoring strict descending order in case
/// the transport violated its contract.
pub fn decode_page(raw: RawPage, metrics: &dyn MetricsSink) -> RecordPage {
    let mut records = Vec::with_capacity(raw.rows.len());
    for row in raw.rows {
        match LedgerRecord::decode(row) {
            Ok(record) => records.push(record),
            Err(_) => metrics.record(MetricsEvent::DecodeRejected),
        }
    }
    records.sort_unstable_by(LedgerRecord::cmp_desc);

    RecordPage {
        records,
        last_cursor: raw.last_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::RecordingSink;
    use crate::types::{RecordId, Timestamp};
    use serde_json::json;

    fn row(secs: u64) -> serde_json::Value {
        json!({
            "id": RecordId::from_parts(secs * 1_000, 1).to_string(),
            "timestamp": secs,
            "kind": "withdraw",
            "status": "pending",
            "amount": -50,
        })
    }

    #[test]
    fn decode_page_skips_malformed_rows_and_counts_them() {
        let sink = RecordingSink::default();
        let raw = RawPage {
            rows: vec![row(100), json!({"garbage": true}), row(200)],
            last_cursor: Some(Cursor::from("next")),
        };

        let page = decode_page(raw, &sink);

        assert_eq!(page.records.len(), 2);
        assert_eq!(
            sink.count(|ev| matches!(ev, MetricsEvent::DecodeRejected)),
            1
        );
    }

    #[test]
    fn decode_page_restores_descending_order() {
        let sink = RecordingSink::default();
        let raw = RawPage {
            rows: vec![row(100), row(300), row(200)],
            last_cursor: None,
        };

        let page = decode_page(raw, &sink);
        let timestamps: Vec<u64> = page.records.iter().map(|r| r.timestamp.get()).collect();

        assert_eq!(timestamps, vec![300, 200, 100]);
        assert_eq!(page.records[0].timestamp, Timestamp::from_seconds(300));
    }
}
