//! Metrics sink boundary.
//!
//! Session logic MUST NOT count or log anything directly; all
//! instrumentation flows through [`MetricsEvent`] and [`MetricsSink`].
//! Hosts plug in their own sink; [`NullSink`] is the default.

use crate::types::PageIndex;
use std::cell::RefCell;

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    /// A data page was fetched from the network and cached.
    PageFetched { page: PageIndex, rows: u32 },

    /// Cursor-chain links were built with throwaway gap queries.
    ChainWalked { queries: u32 },

    /// Cached chain links were dropped because the underlying data shrank.
    ChainInvalidated { from_page: PageIndex },

    /// Statistics were recomputed (aggregate path or bounded scan).
    StatsRefreshed { partial: bool },

    /// Statistics were served from the TTL cache.
    StatsServedFromCache,

    /// A live change event was applied to the caches.
    EventApplied { kind: &'static str },

    /// A live change event referenced nothing currently cached.
    EventIgnored { kind: &'static str },

    /// A wire row failed typed decoding and was skipped.
    DecodeRejected,

    /// An in-flight result arrived after its scope was invalidated.
    StaleResultDiscarded,

    /// The change subscription was re-established after a transport error.
    Resubscribed { attempt: u32 },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

///
/// NullSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&self, _event: MetricsEvent) {}
}

///
/// RecordingSink
/// Captures every event in arrival order; used by tests and diagnostics.
///

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<MetricsEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn events(&self) -> Vec<MetricsEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn count(&self, matcher: impl Fn(&MetricsEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|ev| matcher(ev)).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: MetricsEvent) {
        self.events.borrow_mut().push(event);
    }
}
