//! Session-scoped synchronization engine.
//!
//! [`LedgerSession`] owns every cache partition, routes page and statistics
//! requests through the cursor chain and TTL cache, reconciles live change
//! events, and enforces the reentrancy rules: in-flight guards per page and
//! per statistics computation, and scope-version tagging so a result that
//! outlives its scope is discarded instead of written to cache.
//!
//! Everything runs on the host's single-threaded cooperative queue; the
//! collaborator calls ([`QueryExecutor`], [`ChangeSource`]) are the only
//! suspension points, and no `RefCell` borrow is ever held across one.

mod pending;

pub use pending::{PendingPatch, PendingPatches, RecordPatch};

use crate::{
    config::SessionConfig,
    cursor::{Cursor, CursorChain, LinkProbe, ResolvedCursor},
    error::{QueryError, SyncError},
    executor::{ChangeSource, EventSink, QueryExecutor, SubscriptionHandle, decode_page},
    live::{
        ChangeEvent, ChangeReconciler, LiveObserver, RawEvent, ReconnectPlan, decode_event,
    },
    obs::{MetricsEvent, MetricsSink, NullSink},
    page::{PageCache, PageLookup},
    scope::{FilterSet, ScopeKey, ScopeVersion},
    stats::{Statistics, StatsCache, compute_statistics},
    time::{SystemClock, TimeSource},
    types::{CorrelationId, LedgerRecord, PageIndex, RecordId, Timestamp},
};
use std::{cell::RefCell, rc::Rc};

///
/// RequestOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestOptions {
    pub force_refresh: bool,
}

impl RequestOptions {
    pub const FORCE: Self = Self {
        force_refresh: true,
    };
}

///
/// PageView
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageView {
    pub page: PageIndex,
    pub records: Vec<LedgerRecord>,
    pub has_more: bool,
}

///
/// PageOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageOutcome {
    Ready(PageView),

    /// A non-forced duplicate of an in-flight load; dropped per the
    /// reentrancy rules.
    LoadInProgress,

    /// The dataset is known to end before this page.
    NoSuchPage,

    /// The scope changed while the fetch was in flight; the result was
    /// discarded and must be ignored.
    Superseded,
}

///
/// StatsOutcome
///

#[derive(Clone, Debug, PartialEq)]
pub enum StatsOutcome {
    Ready(Statistics),
    ComputeInProgress,
    Superseded,
}

///
/// ScopePartition
/// The per-scope bundle of caches. Replaced wholesale on scope change.
///

#[derive(Debug)]
struct ScopePartition {
    key: ScopeKey,
    chain: CursorChain,
    pages: PageCache,
    stats: StatsCache,
    in_flight_pages: std::collections::BTreeSet<u32>,
    queued_page_refresh: std::collections::BTreeSet<u32>,
    pending: PendingPatches,
}

impl ScopePartition {
    fn new(key: ScopeKey) -> Self {
        Self {
            key,
            chain: CursorChain::new(),
            pages: PageCache::new(),
            stats: StatsCache::new(),
            in_flight_pages: std::collections::BTreeSet::new(),
            queued_page_refresh: std::collections::BTreeSet::new(),
            pending: PendingPatches::default(),
        }
    }
}

///
/// LiveState
///

struct LiveState {
    reconciler: ChangeReconciler,
    handle: Option<Box<dyn SubscriptionHandle>>,
    observer: Rc<dyn LiveObserver>,
}

impl std::fmt::Debug for LiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveState")
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

///
/// SessionState
///

#[derive(Debug)]
struct SessionState {
    filters: FilterSet,
    page_size: u32,
    version: ScopeVersion,
    partition: ScopePartition,
    live: Option<LiveState>,
    correlation_counter: u128,
}

impl SessionState {
    fn new(filters: FilterSet, page_size: u32) -> Self {
        let key = ScopeKey::derive(&filters, page_size);

        Self {
            filters,
            page_size,
            version: ScopeVersion::default(),
            partition: ScopePartition::new(key),
            live: None,
            correlation_counter: 0,
        }
    }

    /// Invalidate every cache: bump the version (discarding in-flight
    /// results on completion) and replace the partition.
    fn bump_scope(&mut self) {
        self.version = self.version.bumped();
        let key = ScopeKey::derive(&self.filters, self.page_size);
        self.partition = ScopePartition::new(key);
    }

    fn next_correlation(&mut self) -> CorrelationId {
        self.correlation_counter += 1;

        CorrelationId::from_counter(self.correlation_counter)
    }
}

///
/// LedgerSession
///
/// The owning cache object for one view over one ledger collection. All
/// concurrent readers of the same exact scope share this session; nothing
/// is shared across differing scopes.
///

pub struct LedgerSession<X: QueryExecutor, S: ChangeSource> {
    executor: Rc<X>,
    source: Rc<S>,
    config: SessionConfig,
    clock: Rc<dyn TimeSource>,
    metrics: Rc<dyn MetricsSink>,
    state: Rc<RefCell<SessionState>>,
}

impl<X: QueryExecutor, S: ChangeSource> Clone for LedgerSession<X, S> {
    fn clone(&self) -> Self {
        Self {
            executor: Rc::clone(&self.executor),
            source: Rc::clone(&self.source),
            config: self.config.clone(),
            clock: Rc::clone(&self.clock),
            metrics: Rc::clone(&self.metrics),
            state: Rc::clone(&self.state),
        }
    }
}

impl<X: QueryExecutor, S: ChangeSource> LedgerSession<X, S>
where
    X: 'static,
    S: 'static,
{
    #[must_use]
    pub fn new(executor: Rc<X>, source: Rc<S>, filters: FilterSet, config: SessionConfig) -> Self {
        let state = SessionState::new(filters, config.page_size);

        Self {
            executor,
            source,
            config,
            clock: Rc::new(SystemClock),
            metrics: Rc::new(NullSink),
            state: Rc::new(RefCell::new(state)),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Rc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Rc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    // ---------------------------------------------------------------------
    // Scope management
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn scope_key(&self) -> ScopeKey {
        self.state.borrow().partition.key
    }

    #[must_use]
    pub fn filters(&self) -> FilterSet {
        self.state.borrow().filters.clone()
    }

    /// Replace the active filter set. Invalidates every cache and, when a
    /// live subscription exists, resubscribes under the new filters.
    pub fn set_filters(&self, filters: FilterSet) -> Result<(), SyncError> {
        {
            let mut st = self.state.borrow_mut();
            if st.filters == filters {
                return Ok(());
            }
            st.filters = filters;
            st.bump_scope();
        }

        self.resubscribe_if_live()
    }

    /// Change the page size. Scope-invalidating: cursors and pages built
    /// for one page size are meaningless under another.
    pub fn set_page_size(&self, page_size: u32) -> Result<(), SyncError> {
        {
            let mut st = self.state.borrow_mut();
            if st.page_size == page_size || page_size == 0 {
                return Ok(());
            }
            st.page_size = page_size;
            st.bump_scope();
        }

        self.resubscribe_if_live()
    }

    /// Explicit wholesale refresh: drop every cache for the active scope.
    pub fn invalidate_caches(&self) {
        self.state.borrow_mut().bump_scope();
    }

    /// Tear the session down: cancel the live subscription and mark any
    /// outstanding fetch results as to-be-ignored.
    pub fn close(&self) {
        self.unsubscribe_live_updates();
        self.state.borrow_mut().bump_scope();
    }

    // ---------------------------------------------------------------------
    // Pages
    // ---------------------------------------------------------------------

    /// Fetch (or serve from cache) one page of the active scope.
    pub fn request_page(
        &self,
        page: PageIndex,
        opts: RequestOptions,
    ) -> Result<PageOutcome, SyncError> {
        let (issued, page_size, filters) = {
            let mut st = self.state.borrow_mut();

            match st.partition.pages.get(page) {
                PageLookup::Cached { records, has_more } if !opts.force_refresh => {
                    return Ok(PageOutcome::Ready(PageView {
                        page,
                        records: records.to_vec(),
                        has_more,
                    }));
                }
                PageLookup::EndOfData if !opts.force_refresh => {
                    return Ok(PageOutcome::NoSuchPage);
                }
                _ => {}
            }
            if st.partition.chain.is_past_end(page) {
                if !opts.force_refresh {
                    return Ok(PageOutcome::NoSuchPage);
                }
                // A forced request past a recorded end re-probes from the
                // deepest surviving link: the dataset may have grown back.
                st.partition.chain.reopen_end(page);
            }

            if st.partition.in_flight_pages.contains(&page.get()) {
                if opts.force_refresh {
                    st.partition.queued_page_refresh.insert(page.get());
                }
                return Ok(PageOutcome::LoadInProgress);
            }
            st.partition.in_flight_pages.insert(page.get());

            (st.version, st.page_size, st.filters.clone())
        };

        let result = self.fetch_page(page, issued, page_size, &filters);

        let queued = {
            let mut st = self.state.borrow_mut();
            if st.version == issued {
                st.partition.in_flight_pages.remove(&page.get());
                st.partition.queued_page_refresh.remove(&page.get())
            } else {
                false
            }
        };

        let outcome = result?;
        if queued {
            // A forced refresh queued behind this load; run it now.
            return self.request_page(page, RequestOptions::FORCE);
        }

        Ok(outcome)
    }

    /// Resolve the cursor (building missing chain links), fetch the page,
    /// and cache the result — unless the scope moved underneath us.
    ///
    /// The chain stays in the partition for the whole walk; every probe is
    /// one short borrow around the suspension point, so a reader of another
    /// page that interleaves mid-walk sees each link as soon as it is
    /// recorded and never re-probes covered ground.
    fn fetch_page(
        &self,
        page: PageIndex,
        issued: ScopeVersion,
        page_size: u32,
        filters: &FilterSet,
    ) -> Result<PageOutcome, SyncError> {
        enum WalkStep {
            Resolved(ResolvedCursor),
            Probe { at: PageIndex, cursor: Option<Cursor> },
        }

        let mut gap_queries = 0_u32;
        let resolved = loop {
            let step = {
                let st = self.state.borrow();
                if st.version != issued {
                    None
                } else if let Some(resolved) = st.partition.chain.peek(page) {
                    Some(WalkStep::Resolved(resolved))
                } else {
                    let (at, cursor) = st.partition.chain.walk_position(page);
                    Some(WalkStep::Probe { at, cursor })
                }
            };

            match step {
                None => {
                    self.metrics.record(MetricsEvent::StaleResultDiscarded);
                    return Ok(PageOutcome::Superseded);
                }
                Some(WalkStep::Resolved(resolved)) => break resolved,
                Some(WalkStep::Probe { at, cursor }) => {
                    let raw = self
                        .executor
                        .get_page(cursor.as_ref(), page_size, filters)
                        .map_err(|err| self.surface(err))?;
                    gap_queries = gap_queries.saturating_add(1);

                    let mut st = self.state.borrow_mut();
                    if st.version != issued {
                        drop(st);
                        self.metrics.record(MetricsEvent::StaleResultDiscarded);
                        return Ok(PageOutcome::Superseded);
                    }
                    st.partition.chain.record_link(
                        at,
                        &LinkProbe {
                            rows: raw.rows.len() as u32,
                            last_cursor: raw.last_cursor,
                        },
                        page_size,
                    );
                }
            }
        };

        if gap_queries > 0 {
            self.metrics.record(MetricsEvent::ChainWalked {
                queries: gap_queries,
            });
        }

        let cursor = match resolved {
            ResolvedCursor::Start => None,
            ResolvedCursor::After(cursor) => Some(cursor),
            ResolvedCursor::NoSuchPage => return Ok(PageOutcome::NoSuchPage),
        };

        let raw = match self.executor.get_page(cursor.as_ref(), page_size, filters) {
            Ok(raw) => raw,
            Err(err) => return Err(self.surface(err)),
        };
        if self.state.borrow().version != issued {
            self.metrics.record(MetricsEvent::StaleResultDiscarded);
            return Ok(PageOutcome::Superseded);
        }

        let raw_rows = raw.rows.len() as u32;
        let decoded = decode_page(raw, self.metrics.as_ref());
        let has_more = raw_rows == page_size && decoded.last_cursor.is_some();

        let shrank = {
            let mut st = self.state.borrow_mut();
            // A short page where deeper links were cached means the dataset
            // shrank underneath the chain; record_link drops those links.
            let shrank = !has_more
                && matches!(
                    st.partition.chain.peek(page.next()),
                    Some(ResolvedCursor::After(_))
                );
            st.partition.chain.record_link(
                page,
                &LinkProbe {
                    rows: raw_rows,
                    last_cursor: decoded.last_cursor.clone(),
                },
                page_size,
            );
            st.partition.pages.put(page, decoded.records.clone(), has_more);
            st.partition.pending.settle_fetched(&decoded.records);
            shrank
        };
        if shrank {
            self.metrics.record(MetricsEvent::ChainInvalidated {
                from_page: page.next(),
            });
        }
        self.metrics.record(MetricsEvent::PageFetched {
            page,
            rows: raw_rows,
        });

        Ok(PageOutcome::Ready(PageView {
            page,
            records: decoded.records,
            has_more,
        }))
    }

    // ---------------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------------

    /// Aggregate statistics for the active scope, served from the TTL cache
    /// unless expired, invalidated, or forced.
    pub fn get_statistics(&self, opts: RequestOptions) -> Result<StatsOutcome, SyncError> {
        let (issued, filters) = {
            let mut st = self.state.borrow_mut();
            let now = self.clock.now();

            if !opts.force_refresh
                && let Some(stats) = st.partition.stats.fresh(now)
            {
                let stats = stats.clone();
                drop(st);
                self.metrics.record(MetricsEvent::StatsServedFromCache);
                return Ok(StatsOutcome::Ready(stats));
            }

            if st.partition.stats.in_flight() {
                if opts.force_refresh {
                    st.partition.stats.queue_refresh();
                }
                return Ok(StatsOutcome::ComputeInProgress);
            }
            st.partition.stats.begin_compute();

            (st.version, st.filters.clone())
        };

        let result = compute_statistics(
            self.executor.as_ref(),
            &filters,
            &self.config,
            self.metrics.as_ref(),
            self.clock.now(),
        );

        let (stored, queued) = {
            let mut st = self.state.borrow_mut();
            if st.version != issued {
                drop(st);
                self.metrics.record(MetricsEvent::StaleResultDiscarded);
                return Ok(StatsOutcome::Superseded);
            }
            let queued = st.partition.stats.finish_compute();

            match result {
                Ok(stats) => {
                    let now = self.clock.now();
                    st.partition
                        .stats
                        .store(stats.clone(), now, self.config.stats_ttl_secs);
                    (Ok(stats), queued)
                }
                // A failed refresh keeps previously cached data.
                Err(err) => (Err(err), queued),
            }
        };

        match stored {
            Ok(stats) => {
                self.metrics.record(MetricsEvent::StatsRefreshed {
                    partial: stats.is_partial,
                });
                if queued {
                    return self.get_statistics(RequestOptions::FORCE);
                }

                Ok(StatsOutcome::Ready(stats))
            }
            Err(err) => Err(self.surface(err)),
        }
    }

    // ---------------------------------------------------------------------
    // Live updates
    // ---------------------------------------------------------------------

    /// Subscribe to server-push change notifications for the active scope.
    /// Any previous subscription on this session is torn down first.
    pub fn subscribe_live_updates(&self, observer: Rc<dyn LiveObserver>) -> Result<(), SyncError> {
        self.unsubscribe_live_updates();

        let filters = {
            let mut st = self.state.borrow_mut();
            st.live = Some(LiveState {
                reconciler: ChangeReconciler::new(self.config.coalesce),
                handle: None,
                observer,
            });

            st.filters.clone()
        };

        let sink: Rc<dyn EventSink> = Rc::new(LiveBridge {
            session: self.bridge_handle(),
        });
        match self.source.subscribe(&filters, sink) {
            Ok(handle) => {
                let mut st = self.state.borrow_mut();
                if let Some(live) = st.live.as_mut() {
                    live.handle = Some(handle);
                }

                Ok(())
            }
            Err(err) => {
                self.state.borrow_mut().live = None;
                Err(self.surface(err))
            }
        }
    }

    /// Cancel the live subscription immediately.
    pub fn unsubscribe_live_updates(&self) {
        let live = self.state.borrow_mut().live.take();
        if let Some(mut live) = live {
            live.reconciler.close();
            if let Some(mut handle) = live.handle.take() {
                handle.cancel();
            }
        }
    }

    /// Host-driven pump: expire overdue optimistic patches, flush a partial
    /// coalescing batch, and resubscribe once a reconnection backoff has
    /// elapsed. Call from the UI loop's idle tick.
    pub fn pump_live(&self) {
        self.expire_pending();

        let flushed = {
            let mut st = self.state.borrow_mut();
            st.live
                .as_mut()
                .map_or_else(Vec::new, |live| live.reconciler.flush())
        };
        if !flushed.is_empty() {
            self.bridge_handle().apply_events(flushed);
        }

        let due = {
            let st = self.state.borrow();
            st.live
                .as_ref()
                .and_then(|live| live.reconciler.due_resubscribe(self.clock.now()))
        };
        let Some(attempt) = due else { return };

        let filters = self.state.borrow().filters.clone();
        let sink: Rc<dyn EventSink> = Rc::new(LiveBridge {
            session: self.bridge_handle(),
        });
        match self.source.subscribe(&filters, sink) {
            Ok(handle) => {
                let mut st = self.state.borrow_mut();
                if let Some(live) = st.live.as_mut() {
                    live.handle = Some(handle);
                    live.reconciler.resubscribed();
                }
                drop(st);
                self.metrics.record(MetricsEvent::Resubscribed { attempt });
            }
            Err(err) => {
                self.bridge_handle().transport_failed(&err);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Optimistic patches
    // ---------------------------------------------------------------------

    /// Apply a tentative local mutation to a cached record. Returns the
    /// correlation id used to confirm or roll it back, or `None` when the
    /// record is not cached anywhere (nothing to patch).
    pub fn apply_optimistic(
        &self,
        record_id: RecordId,
        patch: &RecordPatch,
    ) -> Option<CorrelationId> {
        let mut st = self.state.borrow_mut();
        let current = st.partition.pages.find_record(record_id)?.clone();
        let updated = patch.applied_to(&current);
        if updated == current {
            return None;
        }

        st.partition.pages.patch_record(&updated);
        let today_start = self.clock.now().day_start();
        if LedgerRecord::stats_affecting_change(&current, &updated)
            && let Some(stats) = st.partition.stats.data_mut()
        {
            stats.apply_modified(&current, &updated, today_start);
        }

        let correlation = st.next_correlation();
        let expires_at = self
            .clock
            .now()
            .saturating_add_secs(self.config.pending_patch_ttl_secs);
        st.partition.pending.insert(PendingPatch {
            correlation,
            record_id,
            prior: current,
            expires_at,
        });

        Some(correlation)
    }

    /// Roll back one tentative patch, restoring the prior value.
    pub fn rollback_optimistic(&self, correlation: CorrelationId) -> bool {
        let mut st = self.state.borrow_mut();
        let Some(patch) = st.partition.pending.remove(correlation) else {
            return false;
        };

        Self::restore_prior(&mut st, &patch, self.clock.now());

        true
    }

    fn expire_pending(&self) {
        let now = self.clock.now();
        let mut st = self.state.borrow_mut();
        let expired = st.partition.pending.take_expired(now);
        for patch in expired {
            Self::restore_prior(&mut st, &patch, now);
        }
    }

    fn restore_prior(st: &mut SessionState, patch: &PendingPatch, now: Timestamp) {
        let current = st.partition.pages.find_record(patch.record_id).cloned();
        st.partition.pages.patch_record(&patch.prior);

        if let Some(current) = current {
            if LedgerRecord::stats_affecting_change(&current, &patch.prior)
                && let Some(stats) = st.partition.stats.data_mut()
            {
                stats.apply_modified(&current, &patch.prior, now.day_start());
            }
        } else {
            // The tentative record vanished from the caches; recompute
            // rather than guess.
            st.partition.stats.mark_stale();
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn bridge_handle(&self) -> BridgeHandle {
        BridgeHandle {
            config: self.config.clone(),
            clock: Rc::clone(&self.clock),
            metrics: Rc::clone(&self.metrics),
            state: Rc::clone(&self.state),
        }
    }

    fn resubscribe_if_live(&self) -> Result<(), SyncError> {
        let observer = {
            let st = self.state.borrow();
            st.live.as_ref().map(|live| Rc::clone(&live.observer))
        };

        match observer {
            Some(observer) => self.subscribe_live_updates(observer),
            None => Ok(()),
        }
    }

    /// Convert a collaborator failure into the UI-visible taxonomy. A
    /// permission failure clears every cache for the affected scope before
    /// surfacing.
    fn surface(&self, err: QueryError) -> SyncError {
        if err.is_permission_denied() {
            self.state.borrow_mut().bump_scope();
        }

        SyncError::from(err)
    }
}

///
/// BridgeHandle
///
/// The slice of session context the event bridge needs: everything except
/// the collaborators. Applying events touches only local caches.
///

struct BridgeHandle {
    config: SessionConfig,
    clock: Rc<dyn TimeSource>,
    metrics: Rc<dyn MetricsSink>,
    state: Rc<RefCell<SessionState>>,
}

impl BridgeHandle {
    fn apply_events(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.apply_one(event);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn apply_one(&self, event: ChangeEvent) {
        let kind = event.kind();
        let mut head_changed = false;
        let mut stats_changed = false;
        let mut applied = false;

        let observer = {
            let mut st = self.state.borrow_mut();
            let today_start = self.clock.now().day_start();

            match event {
                // Baselines are swallowed by the reconciler; a snapshot here
                // would be an out-of-contract duplicate. Ignore it.
                ChangeEvent::Snapshot(_) => {}

                ChangeEvent::Added(record) => {
                    if !st.filters.is_client_checkable() {
                        // Team membership is resolved server-side; rather
                        // than admit a record that may be outside the scope,
                        // let the next statistics read recompute.
                        st.partition.stats.mark_stale();
                        stats_changed = true;
                        applied = true;
                    } else if st.filters.matches(&record) {
                        let page_size = st.page_size;
                        head_changed = st.partition.pages.merge_head(record.clone(), page_size);
                        if let Some(stats) = st.partition.stats.data_mut() {
                            stats.apply_added(&record, today_start);
                            stats_changed = true;
                        }
                        applied = head_changed || stats_changed;
                    }
                }

                ChangeEvent::Modified(record) => {
                    st.partition.pending.confirm(record.id);

                    match st.partition.pages.patch_record(&record) {
                        Some(prior) => {
                            head_changed = true;
                            if LedgerRecord::stats_affecting_change(&prior, &record) {
                                if let Some(stats) = st.partition.stats.data_mut() {
                                    stats.apply_modified(&prior, &record, today_start);
                                } else {
                                    st.partition.stats.mark_stale();
                                }
                                stats_changed = true;
                            }
                            applied = true;
                        }
                        // Prior value unknown: a delta cannot be computed.
                        None => {
                            if st.filters.matches(&record) {
                                st.partition.stats.mark_stale();
                                stats_changed = true;
                                applied = true;
                            }
                        }
                    }
                }

                ChangeEvent::Removed(id) => {
                    st.partition.pending.confirm(id);
                    let touched = st.partition.pages.remove_record(id);
                    head_changed = touched > 0;
                    // A safe delta cannot be computed from a removal alone.
                    st.partition.stats.mark_stale();
                    stats_changed = true;
                    applied = true;
                }
            }

            st.live.as_ref().map(|live| Rc::clone(&live.observer))
        };

        if applied {
            self.metrics.record(MetricsEvent::EventApplied { kind });
        } else {
            self.metrics.record(MetricsEvent::EventIgnored { kind });
        }

        if let Some(observer) = observer {
            if head_changed {
                observer.on_head_changed();
            }
            if stats_changed {
                observer.on_stats_changed();
            }
        }
    }

    fn transport_failed(&self, error: &QueryError) {
        let plan = {
            let mut st = self.state.borrow_mut();
            let Some(live) = st.live.as_mut() else { return };
            live.reconciler.on_transport_error(self.clock.now(), &self.config)
        };

        if let ReconnectPlan::GiveUp { attempts } = plan {
            let observer = {
                let mut st = self.state.borrow_mut();
                let live = st.live.take();
                live.map(|mut live| {
                    if let Some(mut handle) = live.handle.take() {
                        handle.cancel();
                    }

                    live.observer
                })
            };

            if let Some(observer) = observer {
                observer.on_error(&SyncError::SubscriptionLost {
                    attempts,
                    message: error.to_string(),
                });
            }
        }
    }
}

///
/// LiveBridge
/// The [`EventSink`] handed to the change source.
///

struct LiveBridge {
    session: BridgeHandle,
}

impl EventSink for LiveBridge {
    fn on_event(&self, event: RawEvent) {
        let Some(event) = decode_event(event, self.session.metrics.as_ref()) else {
            return;
        };

        let due = {
            let mut st = self.session.state.borrow_mut();
            let Some(live) = st.live.as_mut() else { return };
            live.reconciler.accept(event)
        };

        self.session.apply_events(due);
    }

    fn on_error(&self, error: QueryError) {
        self.session.transport_failed(&error);
    }
}
