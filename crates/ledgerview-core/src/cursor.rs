//! Cursor-chain cache.
//!
//! The remote API only supports sequential "next page" queries: the cursor
//! for page N exists only after page N−1 has been fetched. [`CursorChain`]
//! memoizes every discovered link so a jump to page K costs at most K−1
//! gap-filling queries once, and nothing on revisits.

use crate::types::PageIndex;
use std::collections::BTreeMap;

///
/// Cursor
/// Opaque server-issued resumption token. Valid only under the exact
/// (order, filter set) pair it was issued for.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cursor(String);

impl Cursor {
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

///
/// ResolvedCursor
/// Outcome of resolving the cursor needed to fetch a page.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResolvedCursor {
    /// Page 1 needs no cursor.
    Start,

    /// Fetch resumes after this link.
    After(Cursor),

    /// The dataset is known to end before this page.
    NoSuchPage,
}

///
/// LinkProbe
/// Result of one gap-filling query: how many rows came back and the cursor
/// the server issued for the next page, if any.
///

#[derive(Clone, Debug)]
pub struct LinkProbe {
    pub rows: u32,
    pub last_cursor: Option<Cursor>,
}

///
/// CursorChain
///
/// Sequential link cache. `links[p]` is the cursor that fetches page `p`
/// (so it exists only for `p >= 2`); `last_page` is the final page index
/// once a short page has revealed the end of the dataset.
///
/// The chain is shared by every reader of its scope: walks happen through
/// [`Self::peek`], [`Self::walk_position`], and [`Self::record_link`], one
/// short step at a time, so links land in the chain as soon as they are
/// discovered and interleaved readers never re-probe covered ground.
///

#[derive(Debug, Default)]
pub struct CursorChain {
    links: BTreeMap<u32, Cursor>,
    last_page: Option<u32>,
}

impl CursorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache-only lookup; never issues queries.
    #[must_use]
    pub fn peek(&self, page: PageIndex) -> Option<ResolvedCursor> {
        if self.is_past_end(page) {
            return Some(ResolvedCursor::NoSuchPage);
        }
        if page.is_first() {
            return Some(ResolvedCursor::Start);
        }

        self.links
            .get(&page.get())
            .cloned()
            .map(ResolvedCursor::After)
    }

    #[must_use]
    pub fn is_past_end(&self, page: PageIndex) -> bool {
        self.last_page.is_some_and(|last| page.get() > last)
    }

    #[must_use]
    pub const fn last_page(&self) -> Option<u32> {
        self.last_page
    }

    /// Number of cached links (pages whose cursor is known).
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Deepest cached link at or below `page`, with its cursor. Falls back
    /// to page 1 (no cursor) when nothing below the target is cached.
    #[must_use]
    pub fn walk_position(&self, page: PageIndex) -> (PageIndex, Option<Cursor>) {
        self.links
            .range(..=page.get())
            .next_back()
            .map_or((PageIndex::FIRST, None), |(&p, cursor)| {
                (PageIndex::new(p), Some(cursor.clone()))
            })
    }

    /// Record the link discovered by fetching `page` in full.
    pub fn record_link(&mut self, page: PageIndex, probe: &LinkProbe, page_size: u32) {
        if probe.rows < page_size || probe.last_cursor.is_none() {
            // Short page: the dataset ends here. If links beyond this point
            // were cached the data shrank underneath them.
            self.record_end(page);
            return;
        }

        if let Some(cursor) = &probe.last_cursor {
            // A full page at or past a recorded end means the dataset grew
            // back; the stale end marker is superseded by this fetch.
            if self.last_page.is_some_and(|last| last <= page.get()) {
                self.last_page = None;
            }
            self.links.insert(page.get().saturating_add(1), cursor.clone());
        }
    }

    /// Mark `page` as the final page and drop links past it.
    pub fn record_end(&mut self, page: PageIndex) {
        self.last_page = Some(match self.last_page {
            Some(last) if last < page.get() => last,
            _ => page.get(),
        });
        self.links.retain(|&p, _| p <= page.get());
    }

    /// Forget an end marker that places `page` past the end, so a forced
    /// refetch can re-probe whether the dataset grew.
    pub fn reopen_end(&mut self, page: PageIndex) {
        if self.is_past_end(page) {
            self.last_page = None;
        }
    }

    /// Drop every link at or beyond `page` (stale-chain recovery).
    pub fn invalidate_from(&mut self, page: PageIndex) {
        self.links.retain(|&p, _| p < page.get());
        if let Some(last) = self.last_page
            && last >= page.get()
        {
            self.last_page = None;
        }
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.last_page = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(rows: u32, cursor: Option<&str>) -> LinkProbe {
        LinkProbe {
            rows,
            last_cursor: cursor.map(Cursor::from),
        }
    }

    /// Drive a walk the way the session does: peek, probe the nearest gap
    /// below the target, record the discovered link, repeat.
    fn walk(
        chain: &mut CursorChain,
        page: PageIndex,
        page_size: u32,
        fetch: &mut dyn FnMut(Option<&Cursor>) -> LinkProbe,
    ) -> (ResolvedCursor, u32) {
        let mut queries = 0;
        loop {
            if let Some(resolved) = chain.peek(page) {
                return (resolved, queries);
            }
            let (at, cursor) = chain.walk_position(page);
            let probed = fetch(cursor.as_ref());
            queries += 1;
            chain.record_link(at, &probed, page_size);
        }
    }

    /// Fetcher over a fixed dataset of `total` rows with numeric offset
    /// cursors.
    fn dataset_fetch(total: u32, page_size: u32) -> impl FnMut(Option<&Cursor>) -> LinkProbe {
        move |cursor| {
            let offset: u32 = cursor.map_or(0, |c| c.as_str().parse().expect("numeric cursor"));
            let rows = page_size.min(total.saturating_sub(offset));
            let next = offset + rows;
            let last_cursor = (rows == page_size).then(|| Cursor::from(next.to_string()));

            LinkProbe { rows, last_cursor }
        }
    }

    #[test]
    fn page_one_needs_no_cursor_and_no_queries() {
        let mut chain = CursorChain::new();
        let mut fetch = |_: Option<&Cursor>| -> LinkProbe {
            panic!("page 1 must not trigger a gap query")
        };

        let (resolved, queries) = walk(&mut chain, PageIndex::FIRST, 50, &mut fetch);

        assert_eq!(resolved, ResolvedCursor::Start);
        assert_eq!(queries, 0);
    }

    #[test]
    fn jump_to_page_k_issues_exactly_k_minus_one_queries() {
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(500, 50);

        let (resolved, queries) = walk(&mut chain, PageIndex::new(4), 50, &mut fetch);

        assert!(matches!(resolved, ResolvedCursor::After(_)));
        assert_eq!(queries, 3);
        // Links for pages 2..=4 are now cached.
        assert_eq!(chain.link_count(), 3);
    }

    #[test]
    fn revisiting_a_resolved_page_issues_no_queries() {
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(500, 50);
        walk(&mut chain, PageIndex::new(4), 50, &mut fetch);

        let mut no_fetch = |_: Option<&Cursor>| -> LinkProbe {
            panic!("cached link must be reused")
        };
        let (resolved, queries) = walk(&mut chain, PageIndex::new(4), 50, &mut no_fetch);

        assert!(matches!(resolved, ResolvedCursor::After(_)));
        assert_eq!(queries, 0);
    }

    #[test]
    fn walk_resumes_from_the_deepest_cached_link() {
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(500, 50);
        walk(&mut chain, PageIndex::new(3), 50, &mut fetch);

        // Links for pages 2-3 are cached; reaching page 5 probes 3 and 4.
        let (resolved, queries) = walk(&mut chain, PageIndex::new(5), 50, &mut fetch);

        assert!(matches!(resolved, ResolvedCursor::After(_)));
        assert_eq!(queries, 2);
    }

    #[test]
    fn short_page_marks_all_further_pages_nonexistent() {
        // 120 rows at page size 50: pages 1-2 full, page 3 short (20 rows).
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(120, 50);

        let (resolved, queries) = walk(&mut chain, PageIndex::new(4), 50, &mut fetch);

        assert_eq!(resolved, ResolvedCursor::NoSuchPage, "page 4 is past the end");
        assert_eq!(queries, 3);
        assert_eq!(chain.last_page(), Some(3));

        // Known end answers later lookups from cache alone.
        let mut no_fetch = |_: Option<&Cursor>| -> LinkProbe {
            panic!("past-end pages must not query")
        };
        let (resolved, queries) = walk(&mut chain, PageIndex::new(9), 50, &mut no_fetch);
        assert_eq!(resolved, ResolvedCursor::NoSuchPage);
        assert_eq!(queries, 0);
    }

    #[test]
    fn shrunken_data_invalidates_links_past_the_short_page() {
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(500, 50);
        walk(&mut chain, PageIndex::new(5), 50, &mut fetch);
        assert_eq!(chain.link_count(), 4);

        // Deletions shrank the dataset to 80 rows; rewalking page 2 comes up
        // short and must drop the now-meaningless deeper links.
        chain.invalidate_from(PageIndex::new(2));
        let mut shrunk = dataset_fetch(80, 50);
        let (resolved, _) = walk(&mut chain, PageIndex::new(5), 50, &mut shrunk);

        assert_eq!(resolved, ResolvedCursor::NoSuchPage);
        assert_eq!(chain.last_page(), Some(2));
        assert!(chain.link_count() <= 1);
    }

    #[test]
    fn regrown_tail_page_clears_the_recorded_end() {
        // 70 rows at page size 50: page 2 is short, the chain ends there.
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(70, 50);
        let (resolved, _) = walk(&mut chain, PageIndex::new(3), 50, &mut fetch);
        assert_eq!(resolved, ResolvedCursor::NoSuchPage);
        assert_eq!(chain.last_page(), Some(2));

        // The dataset grew; a refetch of page 2 comes back full with a
        // continuation, so page 3 exists after all.
        chain.record_link(PageIndex::new(2), &probe(50, Some("100")), 50);

        assert_eq!(chain.last_page(), None);
        assert!(matches!(
            chain.peek(PageIndex::new(3)),
            Some(ResolvedCursor::After(_))
        ));
    }

    #[test]
    fn reopen_end_forgets_the_marker_only_past_the_end() {
        let mut chain = CursorChain::new();
        chain.record_end(PageIndex::new(2));

        // Page 2 itself still exists; the marker stays.
        chain.reopen_end(PageIndex::new(2));
        assert_eq!(chain.last_page(), Some(2));

        chain.reopen_end(PageIndex::new(3));
        assert_eq!(chain.last_page(), None);
    }

    #[test]
    fn full_page_without_cursor_counts_as_end() {
        let mut chain = CursorChain::new();
        chain.record_link(PageIndex::FIRST, &probe(50, None), 50);

        assert!(chain.is_past_end(PageIndex::new(2)));
    }

    #[test]
    fn clear_forgets_links_and_end_marker() {
        let mut chain = CursorChain::new();
        let mut fetch = dataset_fetch(120, 50);
        walk(&mut chain, PageIndex::new(4), 50, &mut fetch);

        chain.clear();

        assert_eq!(chain.link_count(), 0);
        assert_eq!(chain.last_page(), None);
        assert_eq!(chain.peek(PageIndex::new(2)), None);
    }
}
