//! Page memoization.
//!
//! Materialized pages are cached per scope partition and keyed by page
//! index. The cache distinguishes "not yet fetched" from "fetched and
//! empty" from "known end-of-data" so the pagination UI never needs a
//! probe query to decide whether a "next" control is live.

use crate::types::{LedgerRecord, PageIndex, RecordId};
use std::collections::BTreeMap;

///
/// CachedPage
///

#[derive(Clone, Debug)]
pub struct CachedPage {
    pub records: Vec<LedgerRecord>,
    pub has_more: bool,
}

///
/// PageLookup
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageLookup<'a> {
    /// No fetch has materialized this page yet.
    NotFetched,

    /// The page was fetched; `has_more` reflects whether the fetch filled
    /// the page (so a later page may exist).
    Cached {
        records: &'a [LedgerRecord],
        has_more: bool,
    },

    /// The dataset is known to end before this page.
    EndOfData,
}

///
/// PageCache
///

#[derive(Debug, Default)]
pub struct PageCache {
    pages: BTreeMap<u32, CachedPage>,
    /// First page index known not to exist.
    end_before: Option<u32>,
}

impl PageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, page: PageIndex) -> PageLookup<'_> {
        if self.end_before.is_some_and(|end| page.get() >= end) {
            return PageLookup::EndOfData;
        }

        self.pages.get(&page.get()).map_or(PageLookup::NotFetched, |cached| {
            PageLookup::Cached {
                records: &cached.records,
                has_more: cached.has_more,
            }
        })
    }

    #[must_use]
    pub fn is_cached(&self, page: PageIndex) -> bool {
        self.pages.contains_key(&page.get())
    }

    pub fn put(&mut self, page: PageIndex, records: Vec<LedgerRecord>, has_more: bool) {
        if has_more {
            // A full continuation page contradicts an end marker at or
            // before the next page: the dataset grew back.
            if self.end_before.is_some_and(|end| end <= page.get() + 1) {
                self.end_before = None;
            }
        } else {
            // This page exists, so the end sits just past it even when an
            // earlier marker said otherwise.
            self.end_before = Some(page.get() + 1);
        }
        self.pages.insert(page.get(), CachedPage { records, has_more });
    }

    pub fn invalidate_all(&mut self) {
        self.pages.clear();
        self.end_before = None;
    }

    /// Drop a record from every cached page holding it. Returns how many
    /// pages were touched.
    pub fn remove_record(&mut self, id: RecordId) -> usize {
        let mut touched = 0;
        for cached in self.pages.values_mut() {
            let before = cached.records.len();
            cached.records.retain(|r| r.id != id);
            if cached.records.len() != before {
                touched += 1;
            }
        }

        touched
    }

    /// Patch a record wherever it is cached. Returns the prior value if the
    /// record was present anywhere.
    pub fn patch_record(&mut self, record: &LedgerRecord) -> Option<LedgerRecord> {
        let mut prior = None;
        for cached in self.pages.values_mut() {
            if let Some(slot) = cached.records.iter_mut().find(|r| r.id == record.id) {
                prior.get_or_insert_with(|| slot.clone());
                *slot = record.clone();
            }
        }

        prior
    }

    /// Find a record in any cached page.
    #[must_use]
    pub fn find_record(&self, id: RecordId) -> Option<&LedgerRecord> {
        self.pages
            .values()
            .flat_map(|cached| cached.records.iter())
            .find(|r| r.id == id)
    }

    #[must_use]
    pub fn head(&self) -> Option<&CachedPage> {
        self.pages.get(&PageIndex::FIRST.get())
    }

    /// Merge a live-inserted record into the head page, keeping strict
    /// descending order and deduplicating by id. Records pushed past
    /// `page_size` fall off the tail; the head then knows a later page
    /// exists. Returns false when the head page is not cached.
    pub fn merge_head(&mut self, record: LedgerRecord, page_size: u32) -> bool {
        let Some(head) = self.pages.get_mut(&PageIndex::FIRST.get()) else {
            return false;
        };

        head.records.retain(|r| r.id != record.id);
        let at = head
            .records
            .partition_point(|r| LedgerRecord::cmp_desc(r, &record).is_lt());
        head.records.insert(at, record);

        if head.records.len() > page_size as usize {
            head.records.truncate(page_size as usize);
            head.has_more = true;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Amount, RecordKind, RecordStatus, Timestamp};

    fn record(secs: u64, salt: u128) -> LedgerRecord {
        LedgerRecord {
            id: RecordId::from_parts(secs * 1_000, salt),
            timestamp: Timestamp::from_seconds(secs),
            kind: RecordKind::TopUp,
            status: RecordStatus::Completed,
            amount: Amount::from_minor(100),
            note: None,
        }
    }

    fn descending(range: std::ops::Range<u64>) -> Vec<LedgerRecord> {
        let mut records: Vec<_> = range.map(|s| record(s, 1)).collect();
        records.sort_by(LedgerRecord::cmp_desc);

        records
    }

    #[test]
    fn lookup_distinguishes_unfetched_empty_and_past_end() {
        let mut cache = PageCache::new();
        assert_eq!(cache.get(PageIndex::new(2)), PageLookup::NotFetched);

        cache.put(PageIndex::new(2), vec![], false);

        assert!(matches!(
            cache.get(PageIndex::new(2)),
            PageLookup::Cached { records: [], has_more: false }
        ));
        assert_eq!(cache.get(PageIndex::new(3)), PageLookup::EndOfData);
    }

    #[test]
    fn full_refetch_clears_a_stale_end_marker() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::new(2), descending(50..70), false);
        assert_eq!(cache.get(PageIndex::new(3)), PageLookup::EndOfData);

        // The dataset grew; a forced refetch finds page 2 full again.
        cache.put(PageIndex::new(2), descending(50..100), true);

        assert_eq!(cache.get(PageIndex::new(3)), PageLookup::NotFetched);
    }

    #[test]
    fn invalidate_all_resets_the_partition() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::FIRST, descending(0..50), true);
        cache.put(PageIndex::new(2), descending(50..70), false);

        cache.invalidate_all();

        assert_eq!(cache.get(PageIndex::FIRST), PageLookup::NotFetched);
        assert_eq!(cache.get(PageIndex::new(3)), PageLookup::NotFetched);
    }

    #[test]
    fn remove_record_drops_from_every_holding_page() {
        let mut cache = PageCache::new();
        let shared = record(99, 9);
        let mut page_one = descending(100..110);
        page_one.push(shared.clone());
        cache.put(PageIndex::FIRST, page_one, true);
        cache.put(
            PageIndex::new(2),
            vec![shared.clone(), record(50, 1)],
            false,
        );

        let touched = cache.remove_record(shared.id);

        assert_eq!(touched, 2);
        assert!(cache.find_record(shared.id).is_none());
    }

    #[test]
    fn merge_head_inserts_newest_records_at_the_front() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::FIRST, descending(100..110), false);

        let newest = record(500, 1);
        assert!(cache.merge_head(newest.clone(), 50));

        let head = cache.head().expect("head cached");
        assert_eq!(head.records.first().map(|r| r.id), Some(newest.id));
    }

    #[test]
    fn merge_head_dedups_by_id_and_keeps_order() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::FIRST, descending(100..110), false);

        let mut updated = record(105, 1);
        updated.amount = Amount::from_minor(999);
        assert!(cache.merge_head(updated, 50));

        let head = cache.head().expect("head cached");
        assert_eq!(head.records.len(), 10, "no duplicate entry");
        assert!(
            head.records
                .windows(2)
                .all(|w| LedgerRecord::cmp_desc(&w[0], &w[1]).is_lt()),
            "descending order preserved"
        );
    }

    #[test]
    fn merge_head_overflow_trims_and_flags_more() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::FIRST, descending(100..110), false);

        assert!(cache.merge_head(record(500, 1), 10));

        let head = cache.head().expect("head cached");
        assert_eq!(head.records.len(), 10);
        assert!(head.has_more, "trimmed tail means a later page exists");
    }

    #[test]
    fn merge_head_without_cached_head_is_a_no_op() {
        let mut cache = PageCache::new();

        assert!(!cache.merge_head(record(1, 1), 50));
    }

    #[test]
    fn patch_record_returns_the_prior_value() {
        let mut cache = PageCache::new();
        cache.put(PageIndex::FIRST, descending(100..110), true);

        let mut patched = record(105, 1);
        patched.status = RecordStatus::Reversed;
        let prior = cache.patch_record(&patched).expect("record was cached");

        assert_eq!(prior.status, RecordStatus::Completed);
        assert_eq!(
            cache.find_record(patched.id).map(|r| r.status),
            Some(RecordStatus::Reversed)
        );
    }
}
