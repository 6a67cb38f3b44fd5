//! Typed domain vocabulary: identifiers, money, timestamps, and the ledger
//! record model shared by every cache layer.

mod amount;
mod id;
mod record;
mod timestamp;

pub use amount::Amount;
pub use id::{CorrelationId, RecordId};
pub use record::{LedgerRecord, RecordDecodeError, RecordKind, RecordStatus};
pub use timestamp::Timestamp;

use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// PageIndex
/// 1-based page number within a scope partition.
///

#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PageIndex(u32);

impl PageIndex {
    pub const FIRST: Self = Self(1);

    /// Construct from a 1-based index; zero clamps to the first page.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        if index == 0 { Self(1) } else { Self(index) }
    }

    #[must_use]
    pub const fn is_first(self) -> bool {
        self.0 == 1
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_is_one_based() {
        assert_eq!(PageIndex::new(0), PageIndex::FIRST);
        assert_eq!(PageIndex::new(3).get(), 3);
        assert!(PageIndex::FIRST.is_first());
        assert_eq!(PageIndex::FIRST.next().get(), 2);
    }
}
