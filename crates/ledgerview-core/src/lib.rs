//! Core runtime for LedgerView: scope partitioning, cursor-chain pagination,
//! page and statistics caches, live-change reconciliation, and the session
//! object that ties them together over host-supplied collaborators.
#![warn(unreachable_pub)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod live;
pub mod obs;
pub mod page;
pub mod scope;
pub mod session;
pub mod stats;
pub mod time;
pub mod types;

pub use error::{QueryError, SyncError};

///
/// Prelude
///
/// Prelude contains only domain vocabulary plus the session surface.
/// Collaborator traits, caches, and internals stay at their module paths.
///

pub mod prelude {
    pub use crate::{
        error::{QueryError, SyncError},
        scope::FilterSet,
        session::{
            LedgerSession, PageOutcome, PageView, RecordPatch, RequestOptions, StatsOutcome,
        },
        stats::Statistics,
        types::{Amount, LedgerRecord, PageIndex, RecordId, RecordKind, RecordStatus, Timestamp},
    };
}
