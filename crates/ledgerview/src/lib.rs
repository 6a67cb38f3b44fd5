//! ## Crate layout
//! - `core`: session runtime — scope partitioning, cursor chains, page and
//!   statistics caches, live-change reconciliation, and optimistic patches.
//!
//! The `prelude` module mirrors the surface a UI host wires against: the
//! session object, its outcome types, and the domain vocabulary.

pub use ledgerview_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::{QueryError, SyncError};

///
/// Host Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        config::SessionConfig,
        executor::{ChangeSource, QueryExecutor},
        live::{CoalescePolicy, LiveObserver},
        obs::{MetricsEvent, MetricsSink},
        scope::FilterSet,
        session::{
            LedgerSession, PageOutcome, PageView, RecordPatch, RequestOptions, StatsOutcome,
        },
        stats::Statistics,
        time::TimeSource,
        types::{Amount, LedgerRecord, PageIndex, RecordId, RecordKind, RecordStatus, Timestamp},
    };
    pub use serde::{Deserialize, Serialize};
}
