use crate::live::CoalescePolicy;

/// Default records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default statistics TTL in seconds.
pub const DEFAULT_STATS_TTL_SECS: u64 = 300;

/// Default cap on the manual-scan statistics fallback.
pub const DEFAULT_MAX_SCAN_RECORDS: u32 = 1_000;

/// Default retry budget for re-establishing a lost subscription.
pub const DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS: u32 = 5;

/// Default base delay for reconnection backoff, in seconds (doubles per
/// attempt, capped at [`MAX_BACKOFF_SECS`]).
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;

/// Ceiling on the reconnection backoff delay.
pub const MAX_BACKOFF_SECS: u64 = 60;

/// Default lifetime of an unconfirmed optimistic patch, in seconds.
pub const DEFAULT_PENDING_PATCH_TTL_SECS: u64 = 30;

///
/// SessionConfig
///
/// Tuning knobs for one [`LedgerSession`](crate::session::LedgerSession).
/// Changing `page_size` on a live session is scope-invalidating.
///

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub page_size: u32,
    pub stats_ttl_secs: u64,
    pub max_scan_records: u32,
    pub max_resubscribe_attempts: u32,
    pub backoff_base_secs: u64,
    pub pending_patch_ttl_secs: u64,
    pub coalesce: CoalescePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            stats_ttl_secs: DEFAULT_STATS_TTL_SECS,
            max_scan_records: DEFAULT_MAX_SCAN_RECORDS,
            max_resubscribe_attempts: DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            pending_patch_ttl_secs: DEFAULT_PENDING_PATCH_TTL_SECS,
            coalesce: CoalescePolicy::Immediate,
        }
    }
}
