use thiserror::Error as ThisError;

///
/// QueryError
///
/// Collaborator-side failure taxonomy for range queries, aggregate calls,
/// and subscription setup.
///

#[derive(Clone, Debug, ThisError)]
pub enum QueryError {
    /// Network-level or availability failure; safe to retry, caches untouched.
    #[error("transient query failure: {message}")]
    Transient { message: String },

    /// The caller is no longer allowed to see this scope.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The backend does not expose the requested capability.
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },
}

impl QueryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

///
/// SyncError
///
/// The only failure surface exposed to the UI consumer. Everything else
/// (unsupported aggregation, reconciliation conflicts, stale cursor chains)
/// is absorbed internally by fallback strategies.
///

#[derive(Clone, Debug, ThisError)]
pub enum SyncError {
    /// Retryable network-level failure; previously cached data is kept.
    #[error("transient query failure: {message}")]
    Transient { message: String },

    /// Access to the active scope was revoked. All caches for the scope are
    /// cleared before this error is surfaced.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The live subscription could not be re-established within the retry
    /// budget. Delivered through the live observer, never from a query call.
    #[error("live subscription lost after {attempts} attempts: {message}")]
    SubscriptionLost { attempts: u32, message: String },
}

impl From<QueryError> for SyncError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Transient { message } | QueryError::Unsupported { message } => {
                Self::Transient { message }
            }
            QueryError::PermissionDenied { message } => Self::PermissionDenied { message },
        }
    }
}
