//! Shared error taxonomy for the sync engine.
//!
//! Structural errors ([`SyncError::InvalidPlan`], [`SyncError::DuplicateWriteIntent`])
//! abort a whole invocation; setup errors ([`SyncError::UnknownBackend`],
//! [`SyncError::BackendValidation`]) abort before any sync runs; everything else
//! is surfaced per action or per write intent without stopping sibling work.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The action/target/template combination is not a supported pairing.
    #[error("invalid sync action: {0}")]
    InvalidPlan(String),

    /// Two actions produced a write intent for the same (key, version).
    #[error("key {0} was scheduled for sync more than once")]
    DuplicateWriteIntent(String),

    /// No provider is registered for the configured backend.
    #[error("no provider registered for backend {0}")]
    UnknownBackend(String),

    /// Backend-specific configuration is incomplete or invalid.
    #[error("invalid {backend} store config: {reason}")]
    BackendValidation {
        backend: &'static str,
        reason: String,
    },

    /// Shared sentinel so callers can downgrade a missing key to a warning.
    #[error("secret key not found")]
    KeyNotFound,

    /// Template parse or render failure. Drops the owning action.
    #[error("template failed: {0}")]
    Template(String),

    /// The planner produced zero bytes for a write intent.
    #[error("empty value")]
    EmptyValue,

    /// Underlying transport or filesystem failure.
    #[error(transparent)]
    BackendIo(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether this error must abort the whole invocation instead of
    /// dropping a single action.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidPlan(_) | SyncError::DuplicateWriteIntent(_)
        )
    }
}
