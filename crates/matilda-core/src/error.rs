//! Error taxonomy for the discovery core.
//!
//! Errors cross component boundaries as structured values, never as panics:
//! the orchestrator decides per kind whether a failure is fatal, rejects a
//! single candidate, or finalizes the run as a clean partial stop.

use thiserror::Error;

/// Where a query failure originated. Drives the orchestrator's policy:
/// `Timeout` rejects the candidate (and escalates after three in a row),
/// `Driver` and `Schema` are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Timeout,
    Driver,
    Schema,
}

impl QueryErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryErrorKind::Timeout => "timeout",
            QueryErrorKind::Driver => "driver",
            QueryErrorKind::Schema => "schema",
        }
    }
}

/// A failed SQL operation, carrying the offending statement for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{} query error: {message} (sql: {sql})", .kind.as_str())]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub sql: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: sql.into(),
        }
    }
}

/// What tripped the resource monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    Memory,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelReason::Timeout => "timeout",
            CancelReason::Memory => "memory",
        }
    }
}

/// Top-level error type of a discovery run.
///
/// `Cancelled` is not an error in the usual sense: the orchestrator converts
/// it into a partial-success outcome. It lives here so long-running callers
/// can return it through the same channel without a parallel control path.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema introspection failed: {0}")]
    Schema(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("discovery cancelled ({})", .0.as_str())]
    Cancelled(CancelReason),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;
