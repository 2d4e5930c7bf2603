//! Domain error types.

use thiserror::Error;

use crate::ids::{ChapterId, StepId};

/// Top-level domain error type for engine operations.
///
/// "No active chapter" is never an error; the resolver reports it as a
/// regular quest state. `StoreUnavailable` exists so callers can tell a
/// mid-quest player's unreachable store apart from a quest that has not
/// begun.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A chapter id did not resolve against the catalog or progress rows.
    #[error("chapter not found: {0}")]
    ChapterNotFound(ChapterId),

    /// A step id did not resolve against the catalog.
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// A precondition did not hold (stale step index, already-active
    /// chapter, wrong step type). Safe to retry after refetching state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A configuration defect that should have been caught by the catalog
    /// validator at deploy time.
    #[error("configuration error: {0}")]
    Config(String),

    /// The outbound delivery channel reported a failure. Game-state progress
    /// is decoupled from delivery and is not rolled back.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The progress store could not be reached or a query failed. Retryable.
    #[error("progress store unavailable: {0}")]
    StoreUnavailable(String),
}
