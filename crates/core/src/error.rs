//! Error taxonomy
//!
//! A single enum covers every failure the engine can raise. The important
//! split is transient vs. terminal: [`Error::is_retriable`] marks the
//! conflict class (`WriteWriteConflict`, `CasMismatch`) that the coordinator
//! retries with a fresh attempt; everything else either surfaces to the body
//! (`DocNotFound`) or rolls the transaction back for good.

use crate::types::{AtrPhase, Cas, DocKey};
use thiserror::Error;

/// Result type alias for acidkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the store and the transaction engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Document does not exist.
    #[error("document not found: {0}")]
    DocNotFound(DocKey),

    /// Document already exists (insert of an existing key).
    #[error("document already exists: {0}")]
    DocExists(DocKey),

    /// Compare-and-swap failed: the revision changed since it was read.
    #[error("cas mismatch on {key}: expected {expected}, found {actual}")]
    CasMismatch {
        /// Document whose revision moved.
        key: DocKey,
        /// Revision the caller expected.
        expected: Cas,
        /// Revision actually present in the store.
        actual: Cas,
    },

    /// Document is claimed by another in-flight transaction attempt.
    #[error("document {0} is staged by another transaction")]
    WriteWriteConflict(DocKey),

    /// A mutating operation was issued without a prior read this attempt.
    #[error("document {0} was not read in this attempt")]
    NotRead(DocKey),

    /// Illegal ATR phase transition. This is an internal invariant
    /// violation — a coordinator or cleanup bug — and is never retried.
    #[error("invalid transaction record transition: {from} -> {to}")]
    InvalidTransition {
        /// Phase the record is in.
        from: AtrPhase,
        /// Phase that was requested.
        to: AtrPhase,
    },

    /// The attempt's wall-clock deadline elapsed.
    #[error("transaction expired")]
    Expired,

    /// The transaction body requested a rollback.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// Underlying store failure (network, disk, injected fault).
    #[error("store error: {0}")]
    Store(String),

    /// A store-resident record could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Conflict-class errors are transient: the coordinator discards the
    /// attempt and retries with a fresh one until the deadline elapses.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::WriteWriteConflict(_) | Error::CasMismatch { .. }
        )
    }
}
