//! Store abstraction
//!
//! [`DocumentStore`] is the boundary between the transaction engine and the
//! underlying single-document store. The engine requires nothing beyond this
//! operation set plus revision-token equality; swapping the in-memory
//! reference implementation for a networked one must not touch the engine.

use crate::error::Result;
use crate::types::{Cas, DocKey, DurabilityLevel, Versioned};
use crate::value::Value;

/// A single-document key-value store with per-document revisions.
///
/// Every mutating operation takes a [`DurabilityLevel`] and returns only
/// once the store has acknowledged the write at that level. No operation
/// retries implicitly — the caller decides.
///
/// Thread safety: all methods must be safe to call concurrently
/// (`Send + Sync`). Operations may block on network or disk; they have no
/// internal timeout.
pub trait DocumentStore: Send + Sync {
    /// Read a document with its current revision.
    ///
    /// # Errors
    /// `DocNotFound` if the key is absent.
    fn get(&self, key: &DocKey) -> Result<Versioned>;

    /// Create a document that must not already exist.
    ///
    /// Returns the revision assigned to the new document.
    ///
    /// # Errors
    /// `DocExists` if the key is present.
    fn insert(&self, key: &DocKey, content: Value, durability: DurabilityLevel) -> Result<Cas>;

    /// Replace a document's content, guarded by its expected revision.
    ///
    /// Returns the new revision on success.
    ///
    /// # Errors
    /// `CasMismatch` if the revision moved since `expected` was read,
    /// `DocNotFound` if the key is absent.
    fn replace(
        &self,
        key: &DocKey,
        content: Value,
        expected: Cas,
        durability: DurabilityLevel,
    ) -> Result<Cas>;

    /// Remove a document, guarded by its expected revision.
    ///
    /// # Errors
    /// `CasMismatch` if the revision moved since `expected` was read,
    /// `DocNotFound` if the key is absent.
    fn remove(&self, key: &DocKey, expected: Cas, durability: DurabilityLevel) -> Result<()>;

    /// List all documents whose key starts with `prefix`, in key order.
    ///
    /// Used by the cleanup scan over transaction records; stores only need
    /// an efficient implementation for the reserved `_txn::` prefixes.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(DocKey, Versioned)>>;
}
