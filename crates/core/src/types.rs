//! Identifier and token types shared across the system
//!
//! Everything here is plain data: keys, revision tokens, transaction ids,
//! durability levels, and the ATR phase machine. The phase transition rules
//! live on [`AtrPhase`] so that both the transaction engine and the cleanup
//! worker enforce the same edges.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key of a document in the underlying store.
///
/// Keys are opaque UTF-8 strings. The transaction engine reserves the
/// `_txn::` prefix for its own records (ATRs and write claims); application
/// documents should not use it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocKey(String);

impl DocKey {
    /// Create a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        DocKey(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the key starts with the given prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        DocKey::new(s)
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        DocKey(s)
    }
}

/// Opaque revision token assigned by the store on every successful write.
///
/// A `Cas` is only meaningful for equality comparison against a token
/// returned by the same store. Token `0` never names a real revision; it is
/// used as the "not yet written" placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cas(pub u64);

impl Cas {
    /// Raw token value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique id of a transaction attempt.
///
/// A fresh id is minted for every attempt; a retried transaction never
/// reuses the id (or the ATR) of a discarded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Mint a new random id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        TxnId(Uuid::new_v4())
    }

    /// Parse an id from its string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(TxnId)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How strongly a single write must be acknowledged before it returns.
///
/// Stronger levels trade latency for a stronger guarantee that a crash will
/// not lose the write. `None` is only safe on a single node with no
/// replication involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// Acknowledged once applied in memory on the active node only.
    None,
    /// Available in memory on a majority of replicas.
    Majority,
    /// Available in memory and persisted to disk on a majority of replicas.
    PersistToMajority,
    /// Available in memory on a majority of replicas and persisted to disk
    /// on the active node.
    MajorityAndPersistToActive,
}

impl Default for DurabilityLevel {
    fn default() -> Self {
        DurabilityLevel::Majority
    }
}

/// A document's content together with its current revision token.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    /// The document body.
    pub content: Value,
    /// Revision token at the time of the read.
    pub cas: Cas,
}

impl Versioned {
    /// Bundle content and revision.
    pub fn new(content: Value, cas: Cas) -> Self {
        Versioned { content, cas }
    }
}

/// Phase of an active transaction record.
///
/// Transitions are monotonic and never skip a step:
///
/// ```text
/// Pending ──► Staged ──► Committed ──► Completed
///    │
///    └──────► RolledBack
/// ```
///
/// The durable `Pending → Staged` write is the commit decision point: after
/// it the transaction will eventually be visible in full, even if the owning
/// process dies immediately. `RolledBack` is only reachable from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtrPhase {
    /// Attempt is running; nothing is visible to other transactions.
    Pending,
    /// All staged mutations are durably recorded; commit is decided.
    Staged,
    /// Document writes are being (or have been) applied.
    Committed,
    /// Every staged write is durably applied; the record may be deleted.
    Completed,
    /// Attempt was abandoned before the commit decision; no document was
    /// mutated. The record may be deleted.
    RolledBack,
}

impl AtrPhase {
    /// Whether `self → to` is a legal phase transition.
    pub fn can_advance_to(&self, to: AtrPhase) -> bool {
        matches!(
            (self, to),
            (AtrPhase::Pending, AtrPhase::Staged)
                | (AtrPhase::Pending, AtrPhase::RolledBack)
                | (AtrPhase::Staged, AtrPhase::Committed)
                | (AtrPhase::Committed, AtrPhase::Completed)
        )
    }

    /// Whether the record may be deleted in this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AtrPhase::Completed | AtrPhase::RolledBack)
    }

    /// Stable string form used in the store-resident record.
    pub fn as_str(&self) -> &'static str {
        match self {
            AtrPhase::Pending => "pending",
            AtrPhase::Staged => "staged",
            AtrPhase::Committed => "committed",
            AtrPhase::Completed => "completed",
            AtrPhase::RolledBack => "rolled_back",
        }
    }

    /// Parse the string form written by [`AtrPhase::as_str`].
    pub fn parse(s: &str) -> Option<AtrPhase> {
        match s {
            "pending" => Some(AtrPhase::Pending),
            "staged" => Some(AtrPhase::Staged),
            "committed" => Some(AtrPhase::Committed),
            "completed" => Some(AtrPhase::Completed),
            "rolled_back" => Some(AtrPhase::RolledBack),
            _ => None,
        }
    }
}

impl fmt::Display for AtrPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience conversion used when embedding keys in record bodies.
impl From<&DocKey> for Value {
    fn from(key: &DocKey) -> Self {
        Value::String(key.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockey_prefix_and_display() {
        let key = DocKey::new("_txn::atr::abc");
        assert!(key.has_prefix("_txn::atr::"));
        assert_eq!(key.to_string(), "_txn::atr::abc");
    }

    #[test]
    fn txn_id_roundtrip() {
        let id = TxnId::new();
        let parsed = TxnId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn txn_ids_are_unique() {
        assert_ne!(TxnId::new(), TxnId::new());
    }

    #[test]
    fn phase_forward_edges_allowed() {
        assert!(AtrPhase::Pending.can_advance_to(AtrPhase::Staged));
        assert!(AtrPhase::Pending.can_advance_to(AtrPhase::RolledBack));
        assert!(AtrPhase::Staged.can_advance_to(AtrPhase::Committed));
        assert!(AtrPhase::Committed.can_advance_to(AtrPhase::Completed));
    }

    #[test]
    fn phase_never_reverses_or_skips() {
        assert!(!AtrPhase::Pending.can_advance_to(AtrPhase::Committed));
        assert!(!AtrPhase::Staged.can_advance_to(AtrPhase::Completed));
        assert!(!AtrPhase::Staged.can_advance_to(AtrPhase::RolledBack));
        assert!(!AtrPhase::Staged.can_advance_to(AtrPhase::Pending));
        assert!(!AtrPhase::Committed.can_advance_to(AtrPhase::RolledBack));
        assert!(!AtrPhase::Completed.can_advance_to(AtrPhase::Pending));
        assert!(!AtrPhase::RolledBack.can_advance_to(AtrPhase::Pending));
    }

    #[test]
    fn phase_string_roundtrip() {
        for phase in [
            AtrPhase::Pending,
            AtrPhase::Staged,
            AtrPhase::Committed,
            AtrPhase::Completed,
            AtrPhase::RolledBack,
        ] {
            assert_eq!(AtrPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(AtrPhase::parse("bogus"), None);
    }

    #[test]
    fn terminal_phases() {
        assert!(AtrPhase::Completed.is_terminal());
        assert!(AtrPhase::RolledBack.is_terminal());
        assert!(!AtrPhase::Pending.is_terminal());
        assert!(!AtrPhase::Staged.is_terminal());
        assert!(!AtrPhase::Committed.is_terminal());
    }

    #[test]
    fn default_durability_is_majority() {
        assert_eq!(DurabilityLevel::default(), DurabilityLevel::Majority);
    }
}
