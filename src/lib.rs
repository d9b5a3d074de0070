//! acidkv — client-side atomic multi-document transactions over a
//! single-document KV store.
//!
//! The underlying store only offers single-document get/insert/replace/
//! remove with a per-document revision token. This crate layers a
//! transaction protocol on top: a body stages reads and writes across any
//! set of documents and either all of them become visible atomically or
//! none do, with optimistic conflict detection, configurable write
//! durability, and background recovery of transactions whose process died.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use acidkv::{
//!     Coordinator, DocKey, DocumentStore, DurabilityLevel, MemoryStore,
//!     TransactionConfig, Value,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert(
//!     &DocKey::new("conference"),
//!     Value::object([("followups", Value::Int(0))]),
//!     DurabilityLevel::None,
//! )?;
//!
//! let coordinator = Coordinator::new(
//!     Arc::clone(&store) as Arc<dyn DocumentStore>,
//!     TransactionConfig::new()
//!         .with_durability(DurabilityLevel::None)
//!         .with_timeout(Duration::from_secs(5)),
//! );
//!
//! coordinator.run(|ctx| {
//!     let doc = ctx.get(&DocKey::new("conference"))?;
//!     let n = doc.content.get("followups").and_then(Value::as_int).unwrap_or(0);
//!     let mut updated = doc.content.clone();
//!     updated.set("followups", Value::Int(n + 1));
//!     ctx.replace(&doc, updated)
//! })?;
//!
//! assert_eq!(
//!     store.get(&DocKey::new("conference"))?.content.get("followups"),
//!     Some(&Value::Int(1)),
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use acidkv_core::{
    AtrPhase, Cas, DocKey, DocumentStore, DurabilityLevel, Error, Result, TxnId, Value, Versioned,
};
pub use acidkv_store::{CrashStore, MemoryStore};
pub use acidkv_txn::{
    AttemptContext, CleanupStats, CleanupWorker, Coordinator, FailureKind, GetResult, LogEntry,
    TransactionConfig, TransactionFailed, TransactionResult,
};
