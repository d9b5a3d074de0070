//! Transaction engine for acidkv
//!
//! Atomic, isolated multi-document read-modify-write over a store whose
//! native operations are single-document only. The pieces:
//!
//! - [`atr`]: store-resident transaction records, write claims, and the
//!   idempotent replay of staged mutations;
//! - [`context`]: the per-attempt API handed to a transaction body;
//! - [`coordinator`]: runs bodies, retries conflicts until the wall-clock
//!   deadline, reports terminal outcomes;
//! - [`cleanup`]: background recovery of attempts whose coordinator died;
//! - [`config`] and [`oplog`]: tunables and the per-attempt diagnostics log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atr;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod oplog;

pub use atr::{
    atr_key, claim_key, replay_mutation, AtrRecord, AtrStore, Replay, StagedKind, StagedMutation,
    ATR_PREFIX, CLAIM_PREFIX,
};
pub use cleanup::{CleanupStats, CleanupWorker};
pub use config::TransactionConfig;
pub use context::{AttemptContext, GetResult};
pub use coordinator::{Coordinator, FailureKind, TransactionFailed, TransactionResult};
pub use oplog::{LogEntry, OpLog};
