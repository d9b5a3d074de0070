//! Fault-injection wrapper for crash testing
//!
//! [`CrashStore`] delegates to an inner store but spends a write budget on
//! every mutating call. Once the budget hits zero, all further mutations
//! fail, leaving the inner store frozen exactly as it was mid-sequence.
//! Sweeping the budget from 0 upward simulates a coordinator dying at every
//! possible point of a commit, which is what the recovery tests exercise.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use acidkv_core::{
    Cas, DocKey, DocumentStore, DurabilityLevel, Error, Result, Value, Versioned,
};

/// A [`DocumentStore`] that stops accepting writes after a fixed budget.
///
/// Reads always pass through. Each successful-or-not mutating call consumes
/// one unit of budget before it reaches the inner store; the call that finds
/// the budget exhausted fails with [`Error::Store`] and touches nothing.
pub struct CrashStore {
    inner: Arc<dyn DocumentStore>,
    budget: AtomicI64,
}

impl CrashStore {
    /// Wrap `inner`, allowing `writes` mutating operations before the
    /// injected failure kicks in.
    pub fn new(inner: Arc<dyn DocumentStore>, writes: i64) -> Self {
        Self {
            inner,
            budget: AtomicI64::new(writes),
        }
    }

    /// Remaining write budget. Negative once writes have been refused.
    pub fn remaining(&self) -> i64 {
        self.budget.load(Ordering::SeqCst)
    }

    /// Lift the failure: all subsequent writes pass through again. Used
    /// after the simulated crash to let the cleanup worker run against a
    /// healthy store.
    pub fn revive(&self) {
        self.budget.store(i64::MAX, Ordering::SeqCst);
    }

    fn spend(&self) -> Result<()> {
        if self.budget.fetch_sub(1, Ordering::SeqCst) > 0 {
            Ok(())
        } else {
            Err(Error::Store("injected write failure".into()))
        }
    }
}

impl DocumentStore for CrashStore {
    fn get(&self, key: &DocKey) -> Result<Versioned> {
        self.inner.get(key)
    }

    fn insert(&self, key: &DocKey, content: Value, durability: DurabilityLevel) -> Result<Cas> {
        self.spend()?;
        self.inner.insert(key, content, durability)
    }

    fn replace(
        &self,
        key: &DocKey,
        content: Value,
        expected: Cas,
        durability: DurabilityLevel,
    ) -> Result<Cas> {
        self.spend()?;
        self.inner.replace(key, content, expected, durability)
    }

    fn remove(&self, key: &DocKey, expected: Cas, durability: DurabilityLevel) -> Result<()> {
        self.spend()?;
        self.inner.remove(key, expected, durability)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(DocKey, Versioned)>> {
        self.inner.scan_prefix(prefix)
    }
}
