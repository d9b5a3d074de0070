//! In-memory document store
//!
//! `BTreeMap` behind a `parking_lot::RwLock`, with an `AtomicU64` revision
//! counter. Revisions are unique across the whole store, so a document's
//! token changes on every successful write and never repeats.
//!
//! Durability levels are accepted and acknowledged immediately: a single
//! in-process node has no replicas to wait for. The parameter is part of the
//! contract so networked implementations can honor it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use acidkv_core::{Cas, DocKey, DocumentStore, DurabilityLevel, Error, Result, Value, Versioned};

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocKey, StoredDoc>>,
    next_cas: AtomicU64,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    content: Value,
    cas: Cas,
}

impl MemoryStore {
    /// Create an empty store. The first assigned revision is 1; token 0 is
    /// never handed out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored (including engine-internal
    /// records under the `_txn::` prefix).
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Whether the store holds no documents at all.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    fn allocate_cas(&self) -> Cas {
        Cas(self.next_cas.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &DocKey) -> Result<Versioned> {
        let docs = self.docs.read();
        docs.get(key)
            .map(|doc| Versioned::new(doc.content.clone(), doc.cas))
            .ok_or_else(|| Error::DocNotFound(key.clone()))
    }

    fn insert(&self, key: &DocKey, content: Value, _durability: DurabilityLevel) -> Result<Cas> {
        let mut docs = self.docs.write();
        if docs.contains_key(key) {
            return Err(Error::DocExists(key.clone()));
        }
        let cas = self.allocate_cas();
        docs.insert(key.clone(), StoredDoc { content, cas });
        Ok(cas)
    }

    fn replace(
        &self,
        key: &DocKey,
        content: Value,
        expected: Cas,
        _durability: DurabilityLevel,
    ) -> Result<Cas> {
        let mut docs = self.docs.write();
        let doc = docs
            .get_mut(key)
            .ok_or_else(|| Error::DocNotFound(key.clone()))?;
        if doc.cas != expected {
            return Err(Error::CasMismatch {
                key: key.clone(),
                expected,
                actual: doc.cas,
            });
        }
        let cas = self.allocate_cas();
        doc.content = content;
        doc.cas = cas;
        Ok(cas)
    }

    fn remove(&self, key: &DocKey, expected: Cas, _durability: DurabilityLevel) -> Result<()> {
        let mut docs = self.docs.write();
        let doc = docs
            .get(key)
            .ok_or_else(|| Error::DocNotFound(key.clone()))?;
        if doc.cas != expected {
            return Err(Error::CasMismatch {
                key: key.clone(),
                expected,
                actual: doc.cas,
            });
        }
        docs.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(DocKey, Versioned)>> {
        let docs = self.docs.read();
        Ok(docs
            .range(DocKey::new(prefix)..)
            .take_while(|(key, _)| key.has_prefix(prefix))
            .map(|(key, doc)| (key.clone(), Versioned::new(doc.content.clone(), doc.cas)))
            .collect())
    }
}
