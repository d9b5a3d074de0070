//! Active transaction records and write claims
//!
//! The ATR is the store-resident source of truth for a transaction attempt:
//! its id, phase, deadline, and the full list of staged mutations. It is an
//! ordinary document under the reserved `_txn::atr::` prefix, so any process
//! that can reach the store can finish or abandon the attempt after a crash.
//!
//! Each document a transaction intends to write is additionally claimed with
//! a marker under `_txn::claim::<key>`. The marker is what a concurrent
//! attempt's `get` trips over; the target document itself stays untouched
//! (content and revision) until the commit decision is durable, which is what
//! makes rollback free.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use acidkv_core::{
    AtrPhase, Cas, DocKey, DocumentStore, DurabilityLevel, Error, Result, TxnId, Value, Versioned,
};

/// Reserved key prefix for transaction records.
pub const ATR_PREFIX: &str = "_txn::atr::";
/// Reserved key prefix for write claims.
pub const CLAIM_PREFIX: &str = "_txn::claim::";

/// Store key of the ATR for a given transaction.
pub fn atr_key(id: TxnId) -> DocKey {
    DocKey::new(format!("{ATR_PREFIX}{id}"))
}

/// Store key of the write claim for a given document.
pub fn claim_key(doc: &DocKey) -> DocKey {
    DocKey::new(format!("{CLAIM_PREFIX}{}", doc.as_str()))
}

/// Kind of a staged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Create a document that must not exist yet.
    Insert,
    /// Overwrite an existing document's content.
    Replace,
    /// Delete an existing document.
    Remove,
}

impl StagedKind {
    fn as_str(&self) -> &'static str {
        match self {
            StagedKind::Insert => "insert",
            StagedKind::Replace => "replace",
            StagedKind::Remove => "remove",
        }
    }

    fn parse(s: &str) -> Option<StagedKind> {
        match s {
            "insert" => Some(StagedKind::Insert),
            "replace" => Some(StagedKind::Replace),
            "remove" => Some(StagedKind::Remove),
            _ => None,
        }
    }
}

/// A write intended by an attempt but not yet applied to the real document.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedMutation {
    /// Document the mutation targets.
    pub key: DocKey,
    /// Insert, replace or remove.
    pub kind: StagedKind,
    /// New content; `None` for a remove.
    pub content: Option<Value>,
    /// Pre-transaction revision the write is guarded by; `None` for an
    /// insert (the document must not exist).
    pub expected: Option<Cas>,
}

impl StagedMutation {
    fn to_value(&self) -> Value {
        let mut fields = vec![
            ("key".to_string(), Value::from(&self.key)),
            ("kind".to_string(), Value::from(self.kind.as_str())),
        ];
        if let Some(content) = &self.content {
            fields.push(("content".to_string(), content.clone()));
        }
        if let Some(expected) = self.expected {
            fields.push(("expected".to_string(), Value::from(expected.to_string())));
        }
        Value::object(fields)
    }

    fn from_value(value: &Value) -> Result<StagedMutation> {
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .map(DocKey::new)
            .ok_or_else(|| Error::Encoding("staged mutation missing key".into()))?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .and_then(StagedKind::parse)
            .ok_or_else(|| Error::Encoding("staged mutation has unknown kind".into()))?;
        let expected = match value.get("expected").map(Value::as_str) {
            None => None,
            Some(Some(s)) => Some(
                s.parse::<u64>()
                    .map(Cas)
                    .map_err(|_| Error::Encoding("staged mutation has bad cas".into()))?,
            ),
            Some(None) => return Err(Error::Encoding("staged mutation has bad cas".into())),
        };
        Ok(StagedMutation {
            key,
            kind,
            content: value.get("content").cloned(),
            expected,
        })
    }
}

/// Store-resident record of one transaction attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AtrRecord {
    /// Attempt id, unique per attempt (never reused across retries).
    pub id: TxnId,
    /// Current phase.
    pub phase: AtrPhase,
    /// When the attempt began.
    pub started_at: DateTime<Utc>,
    /// After this instant an abandoned record may be taken over by cleanup.
    pub expires_at: DateTime<Utc>,
    /// Mutations staged so far, one entry per document.
    pub staged: Vec<StagedMutation>,
}

impl AtrRecord {
    /// Fresh `Pending` record for a new attempt.
    pub fn new(id: TxnId, ttl: std::time::Duration) -> Self {
        let started_at = Utc::now();
        let expires_at = started_at + chrono::Duration::milliseconds(ttl.as_millis() as i64);
        AtrRecord {
            id,
            phase: AtrPhase::Pending,
            started_at,
            expires_at,
            staged: Vec::new(),
        }
    }

    /// Whether the record's deadline lies in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Staged mutation targeting `key`, if any.
    pub fn staged_for(&self, key: &DocKey) -> Option<&StagedMutation> {
        self.staged.iter().find(|m| &m.key == key)
    }

    /// Encode as an ordinary document body.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::from(self.id.to_string())),
            ("phase", Value::from(self.phase.as_str())),
            ("started_at", Value::from(self.started_at.to_rfc3339())),
            ("expires_at", Value::from(self.expires_at.to_rfc3339())),
            (
                "staged",
                Value::Array(self.staged.iter().map(StagedMutation::to_value).collect()),
            ),
        ])
    }

    /// Decode a record written by [`AtrRecord::to_value`].
    pub fn from_value(value: &Value) -> Result<AtrRecord> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .and_then(TxnId::parse)
            .ok_or_else(|| Error::Encoding("transaction record missing id".into()))?;
        let phase = value
            .get("phase")
            .and_then(Value::as_str)
            .and_then(AtrPhase::parse)
            .ok_or_else(|| Error::Encoding("transaction record has unknown phase".into()))?;
        let started_at = parse_timestamp(value, "started_at")?;
        let expires_at = parse_timestamp(value, "expires_at")?;
        let staged = value
            .get("staged")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Encoding("transaction record missing staged list".into()))?
            .iter()
            .map(StagedMutation::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(AtrRecord {
            id,
            phase,
            started_at,
            expires_at,
            staged,
        })
    }
}

fn parse_timestamp(value: &Value, field: &str) -> Result<DateTime<Utc>> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| Error::Encoding(format!("transaction record has bad {field}")))
}

/// Store accessor for ATRs and claims.
///
/// Every write goes through the configured durability level; the phase flip
/// to `Staged` is the one write whose durable acknowledgement commits the
/// whole transaction.
#[derive(Clone)]
pub struct AtrStore {
    store: Arc<dyn DocumentStore>,
    durability: DurabilityLevel,
}

impl AtrStore {
    /// Accessor over `store`, writing at `durability`.
    pub fn new(store: Arc<dyn DocumentStore>, durability: DurabilityLevel) -> Self {
        AtrStore { store, durability }
    }

    /// Read an application document through the same store handle. Claims,
    /// records and application documents live side by side.
    pub fn document(&self, key: &DocKey) -> Result<Versioned> {
        self.store.get(key)
    }

    /// Write a brand-new `Pending` record. Returns its revision.
    pub fn create(&self, record: &AtrRecord) -> Result<Cas> {
        self.store
            .insert(&atr_key(record.id), record.to_value(), self.durability)
    }

    /// Rewrite the record (e.g. after staging another mutation), guarded by
    /// its last known revision.
    pub fn write(&self, record: &AtrRecord, expected: Cas) -> Result<Cas> {
        self.store
            .replace(&atr_key(record.id), record.to_value(), expected, self.durability)
    }

    /// Advance the record's phase, enforcing the monotonic transition rules.
    ///
    /// # Errors
    /// `InvalidTransition` if `to` does not directly follow the current
    /// phase; `CasMismatch` if another actor rewrote the record meanwhile.
    pub fn set_phase(&self, record: &mut AtrRecord, expected: Cas, to: AtrPhase) -> Result<Cas> {
        if !record.phase.can_advance_to(to) {
            return Err(Error::InvalidTransition {
                from: record.phase,
                to,
            });
        }
        let from = record.phase;
        record.phase = to;
        match self.write(record, expected) {
            Ok(cas) => Ok(cas),
            Err(e) => {
                record.phase = from;
                Err(e)
            }
        }
    }

    /// Load a record and its current revision.
    pub fn load(&self, id: TxnId) -> Result<(AtrRecord, Cas)> {
        let doc = self.store.get(&atr_key(id))?;
        Ok((AtrRecord::from_value(&doc.content)?, doc.cas))
    }

    /// Delete a finished record. Only `Completed` and `RolledBack` records
    /// may go; anything else reports `InvalidTransition` on the current
    /// phase, since deleting a live record would break recovery.
    pub fn delete(&self, record: &AtrRecord, expected: Cas) -> Result<()> {
        if !record.phase.is_terminal() {
            return Err(Error::InvalidTransition {
                from: record.phase,
                to: record.phase,
            });
        }
        self.store
            .remove(&atr_key(record.id), expected, self.durability)
    }

    /// All records currently in the store, with their revisions. Records
    /// that fail to decode are returned as errors in place so the caller can
    /// log and keep going.
    pub fn scan(&self) -> Result<Vec<Result<(AtrRecord, Cas)>>> {
        let docs = self.store.scan_prefix(ATR_PREFIX)?;
        Ok(docs
            .into_iter()
            .map(|(_, Versioned { content, cas })| {
                AtrRecord::from_value(&content).map(|record| (record, cas))
            })
            .collect())
    }

    /// Claim `doc` for `owner`. Idempotent for the same owner.
    ///
    /// # Errors
    /// `WriteWriteConflict` if another transaction holds the claim.
    pub fn claim(&self, doc: &DocKey, owner: TxnId) -> Result<()> {
        let marker = Value::object([("txn", Value::from(owner.to_string()))]);
        match self.store.insert(&claim_key(doc), marker, self.durability) {
            Ok(_) => Ok(()),
            Err(Error::DocExists(_)) => match self.claim_owner(doc)? {
                Some(holder) if holder == owner => Ok(()),
                _ => Err(Error::WriteWriteConflict(doc.clone())),
            },
            Err(e) => Err(e),
        }
    }

    /// Whether a record exists for `id`.
    pub fn record_exists(&self, id: TxnId) -> Result<bool> {
        match self.store.get(&atr_key(id)) {
            Ok(_) => Ok(true),
            Err(Error::DocNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All claim markers in the store: the claimed document, the owner (if
    /// the marker decodes), and the marker's revision.
    pub fn scan_claims(&self) -> Result<Vec<(DocKey, Option<TxnId>, Cas)>> {
        let docs = self.store.scan_prefix(CLAIM_PREFIX)?;
        Ok(docs
            .into_iter()
            .map(|(key, marker)| {
                let doc = DocKey::new(key.as_str().trim_start_matches(CLAIM_PREFIX));
                let owner = marker
                    .content
                    .get("txn")
                    .and_then(Value::as_str)
                    .and_then(TxnId::parse);
                (doc, owner, marker.cas)
            })
            .collect())
    }

    /// Remove a claim marker regardless of owner, guarded by its revision.
    /// A marker already gone or already rewritten is left alone.
    pub fn remove_claim(&self, doc: &DocKey, cas: Cas) -> Result<()> {
        match self.store.remove(&claim_key(doc), cas, self.durability) {
            Ok(()) | Err(Error::DocNotFound(_)) | Err(Error::CasMismatch { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Who currently claims `doc`, if anyone.
    pub fn claim_owner(&self, doc: &DocKey) -> Result<Option<TxnId>> {
        match self.store.get(&claim_key(doc)) {
            Ok(marker) => marker
                .content
                .get("txn")
                .and_then(Value::as_str)
                .and_then(TxnId::parse)
                .map(Some)
                .ok_or_else(|| Error::Encoding("claim marker has bad owner".into())),
            Err(Error::DocNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release `owner`'s claim on `doc`. A claim already gone, or held by
    /// someone else, is left alone.
    pub fn release(&self, doc: &DocKey, owner: TxnId) -> Result<()> {
        let key = claim_key(doc);
        let marker = match self.store.get(&key) {
            Ok(marker) => marker,
            Err(Error::DocNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let held_by_owner = marker
            .content
            .get("txn")
            .and_then(Value::as_str)
            .and_then(TxnId::parse)
            == Some(owner);
        if !held_by_owner {
            return Ok(());
        }
        match self.store.remove(&key, marker.cas, self.durability) {
            Ok(()) | Err(Error::DocNotFound(_)) | Err(Error::CasMismatch { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Apply one staged mutation to its target document, idempotently.
    pub fn replay(&self, mutation: &StagedMutation) -> Result<Replay> {
        replay_mutation(self.store.as_ref(), self.durability, mutation)
    }
}

/// Outcome of replaying a staged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// The document write was performed now.
    Applied,
    /// The document already reflected the mutation; nothing was written.
    Skipped,
    /// The document moved under a decided commit: its revision no longer
    /// matches the staged baseline and its content is not the staged
    /// content. The protocol was violated by an out-of-band writer.
    Violation,
}

/// Replay a staged mutation against the store.
///
/// Replays are idempotent: a write already applied (by the coordinator, a
/// previous cleanup pass, or a concurrent cleanup racing this one) is
/// detected by the document already carrying the staged content and skipped.
/// Counters are never double-incremented and array entries never duplicated
/// because the staged content is the full post-transaction body, not a delta.
pub fn replay_mutation(
    store: &dyn DocumentStore,
    durability: DurabilityLevel,
    mutation: &StagedMutation,
) -> Result<Replay> {
    match mutation.kind {
        StagedKind::Insert => {
            let content = staged_content(mutation)?;
            match store.insert(&mutation.key, content.clone(), durability) {
                Ok(_) => Ok(Replay::Applied),
                Err(Error::DocExists(_)) => {
                    let current = store.get(&mutation.key)?;
                    if current.content == *content {
                        Ok(Replay::Skipped)
                    } else {
                        Ok(Replay::Violation)
                    }
                }
                Err(e) => Err(e),
            }
        }
        StagedKind::Replace => {
            let content = staged_content(mutation)?;
            let expected = staged_expected(mutation)?;
            let current = match store.get(&mutation.key) {
                Ok(doc) => doc,
                Err(Error::DocNotFound(_)) => return Ok(Replay::Violation),
                Err(e) => return Err(e),
            };
            if current.content == *content {
                return Ok(Replay::Skipped);
            }
            if current.cas != expected {
                return Ok(Replay::Violation);
            }
            match store.replace(&mutation.key, content.clone(), current.cas, durability) {
                Ok(_) => Ok(Replay::Applied),
                // Lost a race against another replayer; re-read and decide.
                Err(Error::CasMismatch { .. }) => match store.get(&mutation.key) {
                    Ok(now) if now.content == *content => Ok(Replay::Skipped),
                    Ok(_) => Ok(Replay::Violation),
                    Err(Error::DocNotFound(_)) => Ok(Replay::Violation),
                    Err(e) => Err(e),
                },
                Err(Error::DocNotFound(_)) => Ok(Replay::Violation),
                Err(e) => Err(e),
            }
        }
        StagedKind::Remove => {
            let expected = staged_expected(mutation)?;
            let current = match store.get(&mutation.key) {
                Ok(doc) => doc,
                Err(Error::DocNotFound(_)) => return Ok(Replay::Skipped),
                Err(e) => return Err(e),
            };
            if current.cas != expected {
                return Ok(Replay::Violation);
            }
            match store.remove(&mutation.key, current.cas, durability) {
                Ok(()) => Ok(Replay::Applied),
                Err(Error::DocNotFound(_)) => Ok(Replay::Skipped),
                Err(Error::CasMismatch { .. }) => Ok(Replay::Violation),
                Err(e) => Err(e),
            }
        }
    }
}

fn staged_content(mutation: &StagedMutation) -> Result<&Value> {
    mutation
        .content
        .as_ref()
        .ok_or_else(|| Error::Encoding(format!("staged {} has no content", mutation.key)))
}

fn staged_expected(mutation: &StagedMutation) -> Result<Cas> {
    mutation
        .expected
        .ok_or_else(|| Error::Encoding(format!("staged {} has no baseline cas", mutation.key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use acidkv_store::MemoryStore;
    use std::time::Duration;

    fn atr_store(store: &Arc<MemoryStore>) -> AtrStore {
        AtrStore::new(
            Arc::clone(store) as Arc<dyn DocumentStore>,
            DurabilityLevel::None,
        )
    }

    fn sample_record() -> AtrRecord {
        let mut record = AtrRecord::new(TxnId::new(), Duration::from_secs(15));
        record.staged.push(StagedMutation {
            key: DocKey::new("conference"),
            kind: StagedKind::Replace,
            content: Some(Value::object([("followups", Value::Int(1))])),
            expected: Some(Cas(7)),
        });
        record.staged.push(StagedMutation {
            key: DocKey::new("draft"),
            kind: StagedKind::Insert,
            content: Some(Value::Null),
            expected: None,
        });
        record.staged.push(StagedMutation {
            key: DocKey::new("old"),
            kind: StagedKind::Remove,
            content: None,
            expected: Some(Cas(3)),
        });
        record
    }

    #[test]
    fn record_roundtrips_through_value() {
        let record = sample_record();
        let decoded = AtrRecord::from_value(&record.to_value()).unwrap();
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.phase, record.phase);
        assert_eq!(decoded.staged, record.staged);
        // rfc3339 keeps sub-second precision
        assert_eq!(decoded.started_at, record.started_at);
        assert_eq!(decoded.expires_at, record.expires_at);
    }

    #[test]
    fn decoding_garbage_is_an_encoding_error() {
        assert!(matches!(
            AtrRecord::from_value(&Value::Int(3)),
            Err(Error::Encoding(_))
        ));
        let bad_phase = Value::object([
            ("id", Value::from(TxnId::new().to_string())),
            ("phase", Value::from("half-done")),
        ]);
        assert!(matches!(
            AtrRecord::from_value(&bad_phase),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn set_phase_walks_the_machine() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let mut record = AtrRecord::new(TxnId::new(), Duration::from_secs(15));
        let mut cas = atrs.create(&record).unwrap();

        for phase in [AtrPhase::Staged, AtrPhase::Committed, AtrPhase::Completed] {
            cas = atrs.set_phase(&mut record, cas, phase).unwrap();
            let (loaded, _) = atrs.load(record.id).unwrap();
            assert_eq!(loaded.phase, phase);
        }
        atrs.delete(&record, cas).unwrap();
        assert!(atrs.load(record.id).is_err());
    }

    #[test]
    fn set_phase_rejects_skips_and_reversals() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let mut record = AtrRecord::new(TxnId::new(), Duration::from_secs(15));
        let cas = atrs.create(&record).unwrap();

        let err = atrs
            .set_phase(&mut record, cas, AtrPhase::Committed)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        // The in-memory phase is untouched after a refused transition.
        assert_eq!(record.phase, AtrPhase::Pending);
    }

    #[test]
    fn delete_refuses_live_records() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let record = AtrRecord::new(TxnId::new(), Duration::from_secs(15));
        let cas = atrs.create(&record).unwrap();
        assert!(matches!(
            atrs.delete(&record, cas),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn claim_is_exclusive_and_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let doc = DocKey::new("conference");
        let first = TxnId::new();
        let second = TxnId::new();

        atrs.claim(&doc, first).unwrap();
        atrs.claim(&doc, first).unwrap(); // same owner, fine
        assert_eq!(
            atrs.claim(&doc, second),
            Err(Error::WriteWriteConflict(doc.clone()))
        );
        assert_eq!(atrs.claim_owner(&doc).unwrap(), Some(first));

        atrs.release(&doc, first).unwrap();
        assert_eq!(atrs.claim_owner(&doc).unwrap(), None);
        atrs.claim(&doc, second).unwrap();
    }

    #[test]
    fn release_by_non_owner_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let doc = DocKey::new("conference");
        let owner = TxnId::new();
        atrs.claim(&doc, owner).unwrap();
        atrs.release(&doc, TxnId::new()).unwrap();
        assert_eq!(atrs.claim_owner(&doc).unwrap(), Some(owner));
    }

    #[test]
    fn replay_replace_applies_then_skips() {
        let store = MemoryStore::new();
        let key = DocKey::new("conference");
        let cas = store
            .insert(
                &key,
                Value::object([("followups", Value::Int(0))]),
                DurabilityLevel::None,
            )
            .unwrap();
        let staged = StagedMutation {
            key: key.clone(),
            kind: StagedKind::Replace,
            content: Some(Value::object([("followups", Value::Int(1))])),
            expected: Some(cas),
        };

        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &staged).unwrap(),
            Replay::Applied
        );
        // Second pass sees the staged content in place and writes nothing.
        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &staged).unwrap(),
            Replay::Skipped
        );
        assert_eq!(
            store.get(&key).unwrap().content.get("followups").unwrap(),
            &Value::Int(1)
        );
    }

    #[test]
    fn replay_detects_out_of_band_writes() {
        let store = MemoryStore::new();
        let key = DocKey::new("conference");
        let cas = store
            .insert(&key, Value::Int(0), DurabilityLevel::None)
            .unwrap();
        let staged = StagedMutation {
            key: key.clone(),
            kind: StagedKind::Replace,
            content: Some(Value::Int(1)),
            expected: Some(cas),
        };
        // Someone bypassed the protocol and rewrote the document.
        store
            .replace(&key, Value::Int(99), cas, DurabilityLevel::None)
            .unwrap();

        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &staged).unwrap(),
            Replay::Violation
        );
        assert_eq!(store.get(&key).unwrap().content, Value::Int(99));
    }

    #[test]
    fn replay_insert_and_remove_are_idempotent() {
        let store = MemoryStore::new();
        let insert = StagedMutation {
            key: DocKey::new("new"),
            kind: StagedKind::Insert,
            content: Some(Value::Int(1)),
            expected: None,
        };
        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &insert).unwrap(),
            Replay::Applied
        );
        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &insert).unwrap(),
            Replay::Skipped
        );

        let cas = store.get(&DocKey::new("new")).unwrap().cas;
        let remove = StagedMutation {
            key: DocKey::new("new"),
            kind: StagedKind::Remove,
            content: None,
            expected: Some(cas),
        };
        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &remove).unwrap(),
            Replay::Applied
        );
        assert_eq!(
            replay_mutation(&store, DurabilityLevel::None, &remove).unwrap(),
            Replay::Skipped
        );
    }

    #[test]
    fn scan_surfaces_undecodable_records_in_place() {
        let store = Arc::new(MemoryStore::new());
        let atrs = atr_store(&store);
        let record = AtrRecord::new(TxnId::new(), Duration::from_secs(15));
        atrs.create(&record).unwrap();
        store
            .insert(
                &DocKey::new(format!("{ATR_PREFIX}junk")),
                Value::Int(42),
                DurabilityLevel::None,
            )
            .unwrap();

        let scanned = atrs.scan().unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
