//! Per-attempt transaction context
//!
//! An [`AttemptContext`] is handed to the transaction body. It tracks the
//! attempt's read baselines, stages mutations into the attempt's transaction
//! record, claims each written document, and finishes with the two-phase
//! commit or a pure rollback.
//!
//! Nothing a context does before the durable `Staged` phase flip touches any
//! application document. That is the whole trick: rollback never has to undo
//! a document write because none has happened, and a crash before the flip
//! leaves only engine-internal records for cleanup to discard.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use acidkv_core::{
    AtrPhase, Cas, DocKey, DocumentStore, Error, Result, TxnId, Value,
};

use crate::atr::{AtrRecord, AtrStore, Replay, StagedKind, StagedMutation};
use crate::config::TransactionConfig;
use crate::oplog::{LogEntry, OpLog};

/// A document as read inside a transaction body.
///
/// Handed back by [`AttemptContext::get`] and required by `replace`/`remove`
/// so a mutation is always anchored to a read made in this attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    /// Key of the document.
    pub key: DocKey,
    /// Content at read time (or the attempt's own staged content).
    pub content: Value,
    /// Revision baseline for the attempt's optimistic write. Zero for a
    /// document the attempt itself staged as an insert.
    pub cas: Cas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finished {
    Committed,
    RolledBack,
}

/// State of one transaction attempt, owned by the coordinator and lent to
/// the transaction body.
pub struct AttemptContext {
    atrs: AtrStore,
    record: AtrRecord,
    atr_cas: Cas,
    deadline: Instant,
    reads: std::collections::HashMap<DocKey, Cas>,
    log: OpLog,
    finished: Option<Finished>,
}

impl AttemptContext {
    /// Open a fresh attempt: mint an id and durably write its `Pending`
    /// record. `deadline` is the whole transaction's wall-clock limit, shared
    /// by all attempts.
    pub fn begin(
        store: Arc<dyn DocumentStore>,
        config: &TransactionConfig,
        deadline: Instant,
    ) -> Result<AttemptContext> {
        let atrs = AtrStore::new(store, config.durability);
        let ttl = deadline.saturating_duration_since(Instant::now());
        let record = AtrRecord::new(TxnId::new(), ttl);
        let atr_cas = atrs.create(&record)?;
        debug!(txn = %record.id, "attempt started");
        let mut log = OpLog::new();
        log.push(format!("begin attempt {}", record.id));
        Ok(AttemptContext {
            atrs,
            record,
            atr_cas,
            deadline,
            reads: std::collections::HashMap::new(),
            log,
            finished: None,
        })
    }

    /// Id of this attempt.
    pub fn id(&self) -> TxnId {
        self.record.id
    }

    /// The attempt's operation log so far.
    pub fn log(&self) -> &[LogEntry] {
        self.log.entries()
    }

    /// Move the operation log out (used when building a terminal failure).
    pub fn take_log(&mut self) -> Vec<LogEntry> {
        self.log.take()
    }

    fn check_deadline(&self) -> Result<()> {
        if Instant::now() >= self.deadline {
            Err(Error::Expired)
        } else {
            Ok(())
        }
    }

    fn check_active(&self) -> Result<()> {
        match self.finished {
            None => Ok(()),
            Some(_) => Err(Error::Aborted("attempt already finished".into())),
        }
    }

    /// Read a document, recording its revision as this attempt's optimistic
    /// baseline for the key. Reads the attempt's own staged mutations first.
    ///
    /// # Errors
    /// `DocNotFound` if absent (or staged as removed by this attempt),
    /// `WriteWriteConflict` if another in-flight attempt has claimed the
    /// document, `Expired` past the deadline.
    pub fn get(&mut self, key: &DocKey) -> Result<GetResult> {
        self.check_active()?;
        self.check_deadline()?;

        if let Some(staged) = self.record.staged_for(key) {
            return match staged.kind {
                StagedKind::Remove => Err(Error::DocNotFound(key.clone())),
                StagedKind::Insert | StagedKind::Replace => {
                    let content = staged
                        .content
                        .clone()
                        .ok_or_else(|| Error::Encoding(format!("staged {key} has no content")))?;
                    Ok(GetResult {
                        key: key.clone(),
                        content,
                        cas: staged.expected.unwrap_or_default(),
                    })
                }
            };
        }

        if let Some(owner) = self.atrs.claim_owner(key)? {
            if owner != self.record.id {
                self.log.push(format!("get {key}: claimed by {owner}"));
                return Err(Error::WriteWriteConflict(key.clone()));
            }
        }

        let doc = self.atrs.document(key)?;
        self.reads.insert(key.clone(), doc.cas);
        self.log.push(format!("get {key} @ cas {}", doc.cas));
        Ok(GetResult {
            key: key.clone(),
            content: doc.content,
            cas: doc.cas,
        })
    }

    /// Stage the creation of a document that must not exist yet.
    ///
    /// # Errors
    /// `DocExists` if the document is present (or already staged by this
    /// attempt), `WriteWriteConflict` if another attempt claims the key.
    pub fn insert(&mut self, key: &DocKey, content: Value) -> Result<()> {
        self.check_active()?;
        self.check_deadline()?;

        if let Some(staged) = self.record.staged_for(key) {
            return match staged.kind {
                StagedKind::Insert | StagedKind::Replace => Err(Error::DocExists(key.clone())),
                // Remove then insert collapses to a replace guarded by the
                // original baseline: the document never actually went away.
                StagedKind::Remove => {
                    let expected = staged.expected;
                    self.update_staged(key, |m| {
                        m.kind = StagedKind::Replace;
                        m.content = Some(content);
                        m.expected = expected;
                    })
                }
            };
        }

        match self.atrs.document(key) {
            Ok(_) => return Err(Error::DocExists(key.clone())),
            Err(Error::DocNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.stage(StagedMutation {
            key: key.clone(),
            kind: StagedKind::Insert,
            content: Some(content),
            expected: None,
        })?;
        self.log.push(format!("insert {key} staged"));
        Ok(())
    }

    /// Stage a replacement of a document read earlier in this attempt.
    ///
    /// # Errors
    /// `NotRead` if the document was not read via [`AttemptContext::get`]
    /// in this attempt, `WriteWriteConflict` on a foreign claim.
    pub fn replace(&mut self, prior: &GetResult, new_content: Value) -> Result<()> {
        self.check_active()?;
        self.check_deadline()?;
        let key = prior.key.clone();

        if let Some(staged) = self.record.staged_for(&key) {
            return match staged.kind {
                StagedKind::Remove => Err(Error::DocNotFound(key)),
                // A second write in the same attempt just updates the staged
                // content; the kind and baseline stay.
                StagedKind::Insert | StagedKind::Replace => self.update_staged(&key, |m| {
                    m.content = Some(new_content);
                }),
            };
        }

        let expected = *self.reads.get(&key).ok_or(Error::NotRead(key.clone()))?;
        self.stage(StagedMutation {
            key: key.clone(),
            kind: StagedKind::Replace,
            content: Some(new_content),
            expected: Some(expected),
        })?;
        self.log.push(format!("replace {key} staged @ cas {expected}"));
        Ok(())
    }

    /// Stage the removal of a document read earlier in this attempt.
    ///
    /// # Errors
    /// `NotRead` without a prior read, `WriteWriteConflict` on a foreign
    /// claim, `DocNotFound` if this attempt already staged a remove.
    pub fn remove(&mut self, prior: &GetResult) -> Result<()> {
        self.check_active()?;
        self.check_deadline()?;
        let key = prior.key.clone();

        if let Some(staged) = self.record.staged_for(&key) {
            return match staged.kind {
                StagedKind::Remove => Err(Error::DocNotFound(key)),
                // Insert then remove cancels out entirely.
                StagedKind::Insert => self.drop_staged(&key),
                StagedKind::Replace => self.update_staged(&key, |m| {
                    m.kind = StagedKind::Remove;
                    m.content = None;
                }),
            };
        }

        let expected = *self.reads.get(&key).ok_or(Error::NotRead(key.clone()))?;
        self.stage(StagedMutation {
            key: key.clone(),
            kind: StagedKind::Remove,
            content: None,
            expected: Some(expected),
        })?;
        self.log.push(format!("remove {key} staged @ cas {expected}"));
        Ok(())
    }

    /// Claim the document, append the mutation to the record, and durably
    /// rewrite it. On failure the claim taken here is released again.
    fn stage(&mut self, mutation: StagedMutation) -> Result<()> {
        self.atrs.claim(&mutation.key, self.record.id)?;
        let key = mutation.key.clone();
        self.record.staged.push(mutation);
        match self.atrs.write(&self.record, self.atr_cas) {
            Ok(cas) => {
                self.atr_cas = cas;
                Ok(())
            }
            Err(e) => {
                self.record.staged.pop();
                let _ = self.atrs.release(&key, self.record.id);
                Err(e)
            }
        }
    }

    /// Edit an already-staged mutation in place and rewrite the record.
    fn update_staged(&mut self, key: &DocKey, edit: impl FnOnce(&mut StagedMutation)) -> Result<()> {
        let index = self
            .record
            .staged
            .iter()
            .position(|m| &m.key == key)
            .ok_or_else(|| Error::NotRead(key.clone()))?;
        let saved = self.record.staged[index].clone();
        edit(&mut self.record.staged[index]);
        match self.atrs.write(&self.record, self.atr_cas) {
            Ok(cas) => {
                self.atr_cas = cas;
                self.log.push(format!("restage {key}"));
                Ok(())
            }
            Err(e) => {
                self.record.staged[index] = saved;
                Err(e)
            }
        }
    }

    /// Remove a staged mutation (insert cancelled by remove) and its claim.
    fn drop_staged(&mut self, key: &DocKey) -> Result<()> {
        let index = self
            .record
            .staged
            .iter()
            .position(|m| &m.key == key)
            .ok_or_else(|| Error::NotRead(key.clone()))?;
        let saved = self.record.staged.remove(index);
        match self.atrs.write(&self.record, self.atr_cas) {
            Ok(cas) => {
                self.atr_cas = cas;
                self.atrs.release(key, self.record.id)?;
                self.log.push(format!("unstage {key}"));
                Ok(())
            }
            Err(e) => {
                self.record.staged.insert(index, saved);
                Err(e)
            }
        }
    }

    /// Whether the attempt has already committed.
    pub fn is_committed(&self) -> bool {
        self.finished == Some(Finished::Committed)
    }

    /// Commit the attempt.
    ///
    /// Implicitly called by the coordinator on successful body return; a
    /// body may also call it explicitly, and calling it again afterwards is
    /// a no-op. The sequence:
    ///
    /// 1. validate the read set: every staged baseline must still be the
    ///    document's current revision (the claims held since staging prevent
    ///    any further movement);
    /// 2. durably flip the record `Pending → Staged` — the atomicity point;
    /// 3. apply every staged mutation to its document by compare-and-swap
    ///    on the recorded baseline;
    /// 4. `Staged → Committed`, release the claims, `Committed → Completed`,
    ///    delete the record.
    ///
    /// Once step 2 succeeds the commit is decided: failures after it are
    /// logged and left for the cleanup worker to finish — they never surface
    /// as an error, and no deadline check applies past that point.
    ///
    /// # Errors
    /// Before step 2 only: `Expired` past the deadline, `CasMismatch` if a
    /// document moved between this attempt's read and its claim (retried by
    /// the coordinator as a fresh attempt), or the store error from the flip
    /// itself (the attempt is then still undecided).
    pub fn commit(&mut self) -> Result<()> {
        match self.finished {
            Some(Finished::Committed) => return Ok(()),
            Some(Finished::RolledBack) => {
                return Err(Error::Aborted("attempt already rolled back".into()))
            }
            None => {}
        }
        self.check_deadline()?;
        self.validate()?;

        self.atr_cas = self
            .atrs
            .set_phase(&mut self.record, self.atr_cas, AtrPhase::Staged)?;
        self.log.push("commit decided".to_string());
        debug!(txn = %self.record.id, staged = self.record.staged.len(), "commit decided");
        self.finished = Some(Finished::Committed);

        if let Err(e) = self.apply_and_finish() {
            // The decision is durable; an abandoned tail is the cleanup
            // worker's job, not a commit failure.
            error!(txn = %self.record.id, error = %e, "post-commit apply interrupted; cleanup will finish");
            self.log.push(format!("apply interrupted: {e}"));
        }
        Ok(())
    }

    /// Check every staged baseline against the store before the commit
    /// decision. A document that moved between this attempt's read and its
    /// claim fails with `CasMismatch` here, while the attempt is still
    /// undecided and free to retry; once validation passes, the held claims
    /// guarantee nothing moves before the writes are applied. Revision zero
    /// stands in for "absent" on both sides.
    fn validate(&self) -> Result<()> {
        for mutation in &self.record.staged {
            let current = match self.atrs.document(&mutation.key) {
                Ok(doc) => Some(doc.cas),
                Err(Error::DocNotFound(_)) => None,
                Err(e) => return Err(e),
            };
            let expected = mutation.expected;
            if current != expected {
                return Err(Error::CasMismatch {
                    key: mutation.key.clone(),
                    expected: expected.unwrap_or_default(),
                    actual: current.unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    fn apply_and_finish(&mut self) -> Result<()> {
        let mut violation = false;
        for mutation in self.record.staged.clone() {
            match self.atrs.replay(&mutation)? {
                Replay::Applied => self.log.push(format!("applied {}", mutation.key)),
                Replay::Skipped => self.log.push(format!("already applied {}", mutation.key)),
                Replay::Violation => {
                    violation = true;
                    error!(
                        txn = %self.record.id,
                        key = %mutation.key,
                        "document moved under a decided commit"
                    );
                    self.log.push(format!("protocol violation on {}", mutation.key));
                }
            }
        }
        if violation {
            // Leave the record in Staged so the cleanup scan keeps seeing it.
            return Ok(());
        }

        self.atr_cas = self
            .atrs
            .set_phase(&mut self.record, self.atr_cas, AtrPhase::Committed)?;
        for mutation in &self.record.staged {
            self.atrs.release(&mutation.key, self.record.id)?;
        }
        self.atr_cas = self
            .atrs
            .set_phase(&mut self.record, self.atr_cas, AtrPhase::Completed)?;
        self.atrs.delete(&self.record, self.atr_cas)?;
        self.log.push("commit completed".to_string());
        Ok(())
    }

    /// Roll the attempt back: release its claims, flip the record
    /// `Pending → RolledBack`, delete it. No application document is touched
    /// — a rolled-back attempt leaves every document's content and revision
    /// exactly as it found them.
    ///
    /// Idempotent. Store failures during rollback are logged and swallowed;
    /// whatever is left behind is an expired `Pending` record that cleanup
    /// rolls back the same way.
    ///
    /// # Errors
    /// `Aborted` if the attempt already committed.
    pub fn rollback(&mut self) -> Result<()> {
        match self.finished {
            Some(Finished::RolledBack) => return Ok(()),
            Some(Finished::Committed) => {
                return Err(Error::Aborted("attempt already committed".into()))
            }
            None => {}
        }
        self.finished = Some(Finished::RolledBack);
        self.log.push("rollback".to_string());

        for mutation in &self.record.staged {
            if let Err(e) = self.atrs.release(&mutation.key, self.record.id) {
                warn!(txn = %self.record.id, key = %mutation.key, error = %e, "claim release failed during rollback");
            }
        }
        match self
            .atrs
            .set_phase(&mut self.record, self.atr_cas, AtrPhase::RolledBack)
        {
            Ok(cas) => {
                self.atr_cas = cas;
                if let Err(e) = self.atrs.delete(&self.record, self.atr_cas) {
                    warn!(txn = %self.record.id, error = %e, "record delete failed during rollback");
                }
            }
            Err(e) => {
                warn!(txn = %self.record.id, error = %e, "record flip failed during rollback");
            }
        }
        Ok(())
    }
}
