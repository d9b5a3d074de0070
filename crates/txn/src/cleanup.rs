//! Cleanup and crash recovery
//!
//! A coordinator can die at any point. Whatever it leaves behind is visible
//! in the store: an expired transaction record plus claim markers. The
//! cleanup worker periodically scans the record prefix and finishes the job:
//!
//! - an expired `Pending` record is rolled back — the commit was never
//!   decided, and no application document was touched;
//! - an expired `Staged` or `Committed` record is driven forward — its
//!   staged mutations are replayed idempotently and the record completed;
//! - terminal leftovers (`Completed`/`RolledBack` records whose owner died
//!   before deleting them) are swept away.
//!
//! The worker tolerates running next to live coordinators: every phase flip
//! is revision-guarded, so losing a race simply skips the record until the
//! next pass, and replays detect already-applied writes by content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use acidkv_core::{AtrPhase, Cas, DocumentStore, DurabilityLevel, Error, Result};

use crate::atr::{AtrRecord, AtrStore, Replay};

/// Counters for one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Records seen by the scan.
    pub scanned: usize,
    /// Records left alone: not yet expired, or owned by a live coordinator
    /// that won the revision race.
    pub live: usize,
    /// Expired `Pending` records rolled back.
    pub rolled_back: usize,
    /// Expired `Staged`/`Committed` records driven to completion, plus
    /// terminal leftovers swept.
    pub completed: usize,
    /// Records that failed to decode.
    pub undecodable: usize,
    /// Records whose recovery hit a store error; retried next pass.
    pub failed: usize,
    /// Claim markers removed because their transaction record is gone
    /// (owner died between claiming and recording the staged write).
    pub orphaned_claims: usize,
}

enum Recovered {
    RolledBack,
    Completed,
    Skipped,
}

/// Background recovery worker.
///
/// `run_once` does a single synchronous pass; `start` spawns a thread that
/// passes every `interval` until [`CleanupWorker::shutdown`] is called.
pub struct CleanupWorker {
    atrs: AtrStore,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl CleanupWorker {
    /// Worker over `store`, writing at `durability`, scanning every
    /// `interval` when running in the background.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        durability: DurabilityLevel,
        interval: Duration,
    ) -> Self {
        CleanupWorker {
            atrs: AtrStore::new(store, durability),
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One synchronous pass over every transaction record.
    ///
    /// Per-record recovery errors are logged and counted, never propagated:
    /// one stuck transaction must not halt recovery of the others. Only a
    /// failure of the scan itself is returned.
    pub fn run_once(&self) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();
        let now = Utc::now();

        for entry in self.atrs.scan()? {
            stats.scanned += 1;
            let (mut record, cas) = match entry {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, "undecodable transaction record, skipping");
                    stats.undecodable += 1;
                    continue;
                }
            };
            if !record.phase.is_terminal() && !record.is_expired(now) {
                stats.live += 1;
                continue;
            }
            match self.recover(&mut record, cas) {
                Ok(Recovered::RolledBack) => stats.rolled_back += 1,
                Ok(Recovered::Completed) => stats.completed += 1,
                Ok(Recovered::Skipped) => stats.live += 1,
                Err(e) => {
                    warn!(txn = %record.id, error = %e, "recovery failed, will retry next pass");
                    stats.failed += 1;
                }
            }
        }
        // Claims are only ever taken while the owner's record exists and
        // released before it is deleted, so a claim without a record is an
        // orphan: the owner died between the claim insert and the record
        // rewrite that would have listed it.
        for (doc, owner, cas) in self.atrs.scan_claims()? {
            let orphaned = match owner {
                Some(owner) => !self.atrs.record_exists(owner)?,
                None => true,
            };
            if orphaned {
                warn!(key = %doc, "orphaned claim marker, removing");
                self.atrs.remove_claim(&doc, cas)?;
                stats.orphaned_claims += 1;
            }
        }

        if stats.scanned > 0 || stats.orphaned_claims > 0 {
            debug!(?stats, "cleanup pass done");
        }
        Ok(stats)
    }

    fn recover(&self, record: &mut AtrRecord, cas: Cas) -> Result<Recovered> {
        match record.phase {
            AtrPhase::Pending => {
                // Take ownership of the abandoned attempt by flipping the
                // record first; a live owner rewriting it wins the race.
                let cas = match self.atrs.set_phase(record, cas, AtrPhase::RolledBack) {
                    Ok(cas) => cas,
                    Err(Error::CasMismatch { .. }) => return Ok(Recovered::Skipped),
                    Err(e) => return Err(e),
                };
                self.release_claims(record)?;
                self.atrs.delete(record, cas)?;
                debug!(txn = %record.id, "expired pending attempt rolled back");
                Ok(Recovered::RolledBack)
            }
            AtrPhase::Staged | AtrPhase::Committed => {
                let mut cas = cas;
                if record.phase == AtrPhase::Staged {
                    cas = match self.atrs.set_phase(record, cas, AtrPhase::Committed) {
                        Ok(cas) => cas,
                        Err(Error::CasMismatch { .. }) => return Ok(Recovered::Skipped),
                        Err(e) => return Err(e),
                    };
                }
                for mutation in &record.staged {
                    match self.atrs.replay(mutation)? {
                        Replay::Applied | Replay::Skipped => {}
                        Replay::Violation => {
                            warn!(
                                txn = %record.id,
                                key = %mutation.key,
                                "document moved under a decided commit, leaving as is"
                            );
                        }
                    }
                }
                self.release_claims(record)?;
                cas = match self.atrs.set_phase(record, cas, AtrPhase::Completed) {
                    Ok(cas) => cas,
                    Err(Error::CasMismatch { .. }) => return Ok(Recovered::Skipped),
                    Err(e) => return Err(e),
                };
                self.atrs.delete(record, cas)?;
                debug!(txn = %record.id, "abandoned commit driven to completion");
                Ok(Recovered::Completed)
            }
            AtrPhase::Completed | AtrPhase::RolledBack => {
                // Owner died between finishing and deleting the record.
                self.release_claims(record)?;
                match self.atrs.delete(record, cas) {
                    Ok(()) | Err(Error::DocNotFound(_)) | Err(Error::CasMismatch { .. }) => {}
                    Err(e) => return Err(e),
                }
                if record.phase == AtrPhase::RolledBack {
                    Ok(Recovered::RolledBack)
                } else {
                    Ok(Recovered::Completed)
                }
            }
        }
    }

    fn release_claims(&self, record: &AtrRecord) -> Result<()> {
        for mutation in &record.staged {
            self.atrs.release(&mutation.key, record.id)?;
        }
        Ok(())
    }

    /// Spawn the background thread. Runs until [`CleanupWorker::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let atrs = self.atrs.clone();
        let interval = self.interval;
        let shutdown = Arc::clone(&self.shutdown);

        thread::spawn(move || {
            let worker = CleanupWorker {
                atrs,
                interval,
                shutdown: Arc::clone(&shutdown),
            };
            while !shutdown.load(Ordering::Relaxed) {
                // Sleep in small slices so shutdown stays responsive.
                let slice = Duration::from_millis(50).min(interval);
                let mut slept = Duration::ZERO;
                while slept < interval {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(slice);
                    slept += slice;
                }
                if let Err(e) = worker.run_once() {
                    warn!(error = %e, "cleanup scan failed");
                }
            }
        })
    }

    /// Signal the background thread to exit on its next check.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
