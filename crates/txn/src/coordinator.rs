//! Transaction coordinator
//!
//! Runs a user-supplied body inside an [`AttemptContext`], retries conflict
//! failures with a fresh attempt, and reports a terminal outcome. The retry
//! loop is bounded by the transaction's wall-clock deadline, never by an
//! attempt count: a conflict-heavy workload keeps retrying until the budget
//! runs out.

use std::error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::debug;

use acidkv_core::{DocumentStore, Error, TxnId};

use crate::config::TransactionConfig;
use crate::context::AttemptContext;
use crate::oplog::LogEntry;

const BACKOFF_BASE: Duration = Duration::from_millis(5);
const BACKOFF_CAP: Duration = Duration::from_millis(100);

/// Why a transaction terminally failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The wall-clock budget ran out (while running, retrying, or before
    /// the commit decision). Nothing staged was applied.
    Expired,
    /// The body raised a non-conflict error; the attempt was rolled back.
    Failed,
}

/// Terminal failure of a transaction, after rollback has completed.
///
/// Carries the last attempt's operation log for diagnostics; no partial
/// document state is visible when this is returned.
#[derive(Debug, Clone)]
pub struct TransactionFailed {
    kind: FailureKind,
    cause: Error,
    attempts: u32,
    log: Vec<LogEntry>,
}

impl TransactionFailed {
    /// Expired or failed.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The error that ended the transaction.
    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// How many attempts ran before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Operation log of the final attempt, oldest entry first.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }
}

impl fmt::Display for TransactionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Expired => {
                write!(f, "transaction expired after {} attempt(s): {}", self.attempts, self.cause)
            }
            FailureKind::Failed => {
                write!(f, "transaction failed after {} attempt(s): {}", self.attempts, self.cause)
            }
        }
    }
}

impl error::Error for TransactionFailed {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Successful transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    /// Id of the attempt that committed.
    pub id: TxnId,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
}

// Counting semaphore for the optional in-flight cap.
struct Limiter {
    max: usize,
    running: Mutex<usize>,
    available: Condvar,
}

impl Limiter {
    fn new(max: usize) -> Self {
        Limiter {
            max: max.max(1),
            running: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) -> Permit<'_> {
        let mut running = self.running.lock();
        while *running >= self.max {
            self.available.wait(&mut running);
        }
        *running += 1;
        Permit { limiter: self }
    }
}

struct Permit<'a> {
    limiter: &'a Limiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut running = self.limiter.running.lock();
        *running -= 1;
        drop(running);
        self.limiter.available.notify_one();
    }
}

/// Entry point for running transactions against a store.
///
/// Construct once with the store and configuration, share behind an `Arc`,
/// call [`Coordinator::run`] from any thread. There is no process-wide
/// state; two coordinators over the same store coexist.
pub struct Coordinator {
    store: Arc<dyn DocumentStore>,
    config: TransactionConfig,
    limiter: Option<Limiter>,
}

impl Coordinator {
    /// Coordinator over `store` with explicit configuration.
    pub fn new(store: Arc<dyn DocumentStore>, config: TransactionConfig) -> Self {
        let limiter = config.max_in_flight.map(Limiter::new);
        Coordinator {
            store,
            config,
            limiter,
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Run `body` as a transaction.
    ///
    /// The body receives a context restricted to `get`/`insert`/`replace`/
    /// `remove` (plus optional explicit `commit`/`rollback`). Returning
    /// `Ok(())` commits; returning any error rolls back. Conflict errors
    /// (`WriteWriteConflict`, `CasMismatch`) never reach the caller: the
    /// coordinator discards the attempt, backs off briefly, and runs the
    /// body again with a fresh attempt, until the deadline elapses.
    pub fn run<F>(&self, mut body: F) -> Result<TransactionResult, TransactionFailed>
    where
        F: FnMut(&mut AttemptContext) -> acidkv_core::Result<()>,
    {
        let deadline = Instant::now() + self.config.timeout;
        let mut attempts = 0u32;
        let mut backoff = BACKOFF_BASE;

        loop {
            attempts += 1;
            let _permit = self.limiter.as_ref().map(Limiter::acquire);

            let mut ctx =
                match AttemptContext::begin(Arc::clone(&self.store), &self.config, deadline) {
                    Ok(ctx) => ctx,
                    Err(cause) => {
                        return Err(TransactionFailed {
                            kind: FailureKind::Failed,
                            cause,
                            attempts,
                            log: Vec::new(),
                        })
                    }
                };

            let outcome = body(&mut ctx).and_then(|()| ctx.commit());
            match outcome {
                Ok(()) => {
                    return Ok(TransactionResult {
                        id: ctx.id(),
                        attempts,
                    })
                }
                Err(cause) => {
                    if !ctx.is_committed() {
                        // Best effort; anything left behind is an expired
                        // Pending record for the cleanup worker.
                        let _ = ctx.rollback();
                    }
                    if cause.is_retriable() {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(TransactionFailed {
                                kind: FailureKind::Expired,
                                cause,
                                attempts,
                                log: ctx.take_log(),
                            });
                        }
                        debug!(txn = %ctx.id(), attempts, error = %cause, "conflict, retrying");
                        std::thread::sleep(jittered(backoff).min(remaining));
                        backoff = (backoff * 2).min(BACKOFF_CAP);
                        continue;
                    }
                    let kind = if matches!(cause, Error::Expired) {
                        FailureKind::Expired
                    } else {
                        FailureKind::Failed
                    };
                    return Err(TransactionFailed {
                        kind,
                        cause,
                        attempts,
                        log: ctx.take_log(),
                    });
                }
            }
        }
    }
}

fn jittered(backoff: Duration) -> Duration {
    let base = backoff.as_millis() as u64;
    let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
    Duration::from_millis(base + jitter)
}
