//! End-to-end transaction scenarios against the in-memory store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use acidkv::{
    CleanupWorker, Coordinator, CrashStore, DocKey, DocumentStore, DurabilityLevel, Error,
    FailureKind, MemoryStore, TransactionConfig, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(timeout: Duration) -> TransactionConfig {
    TransactionConfig::new()
        .with_durability(DurabilityLevel::None)
        .with_timeout(timeout)
}

/// Seed the conference/interactions pair used throughout.
fn seed(store: &MemoryStore) {
    store
        .insert(
            &DocKey::new("conference"),
            Value::object([
                ("name", Value::from("devconf")),
                ("followups", Value::Int(0)),
                ("lastInteraction", Value::Null),
            ]),
            DurabilityLevel::None,
        )
        .unwrap();
    store
        .insert(
            &DocKey::new("interactions"),
            Value::object([("events", Value::Array(vec![]))]),
            DurabilityLevel::None,
        )
        .unwrap();
}

/// Read both documents, bump the follow-up counter, record the interaction.
fn record_interaction(ctx: &mut acidkv::AttemptContext) -> acidkv::Result<()> {
    let conference = ctx.get(&DocKey::new("conference"))?;
    let interactions = ctx.get(&DocKey::new("interactions"))?;

    let followups = conference
        .content
        .get("followups")
        .and_then(Value::as_int)
        .unwrap_or(0);
    let mut updated = conference.content.clone();
    updated.set("followups", Value::Int(followups + 1));
    updated.set("lastInteraction", Value::from("2024-06-01T10:00:00Z"));
    ctx.replace(&conference, updated)?;

    let mut updated = interactions.content.clone();
    updated
        .as_object_mut()
        .unwrap()
        .get_mut("events")
        .unwrap()
        .as_array_mut()
        .unwrap()
        .push(Value::object([
            ("type", Value::from("email")),
            ("note", Value::from("follow-up sent")),
        ]));
    ctx.replace(&interactions, updated)
}

fn followups(store: &MemoryStore) -> i64 {
    store
        .get(&DocKey::new("conference"))
        .unwrap()
        .content
        .get("followups")
        .and_then(Value::as_int)
        .unwrap()
}

fn event_count(store: &MemoryStore) -> usize {
    store
        .get(&DocKey::new("interactions"))
        .unwrap()
        .content
        .get("events")
        .and_then(Value::as_array)
        .unwrap()
        .len()
}

#[test]
fn committed_transaction_updates_both_documents() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let coordinator = Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(Duration::from_secs(5)),
    );

    let result = coordinator.run(record_interaction).unwrap();
    assert_eq!(result.attempts, 1);
    assert_eq!(followups(&store), 1);
    assert_eq!(event_count(&store), 1);
    assert_eq!(
        store
            .get(&DocKey::new("conference"))
            .unwrap()
            .content
            .get("lastInteraction"),
        Some(&Value::from("2024-06-01T10:00:00Z"))
    );
    // No engine records linger after commit.
    assert_eq!(store.len(), 2);
}

#[test]
fn explicit_commit_behaves_like_implicit() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let coordinator = Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(Duration::from_secs(5)),
    );

    coordinator
        .run(|ctx| {
            record_interaction(ctx)?;
            ctx.commit()
        })
        .unwrap();
    assert_eq!(followups(&store), 1);
    assert_eq!(event_count(&store), 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn forced_rollback_leaves_documents_pristine() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let before_conference = store.get(&DocKey::new("conference")).unwrap();
    let before_interactions = store.get(&DocKey::new("interactions")).unwrap();

    let coordinator = Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(Duration::from_secs(5)),
    );
    let failure = coordinator
        .run(|ctx| {
            record_interaction(ctx)?;
            Err(Error::Aborted("forcing a rollback".into()))
        })
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Failed);
    assert!(matches!(failure.cause(), Error::Aborted(_)));
    for entry in failure.log() {
        println!("{entry}");
    }
    assert!(!failure.log().is_empty());

    // Content and revision both untouched.
    assert_eq!(store.get(&DocKey::new("conference")).unwrap(), before_conference);
    assert_eq!(
        store.get(&DocKey::new("interactions")).unwrap(),
        before_interactions
    );
    assert_eq!(store.len(), 2);
}

#[test]
fn concurrent_transactions_are_isolated() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(Duration::from_secs(10)),
    ));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || coordinator.run(record_interaction).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Both increments landed and neither document saw a partial update.
    assert_eq!(followups(&store), 2);
    assert_eq!(event_count(&store), 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn expiry_is_bounded_by_wall_clock() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    // A claim held by a transaction that never finishes: every attempt
    // conflicts until the budget runs out.
    store
        .insert(
            &DocKey::new("_txn::claim::conference"),
            Value::object([(
                "txn",
                Value::from(acidkv::TxnId::new().to_string()),
            )]),
            DurabilityLevel::None,
        )
        .unwrap();

    let timeout = Duration::from_millis(300);
    let coordinator = Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(timeout),
    );
    let started = Instant::now();
    let failure = coordinator.run(record_interaction).unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Expired);
    assert!(failure.attempts() > 1, "terminated by deadline, not by count");
    assert!(started.elapsed() >= timeout);
    assert_eq!(followups(&store), 0);
    assert_eq!(event_count(&store), 0);
}

#[test]
fn sleeping_body_expires_without_mutating() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let coordinator = Coordinator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        config(Duration::from_millis(100)),
    );

    let failure = coordinator
        .run(|ctx| {
            let conference = ctx.get(&DocKey::new("conference"))?;
            std::thread::sleep(Duration::from_millis(250));
            ctx.replace(&conference, Value::Null)
        })
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Expired);
    assert_eq!(followups(&store), 0);
}

/// Crash the coordinator at every write offset and confirm that cleanup
/// always converges to one of the two atomic outcomes: nothing applied, or
/// everything applied.
#[test]
fn crash_sweep_converges_to_an_atomic_state() {
    init_tracing();
    // 13 store writes make up a full two-document transaction; sweep past
    // the end to include the no-fault run.
    for budget in 0..=16 {
        let inner = Arc::new(MemoryStore::new());
        seed(&inner);
        let crashing = Arc::new(CrashStore::new(
            Arc::clone(&inner) as Arc<dyn DocumentStore>,
            budget,
        ));

        let coordinator = Coordinator::new(
            Arc::clone(&crashing) as Arc<dyn DocumentStore>,
            config(Duration::from_millis(100)),
        );
        let _ = coordinator.run(record_interaction);

        // Let the abandoned record expire, then recover against a healthy
        // store, twice — the second pass must change nothing.
        std::thread::sleep(Duration::from_millis(150));
        let worker = CleanupWorker::new(
            Arc::clone(&inner) as Arc<dyn DocumentStore>,
            DurabilityLevel::None,
            Duration::from_millis(50),
        );
        worker.run_once().unwrap();
        let after_once = snapshot(&inner);
        worker.run_once().unwrap();
        assert_eq!(after_once, snapshot(&inner), "budget {budget}: second sweep changed state");

        let followups = followups(&inner);
        let events = event_count(&inner) as i64;
        assert_eq!(
            followups, events,
            "budget {budget}: partial application ({followups} followups, {events} events)"
        );
        assert!(
            followups == 0 || followups == 1,
            "budget {budget}: unexpected counter {followups}"
        );
        assert_eq!(inner.len(), 2, "budget {budget}: engine records left behind");
    }
}

fn snapshot(store: &MemoryStore) -> Vec<(DocKey, Value)> {
    store
        .scan_prefix("")
        .unwrap()
        .into_iter()
        .map(|(key, doc)| (key, doc.content))
        .collect()
}
