//! Pending-order and cancellation tests
//!
//! FIFO position computation, position shifts on cancel, and the
//! single-worker claim-order scenario.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fab_queue::runner::{PipelineRunner, RunContext, RunnerError, RunnerOutcome};
use fab_queue::{
    CancelOutcome, Dispatcher, JobKind, JobStatus, MemoryStore, QueueConfig, QueueStore,
    RunnerRegistry, WorkerPool,
};
use serde_json::json;

fn test_config(workers: usize) -> QueueConfig {
    QueueConfig {
        workers,
        max_runtime_seconds: 30,
        heartbeat_interval_seconds: 1,
        stale_after_seconds: 30,
        claim_wait_seconds: 1,
        ..Default::default()
    }
}

/// Runner that holds its job until released, so tests control when the
/// single worker frees up.
struct GateRunner {
    release: Arc<AtomicBool>,
}

impl PipelineRunner for GateRunner {
    fn run(&self, _spec: &serde_json::Value, ctx: &RunContext) -> Result<RunnerOutcome, RunnerError> {
        while !self.release.load(Ordering::SeqCst) && !ctx.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(RunnerOutcome::pass("released"))
    }
}

fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(10));
    }
}

// =============================================================================
// FIFO positions
// =============================================================================

#[test]
fn test_positions_follow_submission_order() {
    let d = Dispatcher::new(Arc::new(MemoryStore::new()), test_config(1));

    let ids: Vec<String> = (0..5)
        .map(|i| {
            d.enqueue("native-build", &format!("s{}", i), json!({ "n": i }))
                .unwrap()
        })
        .collect();

    for (expected, id) in ids.iter().enumerate() {
        assert_eq!(d.status(id).unwrap().position, Some(expected));
    }
}

#[test]
fn test_cancel_shifts_later_positions_by_one() {
    let d = Dispatcher::new(Arc::new(MemoryStore::new()), test_config(1));

    let ids: Vec<String> = (0..5)
        .map(|i| {
            d.enqueue("design-rule-check", &format!("s{}", i), json!({}))
                .unwrap()
        })
        .collect();

    // Cancel the job at position 2
    assert_eq!(d.cancel(&ids[2], "s2").unwrap(), CancelOutcome::Cancelled);

    // Earlier jobs keep their positions, later jobs move up exactly one
    assert_eq!(d.status(&ids[0]).unwrap().position, Some(0));
    assert_eq!(d.status(&ids[1]).unwrap().position, Some(1));
    assert_eq!(d.status(&ids[3]).unwrap().position, Some(2));
    assert_eq!(d.status(&ids[4]).unwrap().position, Some(3));
}

#[test]
fn test_position_never_cached_across_claims() {
    let store = Arc::new(MemoryStore::new());
    let d = Dispatcher::new(store.clone(), test_config(1));

    d.enqueue("native-build", "s0", json!({})).unwrap();
    let second = d.enqueue("native-build", "s1", json!({})).unwrap();
    assert_eq!(d.status(&second).unwrap().position, Some(1));

    // A worker claims the head; the second job's live position drops
    store.claim_next(Duration::ZERO).unwrap().unwrap();
    assert_eq!(d.status(&second).unwrap().position, Some(0));
}

// =============================================================================
// Single-worker scenario: J1 active, J2 cancelled, J3 runs next
// =============================================================================

#[test]
fn test_capacity_one_cancel_scenario() {
    let store = Arc::new(MemoryStore::new());
    let config = test_config(1);
    let d = Dispatcher::new(store.clone(), config);

    let release = Arc::new(AtomicBool::new(false));
    let mut registry = RunnerRegistry::new();
    registry.register(
        JobKind::NativeBuild,
        Arc::new(GateRunner {
            release: release.clone(),
        }),
    );

    let j1 = d.enqueue("native-build", "alice", json!({})).unwrap();
    let j2 = d.enqueue("native-build", "bob", json!({})).unwrap();
    let j3 = d.enqueue("native-build", "carol", json!({})).unwrap();

    let pool = WorkerPool::new(store, Arc::new(registry), config);
    let handle = pool.spawn();

    // The lone worker claims J1 and blocks on the gate
    wait_for("J1 to go active", || {
        d.status(&j1).unwrap().status == JobStatus::Active
    });
    assert_eq!(d.status(&j2).unwrap().position, Some(0));
    assert_eq!(d.status(&j3).unwrap().position, Some(1));

    // Cancel J2 while it waits; J3 moves to the head
    assert_eq!(d.cancel(&j2, "bob").unwrap(), CancelOutcome::Cancelled);
    assert_eq!(d.status(&j3).unwrap().position, Some(0));

    // Release the gate: J1 completes, J3 is claimed next and completes
    release.store(true, Ordering::SeqCst);
    wait_for("J1 to complete", || {
        d.status(&j1).unwrap().status == JobStatus::Complete
    });
    wait_for("J3 to complete", || {
        d.status(&j3).unwrap().status == JobStatus::Complete
    });

    // J2 stayed cancelled throughout
    assert_eq!(d.status(&j2).unwrap().status, JobStatus::Cancelled);
    handle.shutdown();
}
