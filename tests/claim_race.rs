//! Atomic claim tests
//!
//! The core correctness property: across any number of concurrently
//! racing claimers, exactly one ever moves a given job from QUEUED to
//! ACTIVE.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fab_queue::{JobKind, JobRecord, JobStatus, MemoryStore, QueueStore};
use serde_json::json;

const JOBS: usize = 200;
const CLAIMERS: usize = 8;

fn seed(store: &MemoryStore, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let record = JobRecord::new(
                JobKind::NativeBuild,
                format!("owner-{}", i),
                json!({ "n": i }),
            );
            let id = record.id.clone();
            store.append_pending(record).unwrap();
            id
        })
        .collect()
}

#[test]
fn test_each_job_claimed_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed(&store, JOBS);

    let claimers: Vec<_> = (0..CLAIMERS)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next(Duration::ZERO).unwrap() {
                    assert_eq!(job.status, JobStatus::Active);
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for claimer in claimers {
        for id in claimer.join().unwrap() {
            total += 1;
            assert!(seen.insert(id), "job claimed by more than one worker");
        }
    }

    assert_eq!(total, JOBS);
    assert_eq!(seen, ids.into_iter().collect::<HashSet<_>>());
    let counts = store.counts().unwrap();
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.active, JOBS);
}

#[test]
fn test_claims_racing_concurrent_enqueues() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let store = Arc::new(MemoryStore::new());
    let producing = Arc::new(AtomicBool::new(true));

    let producer = {
        let store = store.clone();
        let producing = producing.clone();
        thread::spawn(move || {
            let ids = seed(&store, JOBS);
            producing.store(false, Ordering::SeqCst);
            ids
        })
    };
    let claimers: Vec<_> = (0..CLAIMERS)
        .map(|_| {
            let store = store.clone();
            let producing = producing.clone();
            thread::spawn(move || {
                let mut claimed = Vec::new();
                // Drain until the producer is done and the queue is empty.
                // Once producing is false every append has happened, so an
                // empty immediate claim conclusively means drained.
                loop {
                    match store.claim_next(Duration::from_millis(20)).unwrap() {
                        Some(job) => claimed.push(job.id),
                        None if producing.load(Ordering::SeqCst) => continue,
                        None => match store.claim_next(Duration::ZERO).unwrap() {
                            Some(job) => claimed.push(job.id),
                            None => break,
                        },
                    }
                }
                claimed
            })
        })
        .collect();

    let ids: HashSet<String> = producer.join().unwrap().into_iter().collect();
    let mut seen = HashSet::new();
    for claimer in claimers {
        for id in claimer.join().unwrap() {
            assert!(seen.insert(id), "job claimed by more than one worker");
        }
    }
    assert_eq!(seen, ids);
}

#[test]
fn test_cancel_and_claim_race_resolves_one_way() {
    // A queued job hit simultaneously by a claimer and a canceller must
    // end up exactly one of ACTIVE or CANCELLED, never both effects.
    for _ in 0..50 {
        let store = Arc::new(MemoryStore::new());
        let id = seed(&store, 1).remove(0);

        let claimer = {
            let store = store.clone();
            thread::spawn(move || store.claim_next(Duration::ZERO).unwrap().is_some())
        };
        let canceller = {
            let store = store.clone();
            let id = id.clone();
            thread::spawn(move || store.cancel_pending(&id).unwrap())
        };

        let claimed = claimer.join().unwrap();
        let cancelled = canceller.join().unwrap();
        assert!(
            claimed ^ cancelled,
            "claim and cancel must be mutually exclusive (claimed={}, cancelled={})",
            claimed, cancelled
        );

        let record = store.get(&id).unwrap().unwrap();
        let expected = if claimed {
            JobStatus::Active
        } else {
            JobStatus::Cancelled
        };
        assert_eq!(record.status, expected);
    }
}
