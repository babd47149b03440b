//! Stale-job reaper
//!
//! A worker proves liveness by refreshing its job's heartbeat while the
//! pipeline runs. When the heartbeat goes silent past the staleness
//! threshold the owning worker is presumed crashed or hung: the job is
//! reclassified to FAILED with a distinct reason and removed from the
//! active set so it cannot block the queue forever. Reaped jobs are not
//! re-enqueued; re-submission is the submitter's call, which keeps a
//! permanently poisonous input from looping.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::job::{JobResult, JobStatus};
use crate::store::{QueueStore, StoreError};

/// Detects and reclassifies jobs abandoned by their worker.
///
/// Safe to run from several places at once: reclassification goes through
/// the store's idempotent `finish`, so a job already finished by its
/// worker (or another reaper) is left alone.
#[derive(Debug)]
pub struct Reaper {
    threshold: Duration,
    check_interval: Duration,
    last_check: Mutex<Option<Instant>>,
}

impl Reaper {
    /// Reaper with the given staleness threshold and passive-check gap.
    pub fn new(threshold: Duration, check_interval: Duration) -> Self {
        Self {
            threshold,
            check_interval,
            last_check: Mutex::new(None),
        }
    }

    /// Sweep the active set, reclassifying every job whose heartbeat age
    /// exceeds the threshold. Returns the ids that were reclassified.
    ///
    /// A record with no heartbeat at all (claim write was the worker's
    /// last act) ages from `started_at` instead.
    pub fn sweep(&self, store: &dyn QueueStore) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        let mut reaped = Vec::new();
        for job in store.active_jobs()? {
            let last_seen = job.heartbeat_at.or(job.started_at);
            let stale = match last_seen {
                Some(t) => {
                    let age = (now - t).to_std().unwrap_or(Duration::ZERO);
                    age > self.threshold
                }
                // Active with neither timestamp: claim never completed
                // its record write, treat as abandoned.
                None => true,
            };
            if stale && store.finish(&job.id, JobStatus::Failed, JobResult::heartbeat_lost())? {
                reaped.push(job.id);
            }
        }
        Ok(reaped)
    }

    /// Interval-gated sweep, driven opportunistically from the queue API
    /// so that polling also advances staleness detection.
    ///
    /// Returns the reclassified ids when a sweep actually ran.
    pub fn check(&self, store: &dyn QueueStore) -> Result<Vec<String>, StoreError> {
        {
            let mut last = self
                .last_check
                .lock()
                .map_err(|_| StoreError::Unavailable("reaper lock poisoned".to_string()))?;
            let due = last.map_or(true, |t| t.elapsed() >= self.check_interval);
            if !due {
                return Ok(Vec::new());
            }
            *last = Some(Instant::now());
        }
        self.sweep(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, JobRecord, HEARTBEAT_LOST_REASON};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn claimed_job(store: &MemoryStore) -> String {
        let record = JobRecord::new(JobKind::NativeBuild, "s1".to_string(), json!({}));
        let id = record.id.clone();
        store.append_pending(record).unwrap();
        store.claim_next(Duration::ZERO).unwrap().unwrap();
        id
    }

    #[test]
    fn test_fresh_heartbeat_survives_sweep() {
        let store = MemoryStore::new();
        claimed_job(&store);

        let reaper = Reaper::new(Duration::from_secs(30), Duration::ZERO);
        assert!(reaper.sweep(&store).unwrap().is_empty());
        assert_eq!(store.counts().unwrap().active, 1);
    }

    #[test]
    fn test_stale_heartbeat_reclassified_as_failed() {
        let store = MemoryStore::new();
        let id = claimed_job(&store);

        // Zero threshold makes any heartbeat stale
        std::thread::sleep(Duration::from_millis(5));
        let reaper = Reaper::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(reaper.sweep(&store).unwrap(), vec![id.clone()]);

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.result.unwrap().report, HEARTBEAT_LOST_REASON);
        assert_eq!(store.counts().unwrap().active, 0);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let id = claimed_job(&store);
        std::thread::sleep(Duration::from_millis(5));

        let reaper = Reaper::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(reaper.sweep(&store).unwrap().len(), 1);
        // Second sweep (or a racing reaper) finds nothing to do
        assert!(reaper.sweep(&store).unwrap().is_empty());

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
    }

    #[test]
    fn test_check_respects_interval_gate() {
        let store = MemoryStore::new();
        claimed_job(&store);
        std::thread::sleep(Duration::from_millis(5));

        let reaper = Reaper::new(Duration::ZERO, Duration::from_secs(3600));
        // First check runs the sweep
        assert_eq!(reaper.check(&store).unwrap().len(), 1);

        claimed_job(&store);
        std::thread::sleep(Duration::from_millis(5));
        // Second check is inside the gate window
        assert!(reaper.check(&store).unwrap().is_empty());
        assert_eq!(store.counts().unwrap().active, 1);
    }
}
