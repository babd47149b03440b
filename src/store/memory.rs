//! In-process queue store
//!
//! Single mutex over the pending sequence, active set, and record map, so
//! every primitive is trivially atomic. A condvar wakes blocked claimers
//! when a job is appended. Suitable for a single-process deployment and
//! for tests; multi-process deployments substitute a store with the same
//! guarantees behind the [`QueueStore`] trait.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::job::{JobRecord, JobResult, JobStatus};

use super::{QueueStore, StoreCounts, StoreError};

#[derive(Debug, Default)]
struct Inner {
    /// Ordered pending job ids, head first (FIFO)
    pending: VecDeque<String>,
    /// Ids currently owned by a worker
    active: HashSet<String>,
    /// Full records keyed by job id
    records: HashMap<String, JobRecord>,
}

/// In-memory [`QueueStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Signalled when the pending sequence grows
    pending_grew: Condvar,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Drop terminal records whose `finished_at` is older than `retention`.
    ///
    /// Returns the number of records removed. Pending and active records
    /// are never touched. Retention policy lives outside the queue core,
    /// so this is not part of the [`QueueStore`] trait.
    pub fn prune_terminal(&self, retention: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention)
                .map_err(|e| StoreError::Inconsistent(format!("bad retention window: {}", e)))?;
        let mut inner = self.lock()?;
        let before = inner.records.len();
        inner.records.retain(|_, record| {
            !record.is_terminal() || record.finished_at.map_or(true, |t| t >= cutoff)
        });
        Ok(before - inner.records.len())
    }
}

impl QueueStore for MemoryStore {
    fn append_pending(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.records.contains_key(&record.id) {
            return Err(StoreError::Inconsistent(format!(
                "job id collision on {}",
                record.id
            )));
        }
        let id = record.id.clone();
        inner.records.insert(id.clone(), record);
        inner.pending.push_back(id);
        drop(inner);
        self.pending_grew.notify_one();
        Ok(())
    }

    fn claim_next(&self, wait: Duration) -> Result<Option<JobRecord>, StoreError> {
        let deadline = Instant::now() + wait;
        let mut inner = self.lock()?;
        loop {
            if let Some(id) = inner.pending.pop_front() {
                inner.active.insert(id.clone());
                let record = inner.records.get_mut(&id).ok_or_else(|| {
                    StoreError::Inconsistent(format!("pending id {} has no record", id))
                })?;
                record
                    .mark_claimed()
                    .map_err(|e| StoreError::Inconsistent(format!("claim of {}: {}", id, e)))?;
                return Ok(Some(record.clone()));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let (guard, timeout) = self
                .pending_grew
                .wait_timeout(inner, remaining)
                .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
            inner = guard;
            if timeout.timed_out() && inner.pending.is_empty() {
                return Ok(None);
            }
        }
    }

    fn cancel_pending(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let Some(pos) = inner.pending.iter().position(|id| id == job_id) else {
            return Ok(false);
        };
        inner.pending.remove(pos);
        let record = inner.records.get_mut(job_id).ok_or_else(|| {
            StoreError::Inconsistent(format!("pending id {} has no record", job_id))
        })?;
        record
            .transition(JobStatus::Cancelled)
            .map_err(|e| StoreError::Inconsistent(format!("cancel of {}: {}", job_id, e)))?;
        record.finished_at = Some(Utc::now());
        record.result = Some(JobResult::cancelled());
        Ok(true)
    }

    fn heartbeat(&self, job_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.active.contains(job_id) {
            return Ok(());
        }
        if let Some(record) = inner.records.get_mut(job_id) {
            record.heartbeat_at = Some(Utc::now());
        }
        Ok(())
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        result: JobResult,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if !inner.active.remove(job_id) {
            return Ok(false);
        }
        let record = inner.records.get_mut(job_id).ok_or_else(|| {
            StoreError::Inconsistent(format!("active id {} has no record", job_id))
        })?;
        record
            .mark_finished(status, result)
            .map_err(|e| StoreError::Inconsistent(format!("finish of {}: {}", job_id, e)))?;
        Ok(true)
    }

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock()?.records.get(job_id).cloned())
    }

    fn pending_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.pending.iter().cloned().collect())
    }

    fn active_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .active
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect())
    }

    fn all_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.lock()?;
        let mut jobs: Vec<JobRecord> = inner.records.values().cloned().collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(jobs)
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        let inner = self.lock()?;
        Ok(StoreCounts {
            queued: inner.pending.len(),
            active: inner.active.len(),
        })
    }
}
