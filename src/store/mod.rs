//! Shared queue store abstraction
//!
//! The pending sequence and active set are the only shared mutable
//! structures in the system; every mutation goes through the atomic
//! primitives on [`QueueStore`]. The trait is injected so tests use
//! [`MemoryStore`] and production can back it with any store that offers
//! the same atomicity (the claim must never be observed half-applied).

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::job::{JobRecord, JobResult, JobStatus};

mod memory;

pub use memory::MemoryStore;

/// Errors from queue store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable. Workers stop claiming when they see this.
    #[error("queue store unavailable: {0}")]
    Unavailable(String),

    /// Stored state violates a queue invariant.
    #[error("queue store inconsistent: {0}")]
    Inconsistent(String),
}

/// Aggregate queue counts for dashboards and the introspection endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreCounts {
    /// Jobs in the pending sequence
    pub queued: usize,
    /// Jobs in the active set
    pub active: usize,
}

/// Store reachable by every process in the system.
///
/// Holds per-job records keyed by id, one ordered pending sequence, and
/// one active set. Implementations must make [`claim_next`] and
/// [`cancel_pending`] indivisible with respect to each other and to
/// concurrent claimers.
///
/// [`claim_next`]: QueueStore::claim_next
/// [`cancel_pending`]: QueueStore::cancel_pending
pub trait QueueStore: Send + Sync {
    /// Append a freshly created QUEUED record to the tail of the pending
    /// sequence and persist it. Has no effect on any other job.
    fn append_pending(&self, record: JobRecord) -> Result<(), StoreError>;

    /// Atomically pop the head of the pending sequence, insert it into
    /// the active set, and mark the record ACTIVE with `started_at` set.
    ///
    /// Blocks up to `wait` when the pending sequence is empty, then
    /// returns `Ok(None)`. At most one caller ever receives a given job.
    fn claim_next(&self, wait: Duration) -> Result<Option<JobRecord>, StoreError>;

    /// Atomically remove a job from the pending sequence and mark it
    /// CANCELLED. Returns false without mutating anything if the job is
    /// not currently queued (already claimed, terminal, or unknown).
    fn cancel_pending(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Refresh the liveness heartbeat of an active job. No-op if the job
    /// is not in the active set.
    fn heartbeat(&self, job_id: &str) -> Result<(), StoreError>;

    /// Write a terminal status and result, removing the job from the
    /// active set. This is the only normal exit path from the active set.
    ///
    /// Idempotent: returns false without mutating anything if the job is
    /// not active (already terminal or unknown), so concurrent reapers
    /// and a late-reporting worker cannot double-write.
    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        result: JobResult,
    ) -> Result<bool, StoreError>;

    /// Fetch a snapshot of a job record.
    fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Current pending sequence, head first. Queue position is always the
    /// live 0-based index in this sequence, never cached.
    fn pending_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Snapshots of every record in the active set.
    fn active_jobs(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Snapshots of every record the store currently retains.
    fn all_jobs(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Aggregate pending/active counts.
    fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Live 0-based position of a job in the pending sequence.
    fn position(&self, job_id: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.pending_ids()?.iter().position(|id| id == job_id))
    }
}
