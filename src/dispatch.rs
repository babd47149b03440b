//! Dispatcher / queue API
//!
//! The interface submitters use: enqueue, poll status (with live-computed
//! queue position), cancel, and aggregate counts for dashboards. The
//! surrounding web layer authenticates submitters and hands us an opaque
//! `owner_key`; the queue core performs no authentication of its own.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::QueueConfig;
use crate::job::{JobKind, JobRecord, JobResult, JobStatus};
use crate::reaper::Reaper;
use crate::store::{QueueStore, StoreError};

/// Caller-facing queue errors, surfaced synchronously.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown pipeline type: {0}")]
    UnknownPipelineType(String),

    #[error("no such job: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Removed from the pending sequence and marked CANCELLED
    Cancelled,
    /// Requester does not own the job
    Denied,
    /// Job was already claimed or terminal; nothing was mutated.
    /// In-flight work is never interrupted by a cancel request.
    AlreadyStarted,
}

/// Point-in-time view of one job, as returned to submitters.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,

    /// Live 0-based index in the pending sequence; only while QUEUED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,

    /// Rough wait estimate (position x configured average job duration);
    /// a heuristic for display, not a guarantee
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// Aggregate counts for the operational dashboard.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub queued_count: usize,
    pub active_count: usize,
    pub worker_capacity: usize,
}

/// Submitter-facing queue API over an injected store.
///
/// Safe under arbitrary concurrent callers; nothing here blocks on
/// worker activity.
pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    config: QueueConfig,
    reaper: Reaper,
}

impl Dispatcher {
    /// Dispatcher over the given store and configuration.
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        let reaper = Reaper::new(config.stale_threshold(), config.reap_interval());
        Self {
            store,
            config,
            reaper,
        }
    }

    /// Validate the pipeline kind, create the job record, and append it to
    /// the tail of the pending sequence. No side effect on any other job.
    pub fn enqueue(
        &self,
        kind: &str,
        owner_key: &str,
        spec: serde_json::Value,
    ) -> Result<String, QueueError> {
        let kind: JobKind = kind
            .parse()
            .map_err(|_| QueueError::UnknownPipelineType(kind.to_string()))?;

        // Enqueue also drives passive staleness detection
        self.reaper.check(self.store.as_ref())?;

        let record = JobRecord::new(kind, owner_key.to_string(), spec);
        let id = record.id.clone();
        self.store.append_pending(record)?;
        Ok(id)
    }

    /// Current status snapshot. Never blocks; the only state it mutates is
    /// via the reaper's passive check, so that polling alone is enough to
    /// detect crashed workers.
    pub fn status(&self, job_id: &str) -> Result<StatusSnapshot, QueueError> {
        self.reaper.check(self.store.as_ref())?;

        let record = self
            .store
            .get(job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        let position = if record.status == JobStatus::Queued {
            self.store.position(job_id)?
        } else {
            None
        };
        let estimated_wait_seconds =
            position.map(|p| p as u64 * self.config.avg_job_seconds);

        Ok(StatusSnapshot {
            job_id: record.id,
            kind: record.kind,
            status: record.status,
            position,
            estimated_wait_seconds,
            result: record.result,
        })
    }

    /// Cancel a still-queued job owned by `owner_key`.
    ///
    /// Races with claiming workers are resolved by the store's atomic
    /// removal: if a worker got there first this reports
    /// [`CancelOutcome::AlreadyStarted`] without mutating anything.
    pub fn cancel(&self, job_id: &str, owner_key: &str) -> Result<CancelOutcome, QueueError> {
        let record = self
            .store
            .get(job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if record.owner_key != owner_key {
            return Ok(CancelOutcome::Denied);
        }
        if record.status != JobStatus::Queued {
            return Ok(CancelOutcome::AlreadyStarted);
        }
        if self.store.cancel_pending(job_id)? {
            Ok(CancelOutcome::Cancelled)
        } else {
            Ok(CancelOutcome::AlreadyStarted)
        }
    }

    /// Snapshots of every job the store retains, in submission order,
    /// for the operational dashboard. Queued jobs carry their live
    /// position like [`status`] does.
    ///
    /// [`status`]: Dispatcher::status
    pub fn list_jobs(&self) -> Result<Vec<StatusSnapshot>, QueueError> {
        let pending = self.store.pending_ids()?;
        Ok(self
            .store
            .all_jobs()?
            .into_iter()
            .map(|record| {
                let position = if record.status == JobStatus::Queued {
                    pending.iter().position(|id| *id == record.id)
                } else {
                    None
                };
                let estimated_wait_seconds =
                    position.map(|p| p as u64 * self.config.avg_job_seconds);
                StatusSnapshot {
                    job_id: record.id,
                    kind: record.kind,
                    status: record.status,
                    position,
                    estimated_wait_seconds,
                    result: record.result,
                }
            })
            .collect())
    }

    /// Aggregate counts plus the configured worker capacity.
    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let counts = self.store.counts()?;
        Ok(QueueStats {
            queued_count: counts.queued,
            active_count: counts.active,
            worker_capacity: self.config.workers,
        })
    }

    /// The store this dispatcher operates on.
    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }
}
