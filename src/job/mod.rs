//! Job model and state machine
//!
//! Job states: QUEUED → ACTIVE → {COMPLETE | FAILED | TIMED_OUT}
//! with QUEUED → CANCELLED for pre-claim cancellation.
//!
//! A job is always in exactly one of: the pending sequence (QUEUED), the
//! active set (ACTIVE), or terminal storage. Once terminal it is never
//! re-enqueued or re-claimed under the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason string recorded when the reaper reclassifies a stale job.
///
/// Kept distinct from genuine pipeline failures so submitters can tell a
/// crashed worker apart from a failed build.
pub const HEARTBEAT_LOST_REASON: &str = "worker heartbeat lost";

/// Pipeline kind a job routes to.
///
/// A closed set: enqueue rejects anything else, so the worker's dispatch
/// table never sees an unknown kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Firmware compilation via the native toolchain
    NativeBuild,
    /// Board design-rule check
    DesignRuleCheck,
}

impl JobKind {
    /// All known kinds, in registration order.
    pub const ALL: [JobKind; 2] = [JobKind::NativeBuild, JobKind::DesignRuleCheck];

    /// String form used on the wire and in job records.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::NativeBuild => "native-build",
            JobKind::DesignRuleCheck => "design-rule-check",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native-build" => Ok(JobKind::NativeBuild),
            "design-rule-check" => Ok(JobKind::DesignRuleCheck),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Error for an unrecognized pipeline kind string.
#[derive(Debug, Clone, Error)]
#[error("unknown pipeline kind: {0}")]
pub struct UnknownKind(pub String);

/// Job status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// In the pending sequence, waiting to be claimed
    Queued,
    /// Claimed by a worker and executing
    Active,
    /// Pipeline finished and reported success
    Complete,
    /// Pipeline reported failure, raised an error, or its worker crashed
    Failed,
    /// Wall-clock budget expired before the pipeline returned
    TimedOut,
    /// Removed from the pending sequence before any worker claimed it
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled
        )
    }

    /// Check if transition from this status to target is valid.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        match (self, target) {
            // From QUEUED
            (JobStatus::Queued, JobStatus::Active) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,

            // From ACTIVE; ACTIVE → FAILED also covers stale reclassification
            (JobStatus::Active, JobStatus::Complete) => true,
            (JobStatus::Active, JobStatus::Failed) => true,
            (JobStatus::Active, JobStatus::TimedOut) => true,

            // Terminal statuses cannot transition
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Active => "ACTIVE",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Failed => "FAILED",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Errors from job state transitions
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid transition from {from:?} to {to:?}")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error("job is already in terminal status {0:?}")]
    AlreadyTerminal(JobStatus),
}

/// Terminal result payload written by the worker (or reaper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Whether the pipeline reported success
    pub success: bool,

    /// Diagnostic text or structured report from the pipeline
    pub report: String,

    /// References to produced artifacts, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl JobResult {
    /// Result for a pipeline that ran to completion.
    pub fn from_outcome(success: bool, report: String, artifacts: Vec<String>) -> Self {
        Self {
            success,
            report,
            artifacts,
        }
    }

    /// Result for a pipeline that raised an unexpected error.
    pub fn runner_error(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            report: format!("pipeline error: {}", error),
            artifacts: Vec::new(),
        }
    }

    /// Result for a job whose wall-clock budget expired.
    pub fn timed_out(budget_seconds: u64) -> Self {
        Self {
            success: false,
            report: format!("exceeded runtime budget of {}s", budget_seconds),
            artifacts: Vec::new(),
        }
    }

    /// Result for a job abandoned by a crashed or hung worker.
    pub fn heartbeat_lost() -> Self {
        Self {
            success: false,
            report: HEARTBEAT_LOST_REASON.to_string(),
            artifacts: Vec::new(),
        }
    }

    /// Result for a job cancelled while still queued.
    pub fn cancelled() -> Self {
        Self {
            success: false,
            report: "cancelled by submitter before start".to_string(),
            artifacts: Vec::new(),
        }
    }
}

/// Per-job record held in the queue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier, generated at enqueue time
    pub id: String,

    /// Pipeline kind, fixed at enqueue time
    pub kind: JobKind,

    /// Opaque identifier of the submitting principal
    pub owner_key: String,

    /// Pipeline-specific payload, passed through unexamined
    pub spec: serde_json::Value,

    /// Current status
    pub status: JobStatus,

    /// When the job was enqueued
    pub submitted_at: DateTime<Utc>,

    /// When a worker claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Last worker liveness proof while active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Terminal result; present iff status is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobRecord {
    /// Create a new record in QUEUED status with a fresh id.
    pub fn new(kind: JobKind, owner_key: String, spec: serde_json::Value) -> Self {
        Self {
            id: new_job_id(),
            kind,
            owner_key,
            spec,
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            heartbeat_at: None,
            finished_at: None,
            result: None,
        }
    }

    /// Transition to a new status, enforcing the transition table.
    pub fn transition(&mut self, target: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }
        if !self.status.can_transition_to(target) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Mark the record claimed by a worker (QUEUED → ACTIVE).
    pub fn mark_claimed(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Active)?;
        let now = Utc::now();
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
        Ok(())
    }

    /// Write a terminal status and result.
    pub fn mark_finished(
        &mut self,
        status: JobStatus,
        result: JobResult,
    ) -> Result<(), TransitionError> {
        debug_assert!(status.is_terminal());
        self.transition(status)?;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
        Ok(())
    }

    /// Check if the job is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Generate a fresh process-wide-unique job id.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::new(JobKind::NativeBuild, "student-17".to_string(), json!({}))
    }

    #[test]
    fn test_new_record_is_queued() {
        let job = record();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn test_job_ids_unique() {
        assert_ne!(new_job_id(), new_job_id());
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("fpga-synth".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_valid_lifecycle() {
        let mut job = record();
        job.mark_claimed().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert!(job.started_at.is_some());
        assert!(job.heartbeat_at.is_some());

        job.mark_finished(JobStatus::Complete, JobResult::from_outcome(true, "ok".into(), vec![]))
            .unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_cancel_only_from_queued() {
        let mut job = record();
        assert!(job.transition(JobStatus::Cancelled).is_ok());

        let mut job = record();
        job.mark_claimed().unwrap();
        assert!(matches!(
            job.transition(JobStatus::Cancelled),
            Err(TransitionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_queued_cannot_finish_directly() {
        let mut job = record();
        let err = job.transition(JobStatus::Complete);
        assert!(matches!(err, Err(TransitionError::Invalid { .. })));
    }

    #[test]
    fn test_terminal_rejects_all_transitions() {
        let mut job = record();
        job.mark_claimed().unwrap();
        job.mark_finished(JobStatus::Failed, JobResult::heartbeat_lost())
            .unwrap();

        for target in [JobStatus::Queued, JobStatus::Active, JobStatus::Complete] {
            assert!(matches!(
                job.transition(target),
                Err(TransitionError::AlreadyTerminal(JobStatus::Failed))
            ));
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
        let json = serde_json::to_string(&JobKind::DesignRuleCheck).unwrap();
        assert_eq!(json, "\"design-rule-check\"");
    }

    #[test]
    fn test_record_serialization_omits_unset_fields() {
        let job = record();
        let json = serde_json::to_string(&job).unwrap();
        assert!(!json.contains("started_at"));
        assert!(!json.contains("result"));
        assert!(json.contains("\"status\":\"QUEUED\""));
    }

    #[test]
    fn test_heartbeat_lost_result_reason() {
        let result = JobResult::heartbeat_lost();
        assert!(!result.success);
        assert_eq!(result.report, HEARTBEAT_LOST_REASON);
    }
}
