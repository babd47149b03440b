//! Pipeline runner seam
//!
//! The queue core never interprets a job's `spec`; it routes by kind to a
//! [`PipelineRunner`] through a fixed dispatch table and passes the spec
//! through opaquely. Adding a pipeline kind is a registry insert plus the
//! new [`JobKind`] variant; queue invariants do not change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::job::JobKind;

mod simulator;

pub use simulator::{SimulatedRunner, SimulatedScript};

/// Errors a pipeline runner may surface.
///
/// These are expected terminal outcomes for the job, not system errors;
/// the worker converts them into a FAILED result and keeps claiming.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("pipeline spec rejected: {0}")]
    BadSpec(String),

    #[error("pipeline tool error: {0}")]
    Tool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result payload produced by a pipeline runner.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerOutcome {
    /// Whether the build/check passed
    pub success: bool,

    /// Diagnostic text or structured report
    pub report: String,

    /// References to produced artifacts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl RunnerOutcome {
    /// Passing outcome with a report.
    pub fn pass(report: impl Into<String>) -> Self {
        Self {
            success: true,
            report: report.into(),
            artifacts: Vec::new(),
        }
    }

    /// Failing outcome with a report.
    pub fn fail(report: impl Into<String>) -> Self {
        Self {
            success: false,
            report: report.into(),
            artifacts: Vec::new(),
        }
    }
}

/// Execution context handed to a runner by its owning worker.
///
/// Carries the cancellation flag the worker sets when the wall-clock
/// budget expires. Conforming runners poll [`is_cancelled`] at reasonable
/// intervals (between compilation units, between rule groups) and return
/// early when it is set.
///
/// [`is_cancelled`]: RunContext::is_cancelled
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
}

impl RunContext {
    /// Fresh context with the cancellation flag unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the owning worker has given up on this execution.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Set by the worker on budget expiry. Never cleared.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// One pipeline runner per job kind.
///
/// Runners must not mutate shared queue state; they see only the spec and
/// the run context.
pub trait PipelineRunner: Send + Sync {
    /// Execute the pipeline against an opaque job spec.
    fn run(&self, spec: &serde_json::Value, ctx: &RunContext) -> Result<RunnerOutcome, RunnerError>;
}

/// Fixed dispatch table from job kind to runner.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<JobKind, Arc<dyn PipelineRunner>>,
}

impl RunnerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the runner for a kind, replacing any previous one.
    pub fn register(&mut self, kind: JobKind, runner: Arc<dyn PipelineRunner>) -> &mut Self {
        self.runners.insert(kind, runner);
        self
    }

    /// Look up the runner for a kind.
    ///
    /// Unknown kinds cannot reach a worker (enqueue already rejected
    /// them), so a miss here means the registry was wired without a
    /// runner for a known kind.
    pub fn resolve(&self, kind: JobKind) -> Option<Arc<dyn PipelineRunner>> {
        self.runners.get(&kind).cloned()
    }

    /// Kinds this registry can execute.
    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.runners.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRunner(bool);

    impl PipelineRunner for FixedRunner {
        fn run(
            &self,
            _spec: &serde_json::Value,
            _ctx: &RunContext,
        ) -> Result<RunnerOutcome, RunnerError> {
            Ok(if self.0 {
                RunnerOutcome::pass("ok")
            } else {
                RunnerOutcome::fail("nope")
            })
        }
    }

    #[test]
    fn test_registry_resolves_by_kind() {
        let mut registry = RunnerRegistry::new();
        registry.register(JobKind::NativeBuild, Arc::new(FixedRunner(true)));
        registry.register(JobKind::DesignRuleCheck, Arc::new(FixedRunner(false)));

        let ctx = RunContext::new();
        let build = registry.resolve(JobKind::NativeBuild).unwrap();
        assert!(build.run(&serde_json::Value::Null, &ctx).unwrap().success);

        let drc = registry.resolve(JobKind::DesignRuleCheck).unwrap();
        assert!(!drc.run(&serde_json::Value::Null, &ctx).unwrap().success);
    }

    #[test]
    fn test_registry_miss_for_unregistered_kind() {
        let registry = RunnerRegistry::new();
        assert!(registry.resolve(JobKind::NativeBuild).is_none());
    }

    #[test]
    fn test_run_context_cancel_is_sticky() {
        let ctx = RunContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());

        // Clones share the flag
        let clone = ctx.clone();
        assert!(clone.is_cancelled());
    }
}
