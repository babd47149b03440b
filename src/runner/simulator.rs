//! Scripted stand-in runner
//!
//! Used by the demo binary and tests in place of the real toolchain and
//! design-rule-check invocations. Follows the spec/context contract a real
//! runner must honor, including cooperative cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::{PipelineRunner, RunContext, RunnerError, RunnerOutcome};

/// What a [`SimulatedRunner`] does with each job.
#[derive(Debug, Clone)]
pub enum SimulatedScript {
    /// Return a passing outcome immediately.
    Pass,
    /// Return a failing outcome with the given report.
    Fail(String),
    /// Raise a runner error (exercises the worker's error capture).
    Error(String),
    /// Panic (exercises the worker's panic containment).
    Panic,
    /// Busy-work for the given duration, polling cancellation, then pass.
    Busy(Duration),
}

/// Scripted [`PipelineRunner`] with an invocation counter.
#[derive(Debug)]
pub struct SimulatedRunner {
    script: SimulatedScript,
    invocations: AtomicUsize,
}

impl SimulatedRunner {
    /// Runner following the given script.
    pub fn new(script: SimulatedScript) -> Self {
        Self {
            script,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Runner that passes every job immediately.
    pub fn passing() -> Self {
        Self::new(SimulatedScript::Pass)
    }

    /// How many jobs this runner has been invoked for.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl PipelineRunner for SimulatedRunner {
    fn run(&self, spec: &serde_json::Value, ctx: &RunContext) -> Result<RunnerOutcome, RunnerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            SimulatedScript::Pass => Ok(RunnerOutcome::pass(format!(
                "simulated pass for spec {}",
                spec
            ))),
            SimulatedScript::Fail(report) => Ok(RunnerOutcome::fail(report.clone())),
            SimulatedScript::Error(message) => Err(RunnerError::Tool(message.clone())),
            SimulatedScript::Panic => panic!("simulated runner panic"),
            SimulatedScript::Busy(duration) => {
                let deadline = Instant::now() + *duration;
                while Instant::now() < deadline {
                    if ctx.is_cancelled() {
                        return Ok(RunnerOutcome::fail("cancelled mid-run".to_string()));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(RunnerOutcome::pass("simulated pass after busy work"))
            }
        }
    }
}
