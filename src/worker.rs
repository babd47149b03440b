//! Worker pool: claim → execute → report
//!
//! Each worker is an independent thread with no coordinator beyond the
//! store's atomic claim. While a pipeline runs, the worker refreshes the
//! job's heartbeat on the configured cadence; if the wall-clock budget
//! expires first, it sets the run context's cancellation flag and reports
//! TIMED_OUT without waiting for the runner to come back. Pipeline errors
//! and panics become FAILED results and never kill the loop; only a store
//! that reports itself unavailable stops a worker from claiming (fail
//! closed: never claim a job you cannot report back on).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::QueueConfig;
use crate::job::{JobRecord, JobResult, JobStatus};
use crate::runner::{RunContext, RunnerRegistry};
use crate::store::{QueueStore, StoreError};

/// A bounded pool of worker threads over a shared store.
pub struct WorkerPool {
    store: Arc<dyn QueueStore>,
    registry: Arc<RunnerRegistry>,
    config: QueueConfig,
}

/// Handle to a running pool; dropping it without [`shutdown`] detaches
/// the workers.
///
/// [`shutdown`]: WorkerPoolHandle::shutdown
pub struct WorkerPoolHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Flag shared with the worker loops; set it to request shutdown
    /// (e.g. from a signal handler).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown and join every worker. Workers finish the job
    /// they currently own; they just stop claiming new ones.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

impl WorkerPool {
    /// Pool over the given store, dispatch table, and configuration.
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<RunnerRegistry>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Spawn `config.workers` worker threads.
    pub fn spawn(&self) -> WorkerPoolHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let workers = (0..self.config.workers)
            .map(|index| {
                let worker = Worker {
                    store: self.store.clone(),
                    registry: self.registry.clone(),
                    config: self.config,
                    shutdown: shutdown.clone(),
                };
                thread::Builder::new()
                    .name(format!("fabq-worker-{}", index))
                    .spawn(move || worker.run())
                    .expect("failed to spawn worker thread")
            })
            .collect();
        WorkerPoolHandle { shutdown, workers }
    }
}

struct Worker {
    store: Arc<dyn QueueStore>,
    registry: Arc<RunnerRegistry>,
    config: QueueConfig,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let job = match self.store.claim_next(self.config.claim_wait()) {
                Ok(Some(job)) => job,
                // Empty queue: the bounded wait already paced us
                Ok(None) => continue,
                Err(StoreError::Unavailable(reason)) => {
                    eprintln!("worker stopping, store unavailable: {}", reason);
                    return;
                }
                Err(error) => {
                    eprintln!("worker claim error: {}", error);
                    continue;
                }
            };

            match self.execute_and_report(&job) {
                Ok(()) => {}
                Err(StoreError::Unavailable(reason)) => {
                    eprintln!("worker stopping, store unavailable: {}", reason);
                    return;
                }
                Err(error) => eprintln!("worker report error: {}", error),
            }
        }
    }

    /// Run the pipeline under the wall-clock budget and write the terminal
    /// record. Every pipeline-side failure mode ends in a terminal status;
    /// only store errors propagate.
    fn execute_and_report(&self, job: &JobRecord) -> Result<(), StoreError> {
        let (status, result) = self.execute(job)?;
        // False means the reaper reclassified the job first; its terminal
        // record stands.
        self.store.finish(&job.id, status, result)?;
        Ok(())
    }

    fn execute(&self, job: &JobRecord) -> Result<(JobStatus, JobResult), StoreError> {
        let Some(runner) = self.registry.resolve(job.kind) else {
            // Enqueue validated the kind, so this is a wiring gap, not a
            // submitter error. Terminal either way.
            return Ok((
                JobStatus::Failed,
                JobResult::runner_error(format!("no runner registered for {}", job.kind)),
            ));
        };

        let ctx = RunContext::new();
        let (sender, receiver) = mpsc::channel();
        let spawned = {
            let spec = job.spec.clone();
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("fabq-run-{}", job.id))
                .spawn(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(&spec, &ctx)));
                    // Receiver may be gone if the budget already expired
                    let _ = sender.send(outcome);
                })
        };
        if let Err(error) = spawned {
            return Ok((
                JobStatus::Failed,
                JobResult::runner_error(format!("could not start pipeline thread: {}", error)),
            ));
        }

        let deadline = Instant::now() + self.config.budget();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Budget exhausted: tell the runner to stop and report
                // without waiting for it.
                ctx.cancel();
                return Ok((
                    JobStatus::TimedOut,
                    JobResult::timed_out(self.config.max_runtime_seconds),
                ));
            }

            let tick = remaining.min(self.config.heartbeat_cadence());
            match receiver.recv_timeout(tick) {
                Ok(Ok(Ok(outcome))) => {
                    let status = if outcome.success {
                        JobStatus::Complete
                    } else {
                        JobStatus::Failed
                    };
                    return Ok((
                        status,
                        JobResult::from_outcome(outcome.success, outcome.report, outcome.artifacts),
                    ));
                }
                Ok(Ok(Err(error))) => {
                    return Ok((JobStatus::Failed, JobResult::runner_error(error)));
                }
                Ok(Err(panic)) => {
                    return Ok((
                        JobStatus::Failed,
                        JobResult::runner_error(format!(
                            "pipeline panicked: {}",
                            panic_message(&panic)
                        )),
                    ));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.store.heartbeat(&job.id)?;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Ok((
                        JobStatus::Failed,
                        JobResult::runner_error("pipeline thread exited without a result"),
                    ));
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
