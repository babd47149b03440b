//! fab-queue - job queue and worker coordination
//!
//! Routes firmware-build and board design-rule-check jobs from many
//! concurrent submitters through a bounded pool of workers, with live
//! queue-position feedback, pre-claim cancellation, and heartbeat-based
//! detection of crashed workers.

pub mod config;
pub mod dispatch;
pub mod job;
pub mod reaper;
pub mod runner;
pub mod store;
pub mod worker;

pub use config::{ConfigError, QueueConfig};
pub use dispatch::{CancelOutcome, Dispatcher, QueueError, QueueStats, StatusSnapshot};
pub use job::{JobKind, JobRecord, JobResult, JobStatus};
pub use reaper::Reaper;
pub use runner::{PipelineRunner, RunContext, RunnerOutcome, RunnerRegistry};
pub use store::{MemoryStore, QueueStore, StoreError};
pub use worker::{WorkerPool, WorkerPoolHandle};
