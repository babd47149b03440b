//! fabq - fab-queue worker daemon and demo CLI
//!
//! Entry point for the `fabq` command-line tool. `serve` runs a worker
//! pool over an in-process store until SIGINT; the web layer in front of
//! the queue embeds the library directly and is not part of this binary.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use fab_queue::runner::{SimulatedRunner, SimulatedScript};
use fab_queue::{
    Dispatcher, JobKind, JobStatus, MemoryStore, QueueConfig, RunnerRegistry, WorkerPool,
};

#[derive(Parser)]
#[command(name = "fabq")]
#[command(about = "Job queue for firmware-build and design-rule-check pipelines", version)]
struct Cli {
    /// Path to config file (TOML); defaults apply when omitted
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker pool until interrupted, printing periodic stats
    Serve {
        /// Enqueue this many sample jobs at startup
        #[arg(long, default_value_t = 0)]
        seed: usize,
    },

    /// Enqueue sample jobs, run them to completion, and print each result
    Demo,

    /// Print the effective configuration as JSON
    Config,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(2);
        }
    };

    let exit_code = match cli.command {
        Commands::Serve { seed } => cmd_serve(config, seed),
        Commands::Demo => cmd_demo(config),
        Commands::Config => cmd_config(config),
    };
    process::exit(exit_code);
}

fn load_config(path: Option<&std::path::Path>) -> Result<QueueConfig, fab_queue::ConfigError> {
    match path {
        Some(path) => QueueConfig::from_file(path),
        None => {
            let config = QueueConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Simulated runners for both pipeline kinds; the real toolchain and DRC
/// invocations live outside this crate.
fn demo_registry() -> Arc<RunnerRegistry> {
    let mut registry = RunnerRegistry::new();
    registry.register(
        JobKind::NativeBuild,
        Arc::new(SimulatedRunner::new(SimulatedScript::Busy(
            Duration::from_millis(500),
        ))),
    );
    registry.register(
        JobKind::DesignRuleCheck,
        Arc::new(SimulatedRunner::new(SimulatedScript::Busy(
            Duration::from_millis(200),
        ))),
    );
    Arc::new(registry)
}

fn cmd_serve(config: QueueConfig, seed: usize) -> i32 {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone(), config);

    for i in 0..seed {
        let kind = if i % 2 == 0 {
            "native-build"
        } else {
            "design-rule-check"
        };
        let owner = format!("seed-{}", i);
        match dispatcher.enqueue(kind, &owner, serde_json::json!({ "seed": i })) {
            Ok(id) => println!("seeded {} job {}", kind, id),
            Err(e) => eprintln!("seed enqueue failed: {}", e),
        }
    }

    let pool = WorkerPool::new(store.clone(), demo_registry(), config);
    let handle = pool.spawn();

    let shutdown = handle.shutdown_flag();
    if let Err(e) = ctrlc::set_handler({
        let shutdown = shutdown.clone();
        move || shutdown.store(true, Ordering::SeqCst)
    }) {
        eprintln!("Failed to install signal handler: {}", e);
        return 1;
    }

    eprintln!(
        "fabq serving with {} workers (budget {}s, stale after {}s); Ctrl-C to stop",
        config.workers, config.max_runtime_seconds, config.stale_after_seconds
    );

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(2));
        match dispatcher.stats() {
            Ok(stats) => eprintln!(
                "queued={} active={} capacity={}",
                stats.queued_count, stats.active_count, stats.worker_capacity
            ),
            Err(e) => eprintln!("stats error: {}", e),
        }
        match dispatcher.list_jobs() {
            Ok(jobs) => {
                for snap in jobs.iter().filter(|s| !s.status.is_terminal()) {
                    match snap.position {
                        Some(p) => eprintln!("  {} {} {} pos={}", snap.job_id, snap.kind, snap.status, p),
                        None => eprintln!("  {} {} {}", snap.job_id, snap.kind, snap.status),
                    }
                }
            }
            Err(e) => eprintln!("queue listing error: {}", e),
        }
        if let Err(e) = store.prune_terminal(config.retention()) {
            eprintln!("prune error: {}", e);
        }
    }

    handle.shutdown();
    eprintln!("fabq stopped");
    0
}

fn cmd_demo(config: QueueConfig) -> i32 {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone(), config);

    let jobs = [
        ("native-build", "student-a"),
        ("design-rule-check", "student-b"),
        ("native-build", "student-c"),
    ];
    let mut ids = Vec::new();
    for (kind, owner) in jobs {
        match dispatcher.enqueue(kind, owner, serde_json::json!({ "demo": true })) {
            Ok(id) => ids.push(id),
            Err(e) => {
                eprintln!("enqueue failed: {}", e);
                return 1;
            }
        }
    }

    let pool = WorkerPool::new(store, demo_registry(), config);
    let handle = pool.spawn();

    let mut failures = 0;
    for id in &ids {
        loop {
            match dispatcher.status(id) {
                Ok(snap) if snap.status.is_terminal() => {
                    match serde_json::to_string_pretty(&snap) {
                        Ok(json) => println!("{}", json),
                        Err(e) => eprintln!("Error serializing output: {}", e),
                    }
                    if snap.status != JobStatus::Complete {
                        failures += 1;
                    }
                    break;
                }
                Ok(_) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    eprintln!("status error: {}", e);
                    return 1;
                }
            }
        }
    }

    handle.shutdown();
    if failures > 0 {
        1
    } else {
        0
    }
}

fn cmd_config(config: QueueConfig) -> i32 {
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            1
        }
    }
}
