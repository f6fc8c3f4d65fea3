use crate::model::WorkerConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "stat-engine-worker",
    version,
    about = "Engine-side worker that runs analyses for a statistics desktop controller"
)]
pub struct Cli {
    /// Index of this worker among the controller's workers
    #[arg(long, default_value_t = 0)]
    pub worker_index: u32,

    /// Channel name shared by all workers of one controller (default: derived from the parent pid)
    #[arg(long)]
    pub shared_name: Option<String>,

    /// Controller process id; the worker exits when it is gone (default: the parent process)
    #[arg(long)]
    pub parent_pid: Option<u32>,

    /// Root directory for scratch files (default: <temp dir>/<shared name>/<worker index>)
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Directory holding the channel socket (default: the user runtime dir)
    #[arg(long)]
    pub socket_dir: Option<PathBuf>,

    /// How long to wait for a command before checking on the parent
    #[arg(long, default_value = "100ms")]
    pub poll_timeout: humantime::Duration,

    /// Computation engine executable
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Arguments passed to the computation engine
    #[arg(last = true)]
    pub engine_args: Vec<String>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Build a `WorkerConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> WorkerConfig {
    let parent_pid = args
        .parent_pid
        .unwrap_or_else(crate::orchestrator::current_parent_pid);
    let shared_name = args
        .shared_name
        .clone()
        .unwrap_or_else(|| format!("stat-engine-ipc-{parent_pid}"));
    let scratch_dir = args
        .scratch_dir
        .clone()
        .unwrap_or_else(|| {
            std::env::temp_dir()
                .join(&shared_name)
                .join(args.worker_index.to_string())
        });
    let socket_dir = args
        .socket_dir
        .clone()
        .or_else(dirs::runtime_dir)
        .unwrap_or_else(std::env::temp_dir);

    WorkerConfig {
        shared_name,
        worker_index: args.worker_index,
        parent_pid,
        parent_pid_explicit: args.parent_pid.is_some(),
        scratch_dir,
        socket_dir,
        poll_timeout: Duration::from(args.poll_timeout),
        engine_program: args.engine.clone(),
        engine_args: args.engine_args.clone(),
    }
}

pub fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);

    if args.print_config {
        let out = serde_json::to_string_pretty(&cfg).context("failed to encode configuration")?;
        println!("{out}");
        return Ok(());
    }

    crate::orchestrator::run(&cfg)
}
