//! Worker lifecycle loop.
//!
//! Owns startup, the poll/drive cycle and shutdown. The loop is single-threaded: commands
//! that arrive while a computation runs are picked up at the engine's progress callbacks.

use crate::channel::{Channel, ChannelName};
use crate::engine::{ComputationHook, CycleOutcome, Engine, ProcessHook};
use crate::model::WorkerConfig;
use crate::orchestrator::liveness::ParentProcess;
use crate::tempfiles::TempFiles;
use anyhow::{Context, Result};
use std::time::Duration;

/// Poll for a command, stop if the parent is gone, otherwise drive one cycle.
pub(crate) fn run_worker<C, H>(
    engine: &mut Engine<C, H>,
    poll_timeout: Duration,
    mut parent_alive: impl FnMut() -> bool,
) where
    C: Channel,
    H: ComputationHook,
{
    loop {
        engine.receive_messages(poll_timeout);
        if !parent_alive() {
            let state = engine.state();
            tracing::info!(
                analysis_id = state.id,
                status = ?state.status,
                "parent process exited, shutting down"
            );
            break;
        }
        let outcome = engine.run_analysis();
        if outcome != CycleOutcome::Idle {
            tracing::debug!(?outcome, "drive cycle finished");
        }
    }
}

/// Open the worker's channel, run until the parent exits, then release the channel.
pub(crate) fn run(cfg: &WorkerConfig) -> Result<()> {
    let program = cfg
        .engine_program
        .clone()
        .context("no computation engine configured (use --engine)")?;
    let hook = ProcessHook::new(program, cfg.engine_args.clone());
    let temp_files = TempFiles::new(&cfg.scratch_dir);
    let name = ChannelName {
        shared: cfg.shared_name.clone(),
        index: cfg.worker_index,
    };
    let parent = ParentProcess::new(cfg.parent_pid, cfg.parent_pid_explicit);

    #[cfg(unix)]
    {
        let channel = crate::channel::SocketChannel::bind(&cfg.socket_dir, &name)
            .with_context(|| format!("failed to open channel {name}"))?;
        tracing::info!(
            channel = %name,
            socket = %channel.path().display(),
            scratch = %temp_files.root().display(),
            parent_pid = cfg.parent_pid,
            "worker started"
        );
        let mut engine = Engine::new(channel, temp_files, hook);
        run_worker(&mut engine, cfg.poll_timeout, || parent.is_alive());
        // Dropping the engine removes the channel socket.
        drop(engine);
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = (hook, temp_files, parent);
        anyhow::bail!("channel {name}: local socket transport requires a unix platform")
    }
}
