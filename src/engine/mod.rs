mod hook;
mod process;

pub use hook::{ComputationHook, ScratchSource};
#[cfg(test)]
pub(crate) use hook::{HookError, Progress};
pub use process::ProcessHook;

use crate::channel::{Channel, ChannelError};
use crate::model::{AnalysisRequest, EngineStatus, Invocation, Perform, ProgressControl};
use crate::protocol;
use crate::tempfiles::TempFiles;
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the worker knows about the one analysis it is responsible for.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    pub id: i64,
    pub status: EngineStatus,
    pub name: String,
    pub options: String,
    pub ppi: i64,
    /// Last results seen from the engine, interim or final.
    pub results: Value,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            id: -1,
            status: EngineStatus::Empty,
            name: String::new(),
            options: "null".into(),
            ppi: crate::model::DEFAULT_PPI,
            results: Value::Null,
        }
    }
}

impl AnalysisState {
    /// Fold one controller command into the state.
    pub fn apply(&mut self, req: AnalysisRequest) {
        if req.id == self.id && self.status == EngineStatus::Running {
            self.status = match req.perform {
                Perform::Init => EngineStatus::Changed,
                Perform::Stop => EngineStatus::Stopped,
                _ => EngineStatus::Aborted,
            };
        } else {
            // A different analysis (or an idle worker): whatever ran before is abandoned.
            self.id = req.id;
            self.status = match req.perform {
                Perform::Init => EngineStatus::ToInit,
                Perform::Run => EngineStatus::ToRun,
                _ => EngineStatus::Error,
            };
        }

        if matches!(
            self.status,
            EngineStatus::ToInit | EngineStatus::ToRun | EngineStatus::Changed
        ) {
            self.name = req.name;
            self.options = req.options;
            self.ppi = req.ppi;
        }

        tracing::info!(
            analysis_id = self.id,
            perform = req.perform.as_str(),
            status = ?self.status,
            "request received"
        );
    }
}

/// What one drive cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to compute.
    Idle,
    /// A newer command superseded the computation; nothing was sent.
    Suppressed,
    /// The engine could not absorb changed options; the analysis starts over next cycle.
    Restart,
    /// A final result was sent with this lifecycle status.
    Completed(EngineStatus),
    /// The final result could not be delivered to the controller.
    SendFailed,
}

struct Scratch<'a> {
    files: &'a mut TempFiles,
    analysis_id: i64,
}

impl ScratchSource for Scratch<'_> {
    fn temp_file(&mut self, extension: &str) -> PathBuf {
        self.files.create_for_purpose(self.analysis_id, extension)
    }

    fn state_file(&mut self) -> PathBuf {
        self.files.create_state_file(self.analysis_id)
    }

    fn drop_state_file(&mut self) {
        self.files.remove_state_file(self.analysis_id)
    }
}

pub struct Engine<C, H> {
    state: AnalysisState,
    channel: C,
    temp_files: TempFiles,
    hook: H,
}

impl<C: Channel, H: ComputationHook> Engine<C, H> {
    pub fn new(channel: C, temp_files: TempFiles, hook: H) -> Self {
        Self {
            state: AnalysisState::default(),
            channel,
            temp_files,
            hook,
        }
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    /// Wait up to `timeout` for one controller command and apply it.
    pub fn receive_messages(&mut self, timeout: Duration) -> bool {
        receive_one(&mut self.state, &mut self.channel, timeout)
    }

    /// One drive cycle: compute the current analysis and report its final result.
    pub fn run_analysis(&mut self) -> CycleOutcome {
        let Self {
            state,
            channel,
            temp_files,
            hook,
        } = self;

        match state.status {
            EngineStatus::Empty | EngineStatus::Aborted => return CycleOutcome::Idle,
            EngineStatus::Error => {
                tracing::warn!(analysis_id = state.id, "ignoring unrecognized command");
                state.status = EngineStatus::Empty;
                return CycleOutcome::Idle;
            }
            _ => {}
        }

        let perform = if state.status == EngineStatus::ToInit {
            state.status = EngineStatus::Initing;
            Perform::Init
        } else {
            state.status = EngineStatus::Running;
            Perform::Run
        };

        let analysis_id = state.id;
        // Files from earlier cycles; this cycle's own files stay tracked for the next one.
        let previous_files = temp_files.list_attributed(analysis_id);
        let call = Invocation {
            name: state.name.clone(),
            options: state.options.clone(),
            perform,
            ppi: state.ppi,
        };
        state.results = Value::Null;

        tracing::info!(
            analysis_id,
            name = %call.name,
            perform = call.perform.as_str(),
            "computation started"
        );

        let returned = {
            let mut progress = |interim: Option<&str>| on_progress(state, channel, interim);
            let mut scratch = Scratch {
                files: &mut *temp_files,
                analysis_id,
            };
            hook.invoke(&call, &mut progress, &mut scratch)
        };

        if state.status.is_superseded() {
            tracing::debug!(analysis_id, status = ?state.status, "result suppressed");
            temp_files.restore(analysis_id, previous_files);
            return CycleOutcome::Suppressed;
        }

        let mut fault = false;
        match returned {
            Ok(None) if state.status == EngineStatus::Changed => {
                tracing::info!(analysis_id, "options changed mid-computation, restarting");
                state.status = EngineStatus::ToInit;
                temp_files.restore(analysis_id, previous_files);
                return CycleOutcome::Restart;
            }
            Ok(None) => state.results = Value::Null,
            Ok(Some(blob)) => match protocol::parse_results(&blob) {
                Ok(v) => state.results = v,
                Err(e) => {
                    tracing::warn!(analysis_id, error = %format!("{e:#}"), "discarding results");
                    state.results = Value::Null;
                    fault = true;
                }
            },
            Err(e) => {
                // Keep the last interim results as the partial payload.
                tracing::error!(analysis_id, error = %e, "computation failed");
                fault = true;
            }
        }

        state.status = if fault {
            EngineStatus::Error
        } else if state.status == EngineStatus::Initing {
            EngineStatus::Inited
        } else {
            EngineStatus::Complete
        };
        let final_status = state.status;
        let sent = send_results(state, channel);
        state.status = EngineStatus::Empty;

        if let Err(e) = sent {
            tracing::warn!(analysis_id, error = %format!("{e:#}"), "failed to send results");
            temp_files.restore(analysis_id, previous_files);
            return CycleOutcome::SendFailed;
        }

        let keep = protocol::files_to_keep(&state.results);
        let retired = temp_files.retire(analysis_id, previous_files, &keep);
        tracing::info!(
            analysis_id,
            status = ?final_status,
            retired = retired.len(),
            "computation finished"
        );
        CycleOutcome::Completed(final_status)
    }
}

fn receive_one<C: Channel>(state: &mut AnalysisState, channel: &mut C, timeout: Duration) -> bool {
    match channel.receive(timeout) {
        Ok(Some(data)) => {
            state.apply(protocol::decode_request(&data));
            true
        }
        Ok(None) => false,
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "channel unusable");
            false
        }
        Err(ChannelError::Closed) => {
            tracing::info!("controller disconnected");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "receive failed");
            false
        }
    }
}

fn send_results<C: Channel>(state: &AnalysisState, channel: &mut C) -> Result<()> {
    let response = protocol::build_response(state.id, &state.name, state.status, &state.results);
    let message = protocol::encode_response(&response)?;
    channel.send(&message)?;
    tracing::debug!(analysis_id = state.id, status = %response.status, "results sent");
    Ok(())
}

fn on_progress<C: Channel>(
    state: &mut AnalysisState,
    channel: &mut C,
    interim: Option<&str>,
) -> ProgressControl {
    while receive_one(state, channel, Duration::ZERO) {}

    if state.status.is_superseded() {
        return ProgressControl::Abort;
    }

    if let Some(blob) = interim {
        state.results = protocol::parse_results(blob).unwrap_or_else(|e| {
            tracing::warn!(analysis_id = state.id, error = %format!("{e:#}"), "malformed interim results");
            Value::Null
        });
        if let Err(e) = send_results(state, channel) {
            tracing::warn!(analysis_id = state.id, error = %format!("{e:#}"), "failed to send interim results");
        }
    }

    match state.status {
        EngineStatus::Changed => ProgressControl::Changed(state.options.clone()),
        EngineStatus::Stopped => ProgressControl::Stop,
        _ => ProgressControl::Continue,
    }
}
