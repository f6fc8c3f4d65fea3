use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Rendering resolution used when a request carries no usable `settings.ppi`.
pub const DEFAULT_PPI: i64 = 96;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub shared_name: String,
    pub worker_index: u32,
    pub parent_pid: u32,
    /// The controller pid was given explicitly rather than taken from our parent.
    #[serde(default)]
    pub parent_pid_explicit: bool,
    pub scratch_dir: PathBuf,
    pub socket_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
    pub engine_program: Option<PathBuf>,
    #[serde(default)]
    pub engine_args: Vec<String>,
}

/// What the controller asked the worker to do with an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Perform {
    Init,
    Run,
    Stop,
    Other(String),
}

impl Perform {
    pub fn parse(s: &str) -> Self {
        match s {
            "init" => Perform::Init,
            "run" => Perform::Run,
            "stop" => Perform::Stop,
            other => Perform::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Perform::Init => "init",
            Perform::Run => "run",
            Perform::Stop => "stop",
            Perform::Other(s) => s,
        }
    }
}

/// Decoded inbound command. `name`, `options` and `ppi` are only meaningful when
/// the request (re)starts or changes a computation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub id: i64,
    pub perform: Perform,
    pub name: String,
    /// Options re-serialized verbatim for the computation engine.
    pub options: String,
    pub ppi: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Empty,
    ToInit,
    Initing,
    Inited,
    ToRun,
    Running,
    Changed,
    Stopped,
    Aborted,
    Error,
    Complete,
}

impl EngineStatus {
    /// Status string reported to the controller when the engine did not supply its own.
    pub fn wire_str(self) -> &'static str {
        match self {
            EngineStatus::Inited => "inited",
            EngineStatus::Running | EngineStatus::Changed => "running",
            EngineStatus::Complete => "complete",
            EngineStatus::Stopped => "stopped",
            _ => "error",
        }
    }

    /// A newer command replaced the analysis that is currently computing.
    pub fn is_superseded(self) -> bool {
        matches!(
            self,
            EngineStatus::Aborted | EngineStatus::ToInit | EngineStatus::ToRun | EngineStatus::Error
        )
    }
}

/// Outbound message, serialized field-for-field onto the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub results: serde_json::Value,
}

/// Answer given to the computation engine at each preemption point.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressControl {
    Continue,
    /// Options changed while computing; carries the new options blob.
    Changed(String),
    Stop,
    Abort,
}

/// One computation engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub options: String,
    pub perform: Perform,
    pub ppi: i64,
}
