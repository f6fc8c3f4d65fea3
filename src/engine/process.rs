//! Computation hook backed by an external engine process.
//!
//! The engine is started once per computation and speaks newline-delimited JSON on its
//! stdio. The worker writes the invocation first, then serves requests until the engine
//! reports its result:
//!
//! - `{"progress": <results|null>}`, answered with the progress control object
//! - `{"tempFile": "<extension>"}` and `{"stateFile": true}`, answered with `{"path": ...}`
//! - `{"dropState": true}`, answered with `{"status": "ok"}`
//! - `{"result": <results|null>}`, which ends the computation
//! - `{"error": "<message>"}`, which ends it as a computation fault

use super::hook::{ComputationHook, HookError, Progress, ScratchSource};
use crate::model::Invocation;
use crate::protocol;
use serde::de::{Deserializer, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum EngineMessage {
    Progress(Value),
    TempFile(String),
    #[serde(deserialize_with = "ignore_payload")]
    StateFile,
    #[serde(deserialize_with = "ignore_payload")]
    DropState,
    Result(Value),
    Error(String),
}

fn ignore_payload<'de, D: Deserializer<'de>>(d: D) -> Result<(), D::Error> {
    IgnoredAny::deserialize(d).map(|_| ())
}

pub struct ProcessHook {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessHook {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), HookError> {
    stdin.write_all(line.as_bytes())?;
    stdin.write_all(b"\n")?;
    stdin.flush()?;
    Ok(())
}

fn path_reply(path: &Path) -> String {
    json!({ "path": path.display().to_string() }).to_string()
}

fn converse(
    child: &mut Child,
    call: &Invocation,
    progress: &mut Progress<'_>,
    scratch: &mut dyn ScratchSource,
) -> Result<Option<String>, HookError> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| HookError::Protocol("engine stdin unavailable".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HookError::Protocol("engine stdout unavailable".into()))?;

    let options: Value = serde_json::from_str(&call.options).unwrap_or(Value::Null);
    let request = json!({
        "name": call.name,
        "options": options,
        "perform": call.perform.as_str(),
        "ppi": call.ppi,
    });
    write_line(&mut stdin, &request.to_string())?;

    for line in BufReader::new(stdout).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: EngineMessage = serde_json::from_str(&line)
            .map_err(|e| HookError::Protocol(format!("unexpected engine message: {e}")))?;
        match msg {
            EngineMessage::Progress(interim) => {
                let interim = (!interim.is_null()).then(|| interim.to_string());
                let control = progress(interim.as_deref());
                write_line(&mut stdin, &protocol::encode_control(&control))?;
            }
            EngineMessage::TempFile(extension) => {
                let path = scratch.temp_file(&extension);
                write_line(&mut stdin, &path_reply(&path))?;
            }
            EngineMessage::StateFile => {
                let path = scratch.state_file();
                write_line(&mut stdin, &path_reply(&path))?;
            }
            EngineMessage::DropState => {
                scratch.drop_state_file();
                write_line(&mut stdin, r#"{"status":"ok"}"#)?;
            }
            EngineMessage::Result(results) => {
                return Ok((!results.is_null()).then(|| results.to_string()));
            }
            EngineMessage::Error(message) => return Err(HookError::Failed(message)),
        }
    }

    drop(stdin);
    let status = child.wait()?;
    if status.success() {
        Err(HookError::Protocol("engine exited without a result".into()))
    } else {
        Err(HookError::Exited(status))
    }
}

impl ComputationHook for ProcessHook {
    fn invoke(
        &mut self,
        call: &Invocation,
        progress: &mut Progress<'_>,
        scratch: &mut dyn ScratchSource,
    ) -> Result<Option<String>, HookError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(HookError::Spawn)?;
        tracing::debug!(pid = child.id(), program = %self.program.display(), "engine started");

        let outcome = converse(&mut child, call, progress, scratch);
        match &outcome {
            Ok(_) => match child.wait() {
                Ok(status) if !status.success() => {
                    tracing::warn!(%status, "engine exited uncleanly after reporting results")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to reap engine"),
            },
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        outcome
    }
}
