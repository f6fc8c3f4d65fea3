use crate::model::{Invocation, ProgressControl};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to start computation engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("computation engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("computation engine protocol violation: {0}")]
    Protocol(String),
    #[error("computation engine exited with {0}")]
    Exited(std::process::ExitStatus),
    #[error("computation failed: {0}")]
    Failed(String),
}

/// Scratch paths handed to the computation engine, bound to the analysis being computed.
pub trait ScratchSource {
    fn temp_file(&mut self, extension: &str) -> PathBuf;
    fn state_file(&mut self) -> PathBuf;
    /// Discard the persisted session state.
    fn drop_state_file(&mut self);
}

/// Progress callback given to the engine. It is the preemption point: the worker checks
/// for new controller commands before answering.
pub type Progress<'a> = dyn FnMut(Option<&str>) -> ProgressControl + 'a;

/// The external statistical computation engine.
pub trait ComputationHook {
    /// Run one computation to its end. `Ok(None)` means the engine produced no result,
    /// which is how it signals that it could not absorb changed options.
    fn invoke(
        &mut self,
        call: &Invocation,
        progress: &mut Progress<'_>,
        scratch: &mut dyn ScratchSource,
    ) -> Result<Option<String>, HookError>;
}
