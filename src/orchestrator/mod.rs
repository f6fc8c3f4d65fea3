//! Worker process orchestration.
//!
//! This module owns the worker lifecycle: opening the controller channel, the poll and
//! drive loop, parent liveness, and shutdown. The CLI layer only builds configuration
//! and hands it over.

mod controller;
mod liveness;

pub(crate) use controller::run;
pub(crate) use liveness::current_parent_pid;
