//! Scratch file bookkeeping, partitioned per analysis id.
//!
//! Files live under `<root>/resources/<analysis id>/`. The registry only tracks paths;
//! the computation engine is the one writing them.

use rand::Rng;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const STATE_FILE_NAME: &str = "state";

pub struct TempFiles {
    root: PathBuf,
    tracked: HashMap<i64, Vec<PathBuf>>,
}

impl TempFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if let Err(e) = std::fs::create_dir_all(&root) {
            tracing::warn!(root = %root.display(), error = %e, "failed to create scratch root");
        }
        Self {
            root,
            tracked: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn analysis_dir(&self, analysis_id: i64) -> PathBuf {
        let dir = self.root.join("resources").join(analysis_id.to_string());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create analysis scratch dir");
        }
        dir
    }

    fn is_tracked(&self, analysis_id: i64, path: &Path) -> bool {
        self.tracked
            .get(&analysis_id)
            .is_some_and(|paths| paths.iter().any(|p| p == path))
    }

    fn track(&mut self, analysis_id: i64, path: PathBuf) {
        if !self.is_tracked(analysis_id, &path) {
            self.tracked.entry(analysis_id).or_default().push(path);
        }
    }

    /// Fresh, never-before-handed-out path with the given extension.
    pub fn create_for_purpose(&mut self, analysis_id: i64, extension: &str) -> PathBuf {
        let dir = self.analysis_dir(analysis_id);
        let mut rng = rand::thread_rng();
        let path = loop {
            let n: u32 = rng.gen();
            let name = if extension.is_empty() {
                format!("_{n}")
            } else {
                format!("_{n}.{extension}")
            };
            let candidate = dir.join(name);
            if !candidate.exists() && !self.is_tracked(analysis_id, &candidate) {
                break candidate;
            }
        };
        tracing::debug!(analysis_id, path = %path.display(), "created temp file name");
        self.track(analysis_id, path.clone());
        path
    }

    /// Deterministic session-state path; the same path on every call for one id.
    pub fn create_state_file(&mut self, analysis_id: i64) -> PathBuf {
        let path = self.analysis_dir(analysis_id).join(STATE_FILE_NAME);
        self.track(analysis_id, path.clone());
        path
    }

    /// Hand back every path tracked for `analysis_id` and stop tracking them.
    pub fn list_attributed(&mut self, analysis_id: i64) -> Vec<PathBuf> {
        self.tracked.remove(&analysis_id).unwrap_or_default()
    }

    /// Put previously listed paths back under tracking, e.g. when a cycle was abandoned.
    pub fn restore(&mut self, analysis_id: i64, paths: Vec<PathBuf>) {
        for path in paths {
            self.track(analysis_id, path);
        }
    }

    /// Delete every path not named in `keep` and keep tracking the rest.
    ///
    /// A keep entry matches either the absolute path or the path relative to the
    /// scratch root. Returns the paths that were retired.
    pub fn retire(&mut self, analysis_id: i64, paths: Vec<PathBuf>, keep: &[String]) -> Vec<PathBuf> {
        let mut retired = Vec::new();
        for path in paths {
            if self.is_kept(&path, keep) {
                self.track(analysis_id, path);
                continue;
            }
            remove_scratch_file(&path);
            retired.push(path);
        }
        retired
    }

    /// Explicitly drop the session-state file of an analysis.
    pub fn remove_state_file(&mut self, analysis_id: i64) {
        let path = self
            .root
            .join("resources")
            .join(analysis_id.to_string())
            .join(STATE_FILE_NAME);
        if let Some(paths) = self.tracked.get_mut(&analysis_id) {
            paths.retain(|p| p != &path);
        }
        remove_scratch_file(&path);
    }

    fn is_kept(&self, path: &Path, keep: &[String]) -> bool {
        let relative = path.strip_prefix(&self.root).ok();
        keep.iter().any(|k| {
            let k = Path::new(k);
            k == path || relative.is_some_and(|r| r == k)
        })
    }
}

fn remove_scratch_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
        // Names are handed out before the engine writes them, so absence is normal.
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}
