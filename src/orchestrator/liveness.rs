/// The controller process this worker serves.
///
/// A pid given on the command line is watched directly: the controller is gone once that
/// process no longer exists, whatever sits between it and the worker. Without one, the
/// worker watches its own parent; on unix an orphaned worker is re-parented, so the parent
/// is gone as soon as our parent pid no longer matches the one recorded at startup.
pub(crate) struct ParentProcess {
    pid: u32,
    explicit: bool,
}

impl ParentProcess {
    pub fn new(pid: u32, explicit: bool) -> Self {
        Self { pid, explicit }
    }

    pub fn is_alive(&self) -> bool {
        if self.explicit {
            return process_exists(self.pid);
        }
        #[cfg(unix)]
        {
            std::os::unix::process::parent_id() == self.pid
        }
        #[cfg(not(unix))]
        {
            true
        }
    }
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    std::path::Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_exists(pid: u32) -> bool {
    // Signal 0 only checks that the pid can be addressed.
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    true
}

/// Parent pid of the current process, where the platform exposes one.
pub(crate) fn current_parent_pid() -> u32 {
    #[cfg(unix)]
    {
        std::os::unix::process::parent_id()
    }
    #[cfg(not(unix))]
    {
        0
    }
}
