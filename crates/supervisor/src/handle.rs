use std::sync::Mutex;

use tokio::process::Child;
use tracing::{info, warn};

/// One supervised worker process.
///
/// The supervisor and watchdog only depend on this trait so tests can supply
/// scripted handles.
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn is_alive(&self) -> bool;

    /// Ask the process to stop gracefully. Returns `true` when the request was sent.
    fn terminate(&self) -> bool;
}

impl std::fmt::Debug for dyn ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid()).finish()
    }
}

/// Handle over a real child process.
///
/// Dropping it never kills the process: removing a campaign from the registry
/// and ending its worker are separate operations.
pub struct OsProcess {
    child: Mutex<Child>,
    pid: Option<u32>,
}

impl OsProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Mutex::new(child),
            pid,
        }
    }
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        let mut child = match self.child.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        matches!(child.try_wait(), Ok(None))
    }

    fn terminate(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };

        // On Unix, send SIGTERM for graceful shutdown via the kill command.
        #[cfg(unix)]
        {
            match std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .output()
            {
                Ok(out) if out.status.success() => {
                    info!(pid, "sent SIGTERM");
                    true
                }
                Ok(out) => {
                    warn!(pid, status = %out.status, "kill -TERM failed");
                    false
                }
                Err(e) => {
                    warn!(pid, error = %e, "kill -TERM failed");
                    false
                }
            }
        }
        #[cfg(not(unix))]
        {
            let mut child = match self.child.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            match child.start_kill() {
                Ok(()) => {
                    info!(pid, "sent kill signal");
                    true
                }
                Err(e) => {
                    warn!(pid, error = %e, "kill failed");
                    false
                }
            }
        }
    }
}
