use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::info;

use crate::command::WorkerCommand;
use crate::error::SupervisorError;
use crate::handle::{OsProcess, ProcessHandle};

/// Starts worker processes. Swapped for a scripted launcher in tests.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &WorkerCommand) -> Result<Arc<dyn ProcessHandle>, SupervisorError>;
}

/// Spawns real OS processes. Worker stdout/stderr are inherited so their
/// diagnostics land in the host's output.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn launch(&self, command: &WorkerCommand) -> Result<Arc<dyn ProcessHandle>, SupervisorError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        for (k, v) in &command.env {
            cmd.env(k, v);
        }

        let child = cmd.spawn()?;
        let handle = OsProcess::new(child);
        info!(program = %command.program, pid = ?handle.pid(), "worker spawned");
        Ok(Arc::new(handle))
    }
}
