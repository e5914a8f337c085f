//! Worker process lifecycle: spawning, liveness, termination, and the
//! watchdog that reconciles persisted campaign state with real liveness.

pub mod command;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod registry;
pub mod watchdog;

pub use command::WorkerCommand;
pub use error::SupervisorError;
pub use handle::{OsProcess, ProcessHandle};
pub use launcher::{OsLauncher, ProcessLauncher};
pub use registry::ProcessSupervisor;
pub use watchdog::{SweepReport, Watchdog, WATCHDOG_NOTE};
