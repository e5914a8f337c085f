//! Real child processes through the OS launcher.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use bsn_supervisor::{OsLauncher, ProcessSupervisor, SupervisorError, WorkerCommand};

async fn wait_until_dead(sup: &ProcessSupervisor, handle: &dyn bsn_supervisor::ProcessHandle) {
    for _ in 0..100 {
        if !handle.is_alive() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process still alive, registry says alive={}", sup.is_alive(1));
}

#[tokio::test]
async fn sigterm_stops_a_sleeping_worker() {
    let sup = ProcessSupervisor::new(Arc::new(OsLauncher));
    let cmd = WorkerCommand::new("sleep").arg("30");

    let handle = sup.spawn(1, &cmd).unwrap();
    assert!(handle.pid().is_some());
    assert!(sup.is_alive(1));

    let err = sup.spawn(1, &cmd).unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning(1)));

    assert_eq!(sup.terminate(1), 1);
    assert!(!sup.is_alive(1));
    wait_until_dead(&sup, handle.as_ref()).await;
}

#[tokio::test]
async fn exited_worker_is_reported_dead() {
    let sup = ProcessSupervisor::new(Arc::new(OsLauncher));
    let handle = sup.spawn(2, &WorkerCommand::new("true")).unwrap();

    for _ in 0..100 {
        if !sup.is_alive(2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!handle.is_alive());
    assert!(!sup.is_alive(2));
    assert_eq!(sup.handle_count(2), 1);
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let sup = ProcessSupervisor::new(Arc::new(OsLauncher));
    let err = sup
        .spawn(3, &WorkerCommand::new("/definitely/not/a/program"))
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn(_)));
    assert_eq!(sup.handle_count(3), 0);
}
