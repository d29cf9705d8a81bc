//! Escalating-shutdown tests against real child processes.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use serial_test::serial;

use inferd::session::{ProcessHandle, ProcessRole, ShutdownCoordinator, ShutdownStage, ShutdownState};

use super::helpers::write_script;

fn spawn_handle(script: &std::path::Path, role: ProcessRole) -> Arc<ProcessHandle> {
    let child = tokio::process::Command::new(script)
        .kill_on_drop(true)
        .spawn()
        .expect("spawn test child");
    Arc::new(ProcessHandle::new(role, child))
}

fn make_coordinator(
    scheduler: &Arc<ProcessHandle>,
    serving: &Arc<ProcessHandle>,
    grace: Duration,
) -> ShutdownCoordinator {
    ShutdownCoordinator::new(
        Arc::clone(scheduler),
        Arc::clone(serving),
        Arc::new(ShutdownState::new()),
        grace,
    )
}

/// Script that records each graceful request it receives, then exits.
fn trapping_script(dir: &std::path::Path, name: &str, marker: &std::path::Path) -> std::path::PathBuf {
    write_script(
        dir,
        name,
        &format!(
            "trap 'echo term >> \"{marker}\"; exit 0' TERM\nsleep 30 &\nwait $!",
            marker = marker.display()
        ),
    )
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn both_children_receive_a_graceful_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sched_marker = dir.path().join("sched.term");
    let serve_marker = dir.path().join("serve.term");
    let sched_script = trapping_script(dir.path(), "sched.sh", &sched_marker);
    let serve_script = trapping_script(dir.path(), "serve.sh", &serve_marker);

    let scheduler = spawn_handle(&sched_script, ProcessRole::Scheduler);
    let serving = spawn_handle(&serve_script, ProcessRole::Serving);
    let coordinator = make_coordinator(&scheduler, &serving, Duration::from_secs(5));

    // Let the scripts install their traps before signaling.
    tokio::time::sleep(Duration::from_millis(300)).await;
    coordinator.shutdown("signal").await;

    assert_eq!(coordinator.stage(), ShutdownStage::Done);
    assert!(scheduler.exit_status().await.is_some());
    assert!(serving.exit_status().await.is_some());
    assert!(
        sched_marker.exists(),
        "scheduler must see the graceful request before the session exits"
    );
    assert!(serve_marker.exists());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn concurrent_triggers_produce_exactly_one_escalation_per_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sched_marker = dir.path().join("sched.term");
    let serve_marker = dir.path().join("serve.term");
    let sched_script = trapping_script(dir.path(), "sched.sh", &sched_marker);
    let serve_script = trapping_script(dir.path(), "serve.sh", &serve_marker);

    let scheduler = spawn_handle(&sched_script, ProcessRole::Scheduler);
    let serving = spawn_handle(&serve_script, ProcessRole::Serving);
    let coordinator = make_coordinator(&scheduler, &serving, Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(300)).await;

    // A signal racing a monitor trigger: both converge on one sequence,
    // and the loser returns only after the winner finishes.
    tokio::join!(
        coordinator.shutdown("signal"),
        coordinator.shutdown("child_exit"),
    );
    // A straggler after completion is a no-op.
    coordinator.shutdown("signal").await;

    assert_eq!(coordinator.stage(), ShutdownStage::Done);
    let sched_requests = std::fs::read_to_string(&sched_marker).expect("marker exists");
    let serve_requests = std::fs::read_to_string(&serve_marker).expect("marker exists");
    assert_eq!(
        sched_requests.lines().count(),
        1,
        "exactly one graceful request reaches the scheduler"
    );
    assert_eq!(serve_requests.lines().count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn child_ignoring_sigterm_is_force_killed_after_the_grace_period() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stubborn = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nsleep 30 &\nwait $!");
    let polite = write_script(dir.path(), "polite.sh", "exec sleep 30");

    let scheduler = spawn_handle(&stubborn, ProcessRole::Scheduler);
    let serving = spawn_handle(&polite, ProcessRole::Serving);
    let grace = Duration::from_secs(1);
    let coordinator = make_coordinator(&scheduler, &serving, grace);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = Instant::now();
    coordinator.shutdown("signal").await;
    let elapsed = started.elapsed();

    assert_eq!(coordinator.stage(), ShutdownStage::Done);
    assert!(scheduler.exit_status().await.is_some(), "stubborn child killed");
    assert!(serving.exit_status().await.is_some());
    assert!(
        elapsed < Duration::from_secs(10),
        "escalation must be bounded, took {elapsed:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn already_dead_children_complete_shutdown_without_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let quick = write_script(dir.path(), "quick.sh", "exit 0");

    let scheduler = spawn_handle(&quick, ProcessRole::Scheduler);
    let serving = spawn_handle(&quick, ProcessRole::Serving);
    let coordinator = make_coordinator(&scheduler, &serving, Duration::from_secs(1));

    // Both children exit on their own before shutdown runs.
    assert!(scheduler.wait_timeout(Duration::from_secs(5)).await.is_some());
    assert!(serving.wait_timeout(Duration::from_secs(5)).await.is_some());

    coordinator.shutdown("child_exit").await;
    assert_eq!(coordinator.stage(), ShutdownStage::Done);
}
